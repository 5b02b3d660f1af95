//! OTP 账本
//!
//! 一个带过期时间、一次性消费的键值存储：每个身份（邮箱）最多对应
//! 一条有效的挑战记录。账本自己持有并发控制和过期策略，从不向外调用。
//!
//! ## 并发模型
//!
//! 键空间被哈希到固定数量的分片上，每个分片由一把互斥锁保护。
//! 同一身份永远落在同一分片，因此对同一身份的 `put` / `consume`
//! 严格串行；不同身份大多落在不同分片，互不阻塞。锁内只做内存操作。
//!
//! ## 示例
//!
//! ```rust
//! use inbox_otp::ledger::{ConsumeOutcome, LedgerConfig, OtpLedger};
//! use std::time::Duration;
//!
//! let ledger = OtpLedger::new(LedgerConfig::default());
//! ledger.put("user@example.com", "042917", Duration::from_secs(600));
//!
//! assert_eq!(ledger.consume("user@example.com", "000000"), ConsumeOutcome::Mismatch);
//! assert_eq!(ledger.consume("user@example.com", "042917"), ConsumeOutcome::Matched);
//! assert_eq!(ledger.consume("user@example.com", "042917"), ConsumeOutcome::NotFound);
//! ```

mod challenge;
mod sweeper;

pub use challenge::{Challenge, ConsumeOutcome};
pub use sweeper::{SweeperHandle, spawn_sweeper};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::random::constant_time_compare_str;

// ============================================================================
// 配置
// ============================================================================

/// 账本配置
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// 分片数量
    pub shards: usize,

    /// 最多同时保存的记录数（所有分片合计的近似上限）
    pub max_entries: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            max_entries: 100_000,
        }
    }
}

impl LedgerConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置分片数量（至少为 1）
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }

    /// 设置记录数上限（至少为 1）
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    fn shard_capacity(&self) -> usize {
        self.max_entries.div_ceil(self.shards.max(1)).max(1)
    }
}

// ============================================================================
// 账本
// ============================================================================

type Shard = HashMap<String, Challenge>;

/// OTP 账本
///
/// 拥有全部 [`Challenge`] 记录。`new` 即初始化，[`shutdown`](Self::shutdown)
/// 清空全部状态。
#[derive(Debug)]
pub struct OtpLedger {
    shards: Box<[Mutex<Shard>]>,
    hasher: RandomState,
    shard_capacity: usize,
    clock: Arc<dyn Clock>,
}

impl OtpLedger {
    /// 使用系统时钟创建账本
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用自定义时钟创建账本
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let shard_count = config.shards.max(1);
        let shards = (0..shard_count)
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            hasher: RandomState::new(),
            shard_capacity: config.shard_capacity(),
            clock,
        }
    }

    /// 账本使用的时钟
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 锁住身份所在的分片
    ///
    /// 锁内的每次修改都是单步插入或删除，中毒后状态依然一致，直接接管。
    fn shard_for(&self, identity: &str) -> MutexGuard<'_, Shard> {
        let index = (self.hasher.hash_one(identity) as usize) % self.shards.len();
        self.shards[index].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_all(&self) -> impl Iterator<Item = MutexGuard<'_, Shard>> {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// 为身份写入新的挑战
    ///
    /// 无条件替换该身份已有的记录（替换而不是更新：旧验证码永久失效，
    /// 失败次数归零）。返回新记录的快照。
    pub fn put(&self, identity: &str, code: &str, ttl: Duration) -> Challenge {
        let issued_at = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let challenge = Challenge {
            identity: identity.to_string(),
            code: code.to_string(),
            issued_at,
            expires_at,
            attempts: 0,
        };

        let mut shard = self.shard_for(identity);
        if !shard.contains_key(identity) && shard.len() >= self.shard_capacity {
            self.make_room(&mut shard, issued_at);
        }
        shard.insert(challenge.identity.clone(), challenge.clone());

        challenge
    }

    /// 分片已满时腾出一个位置
    ///
    /// 先清除已过期记录，仍然满则淘汰最早过期的一条。
    fn make_room(&self, shard: &mut Shard, now: DateTime<Utc>) {
        let before = shard.len();
        shard.retain(|_, c| c.is_live_at(now));
        let expired = before - shard.len();

        if shard.len() >= self.shard_capacity {
            let victim = shard
                .values()
                .min_by_key(|c| c.expires_at)
                .map(|c| c.identity.clone());
            if let Some(victim) = victim {
                shard.remove(&victim);
                debug!(expired, "ledger shard full, evicted challenge closest to expiry");
            }
        } else if expired > 0 {
            debug!(expired, "ledger shard full, reclaimed expired challenges");
        }
    }

    /// 消费验证码
    ///
    /// 整个 查找-检查-删除 过程在分片锁内完成：并发调用中至多一个能得到
    /// [`ConsumeOutcome::Matched`]。
    ///
    /// - 无记录 → `NotFound`
    /// - 已过期 → 删除记录，`Expired`
    /// - 验证码一致（精确字符串比较，常量时间）→ 删除记录，`Matched`
    /// - 验证码不一致 → 失败次数加一，保留记录，`Mismatch`
    pub fn consume(&self, identity: &str, submitted_code: &str) -> ConsumeOutcome {
        let now = self.clock.now();
        let mut shard = self.shard_for(identity);

        let outcome = match shard.get_mut(identity) {
            None => return ConsumeOutcome::NotFound,
            Some(c) if !c.is_live_at(now) => ConsumeOutcome::Expired,
            Some(c) if constant_time_compare_str(submitted_code, &c.code) => {
                ConsumeOutcome::Matched
            }
            Some(c) => {
                c.attempts = c.attempts.saturating_add(1);
                return ConsumeOutcome::Mismatch;
            }
        };

        shard.remove(identity);
        outcome
    }

    /// 查看身份当前的有效挑战（快照）
    ///
    /// 过期记录视为不存在，但不会在这里删除。
    pub fn peek(&self, identity: &str) -> Option<Challenge> {
        let now = self.clock.now();
        self.shard_for(identity)
            .get(identity)
            .filter(|c| c.is_live_at(now))
            .cloned()
    }

    /// 撤销身份的挑战，返回是否确实删除了记录
    pub fn revoke(&self, identity: &str) -> bool {
        self.shard_for(identity).remove(identity).is_some()
    }

    /// 删除所有 `expires_at <= now` 的记录，返回删除数量
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.lock_all()
            .map(|mut shard| {
                let before = shard.len();
                shard.retain(|_, c| c.is_live_at(now));
                before - shard.len()
            })
            .sum()
    }

    /// 按账本时钟清理过期记录
    pub fn sweep_expired(&self) -> usize {
        self.sweep(self.clock.now())
    }

    /// 当前保存的记录数（包含尚未清理的过期记录）
    pub fn len(&self) -> usize {
        self.lock_all().map(|shard| shard.len()).sum()
    }

    /// 是否没有任何记录
    pub fn is_empty(&self) -> bool {
        self.lock_all().all(|shard| shard.is_empty())
    }

    /// 关闭账本，清空全部状态，返回被丢弃的记录数
    pub fn shutdown(&self) -> usize {
        let dropped = self
            .lock_all()
            .map(|mut shard| {
                let n = shard.len();
                shard.clear();
                n
            })
            .sum();
        debug!(dropped, "ledger shut down");
        dropped
    }
}

impl Default for OtpLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    const TTL: Duration = Duration::from_secs(600);

    fn ledger_with_clock() -> (OtpLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let ledger = OtpLedger::with_clock(LedgerConfig::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn test_put_and_consume() {
        let ledger = OtpLedger::default();
        let challenge = ledger.put("user@example.com", "123456", TTL);

        assert_eq!(challenge.attempts, 0);
        assert_eq!(
            (challenge.expires_at - challenge.issued_at).num_seconds(),
            600
        );
        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::Matched
        );
        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::NotFound
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_mismatch_keeps_challenge() {
        let ledger = OtpLedger::default();
        ledger.put("user@example.com", "123456", TTL);

        assert_eq!(
            ledger.consume("user@example.com", "654321"),
            ConsumeOutcome::Mismatch
        );
        assert_eq!(
            ledger.consume("user@example.com", "654322"),
            ConsumeOutcome::Mismatch
        );
        assert_eq!(ledger.peek("user@example.com").unwrap().attempts, 2);

        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::Matched
        );
    }

    #[test]
    fn test_comparison_is_exact() {
        let ledger = OtpLedger::default();
        ledger.put("user@example.com", "012345", TTL);

        // 不做任何规范化
        assert_eq!(
            ledger.consume("user@example.com", "12345"),
            ConsumeOutcome::Mismatch
        );
        assert_eq!(
            ledger.consume("user@example.com", " 012345"),
            ConsumeOutcome::Mismatch
        );
        assert_eq!(
            ledger.consume("user@example.com", "012345"),
            ConsumeOutcome::Matched
        );
    }

    #[test]
    fn test_identity_is_exact_key() {
        let ledger = OtpLedger::default();
        ledger.put("User@Example.com", "123456", TTL);

        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::NotFound
        );
    }

    #[test]
    fn test_lazy_expiry() {
        let (ledger, clock) = ledger_with_clock();
        ledger.put("user@example.com", "123456", TTL);

        clock.advance(TTL);
        assert!(ledger.peek("user@example.com").is_none());
        assert_eq!(ledger.len(), 1);

        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::Expired
        );
        // 过期记录已被删除
        assert_eq!(ledger.len(), 0);
        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::NotFound
        );
    }

    #[test]
    fn test_still_live_just_before_expiry() {
        let (ledger, clock) = ledger_with_clock();
        ledger.put("user@example.com", "123456", TTL);

        clock.advance(TTL - Duration::from_millis(1));
        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::Matched
        );
    }

    #[test]
    fn test_replacement_resets_attempts() {
        let ledger = OtpLedger::default();
        ledger.put("user@example.com", "111111", TTL);
        ledger.consume("user@example.com", "000000");
        assert_eq!(ledger.peek("user@example.com").unwrap().attempts, 1);

        ledger.put("user@example.com", "222222", TTL);
        assert_eq!(ledger.peek("user@example.com").unwrap().attempts, 0);
        assert_eq!(
            ledger.consume("user@example.com", "111111"),
            ConsumeOutcome::Mismatch
        );
        assert_eq!(
            ledger.consume("user@example.com", "222222"),
            ConsumeOutcome::Matched
        );
    }

    #[test]
    fn test_sweep() {
        let (ledger, clock) = ledger_with_clock();
        ledger.put("a@example.com", "111111", Duration::from_secs(60));
        ledger.put("b@example.com", "222222", Duration::from_secs(60));
        ledger.put("c@example.com", "333333", TTL);

        clock.advance(Duration::from_secs(60));
        assert_eq!(ledger.sweep(clock.now()), 2);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.peek("c@example.com").is_some());

        // 再次清理没有可删除的记录
        assert_eq!(ledger.sweep_expired(), 0);
    }

    #[test]
    fn test_capacity_reclaims_expired_first() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = LedgerConfig::new().with_shards(1).with_max_entries(2);
        let ledger = OtpLedger::with_clock(config, clock.clone());

        ledger.put("a@example.com", "111111", Duration::from_secs(10));
        ledger.put("b@example.com", "222222", TTL);
        clock.advance(Duration::from_secs(10));

        ledger.put("c@example.com", "333333", TTL);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.peek("b@example.com").is_some());
        assert!(ledger.peek("c@example.com").is_some());
    }

    #[test]
    fn test_capacity_evicts_closest_to_expiry() {
        let config = LedgerConfig::new().with_shards(1).with_max_entries(2);
        let ledger = OtpLedger::new(config);

        ledger.put("a@example.com", "111111", Duration::from_secs(30));
        ledger.put("b@example.com", "222222", TTL);
        ledger.put("c@example.com", "333333", TTL);

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.consume("a@example.com", "111111"),
            ConsumeOutcome::NotFound
        );
    }

    #[test]
    fn test_replacing_at_capacity_does_not_evict() {
        let config = LedgerConfig::new().with_shards(1).with_max_entries(2);
        let ledger = OtpLedger::new(config);

        ledger.put("a@example.com", "111111", TTL);
        ledger.put("b@example.com", "222222", TTL);
        ledger.put("a@example.com", "333333", TTL);

        assert_eq!(ledger.len(), 2);
        assert!(ledger.peek("b@example.com").is_some());
    }

    #[test]
    fn test_revoke() {
        let ledger = OtpLedger::default();
        ledger.put("user@example.com", "123456", TTL);

        assert!(ledger.revoke("user@example.com"));
        assert!(!ledger.revoke("user@example.com"));
        assert_eq!(
            ledger.consume("user@example.com", "123456"),
            ConsumeOutcome::NotFound
        );
    }

    #[test]
    fn test_shutdown_clears_state() {
        let ledger = OtpLedger::default();
        ledger.put("a@example.com", "111111", TTL);
        ledger.put("b@example.com", "222222", TTL);

        assert_eq!(ledger.shutdown(), 2);
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.consume("a@example.com", "111111"),
            ConsumeOutcome::NotFound
        );
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let ledger = OtpLedger::default();
        ledger.put("", "", Duration::ZERO);
        ledger.put("x", "not-a-code", Duration::MAX);

        assert_eq!(ledger.consume("", ""), ConsumeOutcome::Expired);
        assert_eq!(ledger.consume("x", "😀"), ConsumeOutcome::Mismatch);
        assert_eq!(ledger.consume("x", "not-a-code"), ConsumeOutcome::Matched);
    }

    #[test]
    fn test_concurrent_consume_single_winner() {
        let ledger = Arc::new(OtpLedger::default());
        ledger.put("race@example.com", "123456", TTL);

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.consume("race@example.com", "123456"))
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let matched = outcomes.iter().filter(|o| o.is_matched()).count();
        let not_found = outcomes
            .iter()
            .filter(|&&o| o == ConsumeOutcome::NotFound)
            .count();

        assert_eq!(matched, 1);
        assert_eq!(not_found, 31);
    }
}
