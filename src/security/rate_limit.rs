//! 速率限制
//!
//! 签发接口会触发真实的邮件发送，必须在入口处限流。账本本身不关心限流，
//! 只有传输层适配器会调用 [`RateLimiter`]。
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use inbox_otp::security::{RateLimitConfig, RateLimiter, SlidingWindowLimiter};
//! use std::time::Duration;
//!
//! // 每分钟最多 2 次
//! let limiter = SlidingWindowLimiter::new(
//!     RateLimitConfig::new()
//!         .with_max_requests(2)
//!         .with_window(Duration::from_secs(60)),
//! );
//!
//! assert!(limiter.allow("203.0.113.7").await);
//! assert!(limiter.allow("203.0.113.7").await);
//! assert!(!limiter.allow("203.0.113.7").await);
//! # });
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{Error, Result};

/// 速率限制配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 时间窗口内允许的最大请求数
    pub max_requests: u32,
    /// 时间窗口大小
    pub window: Duration,
    /// 记录的客户端数达到该值后，写入时顺带清理过期记录（每个窗口至多一次）
    pub cleanup_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            cleanup_threshold: 1024,
        }
    }
}

impl RateLimitConfig {
    /// 创建新的配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置最大请求数
    pub fn with_max_requests(mut self, max: u32) -> Self {
        self.max_requests = max;
        self
    }

    /// 设置时间窗口
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// 设置触发写入时清理的客户端数
    pub fn with_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// 签发场景的预设配置
    ///
    /// 每 10 分钟最多 5 次
    pub fn for_issue() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(600),
            ..Self::default()
        }
    }

    /// 验证场景的预设配置
    ///
    /// 每分钟最多 10 次
    pub fn for_verify() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            ..Self::default()
        }
    }
}

/// 限流检查通过后的剩余额度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// 剩余请求次数
    pub remaining: u32,
    /// 总限制次数
    pub limit: u32,
    /// 窗口重置时间
    pub reset_after: Duration,
}

/// 限流契约
///
/// `client_key` 由调用方决定，通常是客户端 IP 加上操作前缀。
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// 记录一次请求并返回是否放行
    async fn allow(&self, client_key: &str) -> bool;
}

/// 请求记录
#[derive(Debug, Clone, Default)]
struct RequestRecord {
    timestamps: Vec<Instant>,
}

impl RequestRecord {
    /// 清理窗口外的时间戳
    fn cleanup(&mut self, now: Instant, window: Duration) {
        self.timestamps
            .retain(|&ts| now.saturating_duration_since(ts) < window);
    }

    fn reset_after(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .first()
            .map(|&ts| window.saturating_sub(now.saturating_duration_since(ts)))
            .unwrap_or(window)
    }
}

#[derive(Debug)]
struct Records {
    by_key: HashMap<String, RequestRecord>,
    last_cleanup: Instant,
}

impl Records {
    /// 删除窗口内没有请求的记录，返回删除数量
    fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|_, record| {
            record.cleanup(now, window);
            !record.timestamps.is_empty()
        });
        self.last_cleanup = now;
        before - self.by_key.len()
    }
}

/// 内存滑动窗口限流器
///
/// 客户端数超过 [`RateLimitConfig::cleanup_threshold`] 后，写入路径每个窗口
/// 至多清理一次过期记录，内存占用随窗口内活跃客户端数而不是历史客户端数增长。
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    config: RateLimitConfig,
    records: RwLock<Records>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl SlidingWindowLimiter {
    /// 使用指定配置创建限流器
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: RwLock::new(Records {
                by_key: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// 检查并记录一次请求
    ///
    /// # Errors
    ///
    /// 超过窗口内的限额时返回 [`Error::RateLimitExceeded`]。
    pub fn check(&self, client_key: &str) -> Result<RateLimitInfo> {
        let now = Instant::now();
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if records.by_key.len() >= self.config.cleanup_threshold
            && now.saturating_duration_since(records.last_cleanup) >= self.config.window
        {
            let removed = records.prune(now, self.config.window);
            debug!(removed, "pruned idle rate limit records");
        }

        let record = records.by_key.entry(client_key.to_string()).or_default();
        record.cleanup(now, self.config.window);

        let current = record.timestamps.len() as u32;
        if current >= self.config.max_requests {
            debug!(client_key, limit = self.config.max_requests, "rate limit hit");
            return Err(Error::rate_limited(client_key));
        }

        record.timestamps.push(now);

        Ok(RateLimitInfo {
            remaining: self.config.max_requests - current - 1,
            limit: self.config.max_requests,
            reset_after: record.reset_after(now, self.config.window),
        })
    }

    /// 查询剩余额度（不记录请求）
    pub fn remaining(&self, client_key: &str) -> u32 {
        let now = Instant::now();
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);

        let used = records
            .by_key
            .get(client_key)
            .map(|record| {
                record
                    .timestamps
                    .iter()
                    .filter(|&&ts| now.saturating_duration_since(ts) < self.config.window)
                    .count() as u32
            })
            .unwrap_or(0);

        self.config.max_requests.saturating_sub(used)
    }

    /// 重置某个 key 的限制
    pub fn reset(&self, client_key: &str) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .remove(client_key);
    }

    /// 清理没有窗口内请求的记录，返回清理数量
    pub fn cleanup(&self) -> usize {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .prune(Instant::now(), self.config.window)
    }

    /// 当前记录的客户端数
    pub fn tracked_keys(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .len()
    }

    /// 获取配置
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn allow(&self, client_key: &str) -> bool {
        self.check(client_key).is_ok()
    }
}

/// 不做任何限制的限流器
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn allow(&self, _client_key: &str) -> bool {
        true
    }
}
