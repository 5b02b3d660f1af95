//! 挑战记录与消费结果

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 待验证的挑战记录
///
/// 只能通过 `identity` 查到；账本持有唯一的一份，
/// 对外返回的都是快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// 邮箱地址，查找键
    pub identity: String,

    /// 6 位数字验证码（字符串，保留前导零）
    pub code: String,

    /// 签发时间
    pub issued_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 验证失败次数
    pub attempts: u32,
}

impl Challenge {
    /// 在给定时刻是否仍然有效（`now < expires_at`）
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// 距过期的剩余秒数
    pub fn remaining_seconds_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// 消费验证码的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeOutcome {
    /// 验证码正确，记录已删除
    Matched,
    /// 记录已过期，已删除
    Expired,
    /// 没有该身份的记录
    NotFound,
    /// 验证码错误，失败次数加一，记录保留
    Mismatch,
}

impl ConsumeOutcome {
    /// 是否验证成功
    pub fn is_matched(self) -> bool {
        matches!(self, ConsumeOutcome::Matched)
    }
}

impl fmt::Display for ConsumeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumeOutcome::Matched => write!(f, "matched"),
            ConsumeOutcome::Expired => write!(f, "expired"),
            ConsumeOutcome::NotFound => write!(f, "not_found"),
            ConsumeOutcome::Mismatch => write!(f, "mismatch"),
        }
    }
}
