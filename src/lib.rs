//! # inbox-otp
//!
//! 基于邮件的一次性验证码（OTP）签发与验证。
//!
//! ## 功能特性
//!
//! - **验证码账本**: 分片加锁的内存账本，每个邮箱至多一个有效挑战，
//!   验证成功即删除，保证同一验证码只能成功一次
//! - **过期处理**: 读取时惰性过期，外加可选的后台清理任务
//! - **验证服务**: 生成 6 位数字验证码、写入账本、在锁外投递邮件
//! - **邮件投递**: 可插拔的 [`Sender`]，内置 lettre SMTP 实现
//! - **速率限制**: 滑动窗口限流，防止接口被用来轰炸邮箱
//! - **传输适配**: 与 Web 框架无关的请求 / 响应对象
//!
//! ## Features
//!
//! - `smtp` - 启用基于 lettre 的 SMTP 发送器（默认启用）
//! - `smtp-tls` - SMTP relay 使用 TLS 连接
//! - `full` - 启用所有功能
//!
//! ## 签发与验证示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use inbox_otp::{LogSender, ServiceConfig, VerificationService};
//!
//! let service = VerificationService::new(LogSender, ServiceConfig::default());
//!
//! service
//!     .issue_challenge("user@example.com", Some("482913"))
//!     .await
//!     .unwrap();
//!
//! let outcome = service
//!     .verify_challenge("user@example.com", "482913")
//!     .await
//!     .unwrap();
//! assert!(outcome.success);
//! # });
//! ```
//!
//! ## 账本示例
//!
//! ```rust
//! use inbox_otp::{ConsumeOutcome, LedgerConfig, OtpLedger};
//! use std::time::Duration;
//!
//! let ledger = OtpLedger::new(LedgerConfig::default());
//! ledger.put("a@x.com", "123456", Duration::from_secs(60));
//!
//! assert_eq!(ledger.consume("a@x.com", "123456"), ConsumeOutcome::Matched);
//! assert_eq!(ledger.consume("a@x.com", "123456"), ConsumeOutcome::NotFound);
//! ```

pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod random;
pub mod security;
pub mod service;
pub mod transport;
pub mod validation;

pub use error::{Error, ErrorKind, Result};

// ============================================================================
// 账本相关导出
// ============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{
    Challenge, ConsumeOutcome, LedgerConfig, OtpLedger, SweeperHandle, spawn_sweeper,
};

// ============================================================================
// 服务相关导出
// ============================================================================

pub use service::{
    IssuedChallenge, ServiceConfig, VerificationService, VerifyFailure, VerifyOutcome,
};

// ============================================================================
// 投递相关导出
// ============================================================================

pub use delivery::{LogSender, MessageTemplate, Sender};
#[cfg(feature = "smtp")]
pub use delivery::{SmtpConfig, SmtpSender};

// ============================================================================
// 传输与安全相关导出
// ============================================================================

pub use self::config::Settings;
pub use security::{RateLimitConfig, RateLimiter, SlidingWindowLimiter};
pub use transport::{
    ErrorResponse, IssueRequest, IssueResponse, OtpEndpoint, VerifyRequest, VerifyResponse,
};
