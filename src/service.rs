//! 验证服务
//!
//! 在 [`OtpLedger`] 之上提供两个用例：
//!
//! 1. [`issue_challenge`](VerificationService::issue_challenge)：生成验证码、
//!    写入账本，然后在锁外通过 [`Sender`] 投递
//! 2. [`verify_challenge`](VerificationService::verify_challenge)：消费用户
//!    提交的验证码
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use inbox_otp::delivery::LogSender;
//! use inbox_otp::service::{ServiceConfig, VerificationService};
//!
//! let service = VerificationService::new(LogSender, ServiceConfig::for_testing());
//!
//! let issued = service.issue_challenge("user@example.com", None).await.unwrap();
//! let code = issued.code.unwrap();
//!
//! let first = service.verify_challenge("user@example.com", &code).await.unwrap();
//! assert!(first.success);
//!
//! let second = service.verify_challenge("user@example.com", &code).await.unwrap();
//! assert!(!second.success);
//! # });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::delivery::{MessageTemplate, Sender};
use crate::error::{DeliveryError, Result};
use crate::ledger::{ConsumeOutcome, LedgerConfig, OtpLedger};
use crate::random::generate_numeric_code;
use crate::validation::{CODE_LENGTH, validate_code, validate_identity};

/// 验证失败时对外统一使用的提示
pub const GENERIC_FAILURE_MESSAGE: &str = "invalid or expired code";

// ============================================================================
// 配置
// ============================================================================

/// 验证服务配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// 验证码有效期
    pub ttl: Duration,

    /// 单次投递的默认超时
    pub delivery_timeout: Duration,

    /// 是否在签发结果中返回验证码（仅用于测试 / 演示）
    pub expose_code: bool,

    /// 邮件模板
    pub template: MessageTemplate,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60), // 10 分钟
            delivery_timeout: Duration::from_secs(10),
            expose_code: false,
            template: MessageTemplate::default(),
        }
    }
}

impl ServiceConfig {
    /// 创建新配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置有效期
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// 设置投递超时
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// 设置是否返回验证码
    pub fn with_expose_code(mut self, expose: bool) -> Self {
        self.expose_code = expose;
        self
    }

    /// 设置邮件模板
    pub fn with_template(mut self, template: MessageTemplate) -> Self {
        self.template = template;
        self
    }

    /// 测试模式配置
    ///
    /// 与默认配置相同，但签发结果会带回验证码。不要在生产环境使用。
    pub fn for_testing() -> Self {
        Self::default().with_expose_code(true)
    }
}

// ============================================================================
// 结果类型
// ============================================================================

/// 签发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    /// 目标邮箱
    pub identity: String,

    /// 签发时间
    pub issued_at: DateTime<Utc>,

    /// 过期时间
    pub expires_at: DateTime<Utc>,

    /// 验证码，仅在测试模式下返回
    pub code: Option<String>,
}

/// 验证失败的具体原因
///
/// 只用于日志和内部统计，对外统一为 [`GENERIC_FAILURE_MESSAGE`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyFailure {
    /// 从未签发，或已被消费 / 撤销
    NotFound,
    /// 已过期
    Expired,
    /// 验证码错误
    Mismatch,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyFailure::NotFound => write!(f, "not_found"),
            VerifyFailure::Expired => write!(f, "expired"),
            VerifyFailure::Mismatch => write!(f, "mismatch"),
        }
    }
}

/// 验证结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// 是否验证成功
    pub success: bool,

    /// 失败原因（成功时为 `None`）
    pub failure: Option<VerifyFailure>,
}

impl VerifyOutcome {
    /// 对外展示的提示；成功时为 `None`
    pub fn public_message(&self) -> Option<&'static str> {
        (!self.success).then_some(GENERIC_FAILURE_MESSAGE)
    }
}

impl From<ConsumeOutcome> for VerifyOutcome {
    fn from(outcome: ConsumeOutcome) -> Self {
        let failure = match outcome {
            ConsumeOutcome::Matched => None,
            ConsumeOutcome::Expired => Some(VerifyFailure::Expired),
            ConsumeOutcome::NotFound => Some(VerifyFailure::NotFound),
            ConsumeOutcome::Mismatch => Some(VerifyFailure::Mismatch),
        };
        Self {
            success: failure.is_none(),
            failure,
        }
    }
}

// ============================================================================
// 服务
// ============================================================================

/// 验证服务
///
/// 唯一带外部依赖（[`Sender`]）的组件；账本从不向外调用。
pub struct VerificationService<S: Sender> {
    ledger: Arc<OtpLedger>,
    sender: S,
    config: ServiceConfig,
}

impl<S: Sender> VerificationService<S> {
    /// 使用新建的内存账本创建服务
    pub fn new(sender: S, config: ServiceConfig) -> Self {
        Self::with_ledger(
            Arc::new(OtpLedger::new(LedgerConfig::default())),
            sender,
            config,
        )
    }

    /// 使用已有账本创建服务（例如与清理任务共享）
    pub fn with_ledger(ledger: Arc<OtpLedger>, sender: S, config: ServiceConfig) -> Self {
        Self {
            ledger,
            sender,
            config,
        }
    }

    /// 签发挑战，使用配置中的默认投递超时
    ///
    /// # Errors
    ///
    /// - `identity` 为空或不像邮箱地址 / `override_code` 不是 6 位数字 → 校验错误
    /// - 投递失败或超时 → 投递错误；此时挑战已写入账本且不会回滚，
    ///   重新签发会直接替换它
    pub async fn issue_challenge(
        &self,
        identity: &str,
        override_code: Option<&str>,
    ) -> Result<IssuedChallenge> {
        self.issue_challenge_with_timeout(identity, override_code, self.config.delivery_timeout)
            .await
    }

    /// 签发挑战，使用调用方给定的投递超时
    ///
    /// 丢弃返回的 future 即取消投递。
    pub async fn issue_challenge_with_timeout(
        &self,
        identity: &str,
        override_code: Option<&str>,
        delivery_timeout: Duration,
    ) -> Result<IssuedChallenge> {
        validate_identity(identity)?;
        let code = match override_code {
            Some(code) => {
                validate_code(code)?;
                code.to_string()
            }
            None => generate_numeric_code(CODE_LENGTH as u32)?,
        };

        // 账本锁只在 put 内部持有，下面的网络 I/O 不受影响
        let challenge = self.ledger.put(identity, &code, self.config.ttl);

        let message = self.config.template.render(&code, self.config.ttl);
        let delivery = tokio::time::timeout(
            delivery_timeout,
            self.sender.deliver(identity, &message.subject, &message.body),
        )
        .await
        .unwrap_or(Err(DeliveryError::TimedOut(delivery_timeout)));

        if let Err(e) = delivery {
            warn!(identity, error = %e, "challenge stored but delivery failed");
            return Err(e.into());
        }

        info!(identity, expires_at = %challenge.expires_at, "challenge issued");

        Ok(IssuedChallenge {
            identity: challenge.identity,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
            code: self.config.expose_code.then_some(code),
        })
    }

    /// 验证用户提交的验证码
    ///
    /// 成功后挑战被消费，不能再次验证。失败原因记录在日志中，
    /// 返回值里也保留了具体原因，供调用方自行决定是否对外折叠。
    ///
    /// # Errors
    ///
    /// `identity` 或 `submitted_code` 形状不合法时返回校验错误，不会触碰账本。
    pub async fn verify_challenge(
        &self,
        identity: &str,
        submitted_code: &str,
    ) -> Result<VerifyOutcome> {
        validate_identity(identity)?;
        validate_code(submitted_code)?;

        let outcome = VerifyOutcome::from(self.ledger.consume(identity, submitted_code));
        match outcome.failure {
            None => info!(identity, "challenge verified"),
            Some(reason) => warn!(identity, %reason, "challenge verification failed"),
        }

        Ok(outcome)
    }

    /// 撤销身份当前的挑战
    pub fn revoke(&self, identity: &str) -> bool {
        self.ledger.revoke(identity)
    }

    /// 共享的账本
    pub fn ledger(&self) -> &Arc<OtpLedger> {
        &self.ledger
    }

    /// 获取配置
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}
