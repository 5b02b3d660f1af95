//! 统一错误类型模块
//!
//! 提供 inbox-otp 库中所有操作的错误类型定义。
//!
//! 注意：验证码校验失败（不存在 / 已过期 / 不匹配）不是错误，
//! 而是 [`ConsumeOutcome`](crate::ledger::ConsumeOutcome) 结果的一部分。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// inbox-otp 库的统一结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// inbox-otp 库的错误类型
#[derive(Debug)]
pub enum Error {
    /// 输入校验错误（邮箱或验证码格式不合法）
    Validation(ValidationError),

    /// 验证码投递失败
    Delivery(DeliveryError),

    /// 配置错误
    Config(ConfigError),

    /// 加密 / 随机数错误
    Crypto(CryptoError),

    /// 速率限制超出
    RateLimitExceeded {
        /// 限流的客户端标识
        client_key: String,
    },

    /// 内部错误
    Internal(String),
}

impl Error {
    /// 创建一个内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// 创建一个速率限制错误
    pub fn rate_limited(client_key: impl Into<String>) -> Self {
        Error::RateLimitExceeded {
            client_key: client_key.into(),
        }
    }

    /// 对外暴露的错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::InvalidInput,
            Error::Delivery(_) => ErrorKind::DeliveryFailed,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimited,
            Error::Config(_) | Error::Crypto(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 调用方是否可以安全地重试同一请求
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DeliveryFailed | ErrorKind::RateLimited
        )
    }
}

/// 对外的错误分类
///
/// 传输层只看到这个粗粒度分类，具体原因只进入日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 客户端输入不合法，不应重试
    InvalidInput,
    /// 投递失败，可以重新申请验证码
    DeliveryFailed,
    /// 被上游限流
    RateLimited,
    /// 服务内部错误
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
            ErrorKind::DeliveryFailed => write!(f, "delivery_failed"),
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// 输入校验相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 无效的邮箱格式
    InvalidEmail(String),
    /// 字段为空
    EmptyField(String),
    /// 验证码必须是 6 位 ASCII 数字
    InvalidCode,
}

/// 投递相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// 收件地址无法被邮件传输接受
    InvalidAddress(String),
    /// 邮件服务器明确拒绝（永久失败）
    Rejected(String),
    /// 网络或协议层失败（暂时性）
    Transport(String),
    /// 在给定时间内未完成投递
    TimedOut(Duration),
}

/// 配置相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// 无法加载配置源
    Load(String),
    /// 无效的配置值
    InvalidValue { key: String, message: String },
}

/// 加密相关错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// 随机数生成失败
    RngFailed(String),
}

// ============================================================================
// Display 实现
// ============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Delivery(e) => write!(f, "Delivery error: {}", e),
            Error::Config(e) => write!(f, "Config error: {}", e),
            Error::Crypto(e) => write!(f, "Crypto error: {}", e),
            Error::RateLimitExceeded { client_key } => {
                write!(f, "Rate limit exceeded for '{}'", client_key)
            }
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidEmail(email) => write!(f, "invalid email format: {}", email),
            ValidationError::EmptyField(field) => write!(f, "field '{}' cannot be empty", field),
            ValidationError::InvalidCode => write!(f, "code must be exactly 6 ASCII digits"),
        }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::InvalidAddress(addr) => write!(f, "invalid recipient address: {}", addr),
            DeliveryError::Rejected(msg) => write!(f, "message rejected: {}", msg),
            DeliveryError::Transport(msg) => write!(f, "transport failure: {}", msg),
            DeliveryError::TimedOut(after) => write!(f, "delivery timed out after {:?}", after),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Load(msg) => write!(f, "failed to load configuration: {}", msg),
            ConfigError::InvalidValue { key, message } => {
                write!(f, "invalid configuration value for '{}': {}", key, message)
            }
        }
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::RngFailed(msg) => write!(f, "random number generation failed: {}", msg),
        }
    }
}

// ============================================================================
// std::error::Error 实现
// ============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Validation(e) => Some(e),
            Error::Delivery(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Crypto(e) => Some(e),
            Error::RateLimitExceeded { .. } | Error::Internal(_) => None,
        }
    }
}

impl std::error::Error for ValidationError {}
impl std::error::Error for DeliveryError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for CryptoError {}

// ============================================================================
// From 实现 - 方便错误转换
// ============================================================================

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        Error::Delivery(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
