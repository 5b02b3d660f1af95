//! 验证码投递
//!
//! 核心逻辑只通过 [`Sender`] 这一窄接口依赖邮件发送；具体用哪种 relay、
//! 哪种协议由实现决定。
//!
//! - [`SmtpSender`]: 基于 lettre 的异步 SMTP 发送（`smtp` feature）
//! - [`LogSender`]: 只写日志，适用于开发环境

mod template;

#[cfg(feature = "smtp")]
mod smtp;

pub use template::{MessageTemplate, RenderedMessage};

#[cfg(feature = "smtp")]
pub use smtp::{SmtpConfig, SmtpSender};

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::DeliveryError;

/// 投递能力
///
/// 实现方不应持有账本的任何锁；调用方会在外层加超时。
#[async_trait]
pub trait Sender: Send + Sync {
    /// 将消息投递到 `identity` 对应的邮箱
    async fn deliver(
        &self,
        identity: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError>;
}

#[async_trait]
impl<T: Sender + ?Sized> Sender for Arc<T> {
    async fn deliver(
        &self,
        identity: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        (**self).deliver(identity, subject, body).await
    }
}

/// 只记录日志的发送器
///
/// 正文只在 debug 级别输出。
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

#[async_trait]
impl Sender for LogSender {
    async fn deliver(
        &self,
        identity: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        info!(identity, subject, "delivery skipped by log sender");
        debug!(identity, body, "log sender message body");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let sender = LogSender;
        assert!(sender.deliver("a@x.com", "subject", "body").await.is_ok());
    }

    #[tokio::test]
    async fn test_arc_sender_delegates() {
        let sender: Arc<dyn Sender> = Arc::new(LogSender);
        assert!(sender.deliver("a@x.com", "subject", "body").await.is_ok());
    }
}
