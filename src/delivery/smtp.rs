//! 基于 lettre 的 SMTP 发送器

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::AsyncSmtpTransportBuilder;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

use super::Sender;
use crate::error::{ConfigError, DeliveryError, Result};

/// SMTP 配置
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP 服务器地址
    pub host: String,

    /// 端口
    pub port: u16,

    /// 用户名与密码（都提供时才启用认证）
    pub username: Option<String>,
    pub password: Option<String>,

    /// 发件地址
    pub from_address: String,

    /// 是否通过 TLS relay 连接（需要 `smtp-tls` feature）
    pub tls: bool,

    /// 单次 SMTP 会话的超时
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            from_address: "no-reply@localhost".to_string(),
            tls: false,
            timeout: Duration::from_secs(10),
        }
    }
}

impl SmtpConfig {
    /// 创建新配置
    pub fn new(host: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            from_address: from_address.into(),
            ..Self::default()
        }
    }

    /// 设置端口
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 设置认证信息
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// 设置是否使用 TLS
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// 设置会话超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// SMTP 发送器
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSender")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpSender {
    /// 根据配置创建发送器
    ///
    /// 只构建传输对象，不会建立连接。
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| ConfigError::InvalidValue {
                key: "from_address".to_string(),
                message: e.to_string(),
            })?;

        let mut builder = transport_builder(config)?
            .port(config.port)
            .timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[cfg(feature = "smtp-tls")]
fn transport_builder(config: &SmtpConfig) -> Result<AsyncSmtpTransportBuilder> {
    if config.tls {
        let builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(|e| {
            ConfigError::InvalidValue {
                key: "smtp_host".to_string(),
                message: e.to_string(),
            }
        })?;
        return Ok(builder);
    }
    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
        config.host.as_str(),
    ))
}

#[cfg(not(feature = "smtp-tls"))]
fn transport_builder(config: &SmtpConfig) -> Result<AsyncSmtpTransportBuilder> {
    if config.tls {
        return Err(ConfigError::InvalidValue {
            key: "smtp_tls".to_string(),
            message: "TLS relay requires the `smtp-tls` feature".to_string(),
        }
        .into());
    }
    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
        config.host.as_str(),
    ))
}

#[async_trait]
impl Sender for SmtpSender {
    async fn deliver(
        &self,
        identity: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError> {
        let to: Mailbox = identity
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(identity.to_string()))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(_) => {
                debug!(identity, "smtp relay accepted message");
                Ok(())
            }
            Err(e) if e.is_permanent() => Err(DeliveryError::Rejected(e.to_string())),
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        }
    }
}
