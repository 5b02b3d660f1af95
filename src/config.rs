//! 部署配置
//!
//! [`Settings`] 是一份扁平的、可反序列化的配置，从带 `OTP_` 前缀的环境变量
//! 读取（例如 `OTP_TTL_SECS=300`、`OTP_SMTP_HOST=mail.internal`），未设置的
//! 字段使用默认值。加载后再转换成各组件自己的配置类型。
//!
//! ## 示例
//!
//! ```rust
//! use inbox_otp::config::Settings;
//!
//! let source = config::Config::builder()
//!     .set_override("ttl_secs", 300)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! let settings = Settings::from_config(source).unwrap();
//!
//! assert_eq!(settings.service_config().ttl.as_secs(), 300);
//! ```

use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::ledger::LedgerConfig;
use crate::security::RateLimitConfig;
use crate::service::ServiceConfig;

#[cfg(feature = "smtp")]
use crate::delivery::SmtpConfig;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "OTP";

/// 扁平部署配置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_shards")]
    pub shards: usize,
    #[serde(default)]
    pub expose_code: bool,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,
    #[serde(default)]
    pub smtp_tls: bool,

    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

// Default values
fn default_ttl_secs() -> u64 {
    600
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_entries() -> usize {
    100_000
}

fn default_shards() -> usize {
    16
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_smtp_from() -> String {
    "no-reply@localhost".to_string()
}

fn default_rate_limit_max_requests() -> u32 {
    5
}

fn default_rate_limit_window_secs() -> u64 {
    600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_entries: default_max_entries(),
            shards: default_shards(),
            expose_code: false,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_from: default_smtp_from(),
            smtp_tls: false,
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

impl Settings {
    /// 从 `OTP_*` 环境变量加载
    pub fn from_env() -> Result<Self> {
        info!("loading configuration from environment");
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Self::from_config(source)
    }

    /// 从已构建好的配置源加载并校验
    pub fn from_config(source: config::Config) -> Result<Self> {
        let settings: Self = source
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ttl_secs", self.ttl_secs),
            ("delivery_timeout_secs", self.delivery_timeout_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("max_entries", self.max_entries as u64),
            ("shards", self.shards as u64),
            ("rate_limit_max_requests", u64::from(self.rate_limit_max_requests)),
            ("rate_limit_window_secs", self.rate_limit_window_secs),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.smtp_username.is_some() != self.smtp_password.is_some() {
            return Err(ConfigError::InvalidValue {
                key: "smtp_username".to_string(),
                message: "smtp_username and smtp_password must be set together".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// 服务配置
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::default()
            .with_ttl(Duration::from_secs(self.ttl_secs))
            .with_delivery_timeout(Duration::from_secs(self.delivery_timeout_secs))
            .with_expose_code(self.expose_code)
    }

    /// 账本配置
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_shards(self.shards)
            .with_max_entries(self.max_entries)
    }

    /// 清理间隔
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 签发限流配置
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new()
            .with_max_requests(self.rate_limit_max_requests)
            .with_window(Duration::from_secs(self.rate_limit_window_secs))
    }

    /// SMTP 配置
    #[cfg(feature = "smtp")]
    pub fn smtp_config(&self) -> SmtpConfig {
        let mut smtp = SmtpConfig::new(&self.smtp_host, &self.smtp_from)
            .with_port(self.smtp_port)
            .with_tls(self.smtp_tls)
            .with_timeout(Duration::from_secs(self.delivery_timeout_secs));

        if let (Some(username), Some(password)) = (&self.smtp_username, &self.smtp_password) {
            smtp = smtp.with_credentials(username, password);
        }
        smtp
    }
}
