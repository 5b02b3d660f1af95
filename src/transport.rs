//! 传输层适配
//!
//! [`OtpEndpoint`] 不绑定任何 Web 框架：它接收可反序列化的请求对象，
//! 返回可序列化的响应对象，由上层框架负责路由和编码。
//!
//! 职责：
//! - 在签发和验证之前咨询 [`RateLimiter`]
//! - 把 [`Error`] 折叠成 [`ErrorKind`] 分类
//! - 把所有验证失败折叠成同一条提示，不泄露具体原因
//!
//! ## 示例
//!
//! ```rust
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use inbox_otp::delivery::LogSender;
//! use inbox_otp::security::Unlimited;
//! use inbox_otp::service::{ServiceConfig, VerificationService};
//! use inbox_otp::transport::{IssueRequest, OtpEndpoint, VerifyRequest};
//!
//! let service = VerificationService::new(LogSender, ServiceConfig::default());
//! let endpoint = OtpEndpoint::new(service, Unlimited);
//!
//! let request: IssueRequest = serde_json::from_str(
//!     r#"{"identity": "a@x.com", "override_code": "123456"}"#,
//! ).unwrap();
//! endpoint.issue("198.51.100.1", request).await.unwrap();
//!
//! let response = endpoint
//!     .verify("198.51.100.1", VerifyRequest::new("a@x.com", "000000"))
//!     .await
//!     .unwrap();
//! assert!(!response.success);
//! assert_eq!(response.message.as_deref(), Some("invalid or expired code"));
//! # });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::delivery::Sender;
use crate::error::{Error, ErrorKind};
use crate::security::RateLimiter;
use crate::service::{IssuedChallenge, VerificationService, VerifyOutcome};

// ============================================================================
// 请求 / 响应
// ============================================================================

/// 签发请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub identity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_code: Option<String>,
}

impl IssueRequest {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            override_code: None,
        }
    }
}

/// 验证请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub identity: String,
    pub submitted_code: String,
}

impl VerifyRequest {
    pub fn new(identity: impl Into<String>, submitted_code: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            submitted_code: submitted_code.into(),
        }
    }
}

/// 签发响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResponse {
    pub identity: String,
    pub expires_at: DateTime<Utc>,

    /// 只在服务开启 `expose_code` 时出现
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<IssuedChallenge> for IssueResponse {
    fn from(issued: IssuedChallenge) -> Self {
        Self {
            identity: issued.identity,
            expires_at: issued.expires_at,
            code: issued.code,
        }
    }
}

/// 验证响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.public_message().map(str::to_string),
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub message: String,
}

impl From<Error> for ErrorResponse {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let message = match kind {
            // 输入错误的描述只回显调用方自己的输入
            ErrorKind::InvalidInput => err.to_string(),
            ErrorKind::DeliveryFailed => "failed to deliver verification code".to_string(),
            ErrorKind::RateLimited => "too many requests, try again later".to_string(),
            ErrorKind::Internal => "internal error".to_string(),
        };
        Self {
            error: kind,
            message,
        }
    }
}

// ============================================================================
// 适配器
// ============================================================================

/// 框架无关的 OTP 接口
pub struct OtpEndpoint<S: Sender, L: RateLimiter> {
    service: VerificationService<S>,
    limiter: L,
}

impl<S: Sender, L: RateLimiter> OtpEndpoint<S, L> {
    /// 创建接口
    pub fn new(service: VerificationService<S>, limiter: L) -> Self {
        Self { service, limiter }
    }

    /// 处理签发请求
    ///
    /// `client_key` 通常是客户端 IP；限流键为 `issue:{client_key}`。
    pub async fn issue(
        &self,
        client_key: &str,
        request: IssueRequest,
    ) -> Result<IssueResponse, ErrorResponse> {
        self.admit(&format!("issue:{client_key}")).await?;

        self.service
            .issue_challenge(&request.identity, request.override_code.as_deref())
            .await
            .map(IssueResponse::from)
            .map_err(ErrorResponse::from)
    }

    /// 处理验证请求
    ///
    /// 限流键为 `verify:{client_key}`。
    pub async fn verify(
        &self,
        client_key: &str,
        request: VerifyRequest,
    ) -> Result<VerifyResponse, ErrorResponse> {
        self.admit(&format!("verify:{client_key}")).await?;

        self.service
            .verify_challenge(&request.identity, &request.submitted_code)
            .await
            .map(VerifyResponse::from)
            .map_err(ErrorResponse::from)
    }

    async fn admit(&self, key: &str) -> Result<(), ErrorResponse> {
        if self.limiter.allow(key).await {
            Ok(())
        } else {
            warn!(client_key = key, "request rejected by rate limiter");
            Err(Error::rate_limited(key).into())
        }
    }

    /// 底层服务
    pub fn service(&self) -> &VerificationService<S> {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::LogSender;
    use crate::error::{DeliveryError, ValidationError};
    use crate::security::{RateLimitConfig, SlidingWindowLimiter, Unlimited};
    use crate::service::ServiceConfig;

    fn endpoint() -> OtpEndpoint<LogSender, Unlimited> {
        OtpEndpoint::new(
            VerificationService::new(LogSender, ServiceConfig::default()),
            Unlimited,
        )
    }

    #[tokio::test]
    async fn test_issue_then_verify() {
        let endpoint = endpoint();
        let mut request = IssueRequest::new("a@x.com");
        request.override_code = Some("135790".into());

        let issued = endpoint.issue("c", request).await.unwrap();
        assert_eq!(issued.identity, "a@x.com");
        assert!(issued.code.is_none());

        let ok = endpoint
            .verify("c", VerifyRequest::new("a@x.com", "135790"))
            .await
            .unwrap();
        assert!(ok.success);
        assert!(ok.message.is_none());
    }

    #[tokio::test]
    async fn test_failures_are_collapsed() {
        let endpoint = endpoint();
        let never_issued = endpoint
            .verify("c", VerifyRequest::new("a@x.com", "111111"))
            .await
            .unwrap();

        endpoint
            .issue(
                "c",
                IssueRequest {
                    identity: "a@x.com".into(),
                    override_code: Some("222222".into()),
                },
            )
            .await
            .unwrap();
        let mismatch = endpoint
            .verify("c", VerifyRequest::new("a@x.com", "111111"))
            .await
            .unwrap();

        assert_eq!(never_issued, mismatch);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let endpoint = endpoint();
        let err = endpoint
            .issue("c", IssueRequest::new("not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(err.error, ErrorKind::InvalidInput);

        let err = endpoint
            .verify("c", VerifyRequest::new("a@x.com", "abc"))
            .await
            .unwrap_err();
        assert_eq!(err.error, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_rate_limited_issue_never_touches_ledger() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig::new().with_max_requests(1));
        let endpoint = OtpEndpoint::new(
            VerificationService::new(LogSender, ServiceConfig::default()),
            limiter,
        );

        endpoint.issue("c", IssueRequest::new("a@x.com")).await.unwrap();
        let err = endpoint
            .issue("c", IssueRequest::new("b@x.com"))
            .await
            .unwrap_err();

        assert_eq!(err.error, ErrorKind::RateLimited);
        assert_eq!(endpoint.service().ledger().len(), 1);

        // 签发与验证的额度互不影响
        assert!(
            endpoint
                .verify("c", VerifyRequest::new("a@x.com", "000000"))
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_error_response_hides_internals() {
        let response = ErrorResponse::from(Error::Delivery(DeliveryError::Transport(
            "10.0.0.3:25 refused".into(),
        )));
        assert_eq!(response.error, ErrorKind::DeliveryFailed);
        assert!(!response.message.contains("10.0.0.3"));

        let response = ErrorResponse::from(Error::internal("lock poisoned"));
        assert_eq!(response.message, "internal error");

        let response = ErrorResponse::from(Error::Validation(ValidationError::InvalidCode));
        assert_eq!(response.error, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_dto_json_shape() {
        let request: VerifyRequest =
            serde_json::from_str(r#"{"identity":"a@x.com","submitted_code":"123456"}"#).unwrap();
        assert_eq!(request, VerifyRequest::new("a@x.com", "123456"));

        let json = serde_json::to_value(VerifyResponse {
            success: true,
            message: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "success": true }));

        let json = serde_json::to_value(ErrorResponse {
            error: ErrorKind::RateLimited,
            message: "x".into(),
        })
        .unwrap();
        assert_eq!(json["error"], "rate_limited");
    }
}
