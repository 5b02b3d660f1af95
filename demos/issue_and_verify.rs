//! 签发并验证一次验证码
//!
//! 运行：`RUST_LOG=inbox_otp=debug cargo run --example issue_and_verify`
//!
//! 配置从 `OTP_*` 环境变量读取；这里使用只写日志的发送器，并打开
//! `expose_code` 以便直接拿到验证码。

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inbox_otp::{
    IssueRequest, LogSender, OtpEndpoint, OtpLedger, Settings, SlidingWindowLimiter,
    VerificationService, VerifyRequest, spawn_sweeper,
};

/// 与 `code` 只差最后一位的验证码
fn wrong_code_for(code: &str) -> String {
    let mut wrong = code.to_string();
    match wrong.pop() {
        Some('9') => wrong.push('0'),
        Some(last) => wrong.push(char::from(last as u8 + 1)),
        None => wrong.push('0'),
    }
    wrong
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_otp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let ledger = Arc::new(OtpLedger::new(settings.ledger_config()));
    let sweeper = spawn_sweeper(Arc::clone(&ledger), settings.sweep_interval());

    let service = VerificationService::with_ledger(
        Arc::clone(&ledger),
        LogSender,
        settings.service_config().with_expose_code(true),
    );
    let endpoint = OtpEndpoint::new(
        service,
        SlidingWindowLimiter::new(settings.rate_limit_config()),
    );

    let client = "127.0.0.1";
    let identity = "demo@example.com";

    let issued = endpoint
        .issue(client, IssueRequest::new(identity))
        .await
        .map_err(|e| e.message)?;
    let code = issued.code.ok_or("code not exposed")?;
    println!("issued {} for {}, expires at {}", code, identity, issued.expires_at);

    let wrong = endpoint
        .verify(client, VerifyRequest::new(identity, wrong_code_for(&code)))
        .await
        .map_err(|e| e.message)?;
    println!("wrong code    -> {}", serde_json::to_string(&wrong)?);

    let first = endpoint
        .verify(client, VerifyRequest::new(identity, code.as_str()))
        .await
        .map_err(|e| e.message)?;
    println!("correct code  -> {}", serde_json::to_string(&first)?);

    let replay = endpoint
        .verify(client, VerifyRequest::new(identity, code.as_str()))
        .await
        .map_err(|e| e.message)?;
    println!("replayed code -> {}", serde_json::to_string(&replay)?);

    sweeper.shutdown().await;
    println!("cleared {} remaining challenges", ledger.shutdown());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_code_always_differs() {
        for code in ["000000", "123459", "999999", "482913"] {
            let wrong = wrong_code_for(code);
            assert_ne!(wrong, code);
            assert_eq!(wrong.len(), 6);
            assert_eq!(wrong[..5], code[..5]);
        }
        assert_eq!(wrong_code_for("000000"), "000001");
        assert_eq!(wrong_code_for("123459"), "123450");
    }
}
