//! 安全防护模块
//!
//! 目前只包含入口限流：
//!
//! - **rate_limit**: 滑动窗口速率限制，防止被利用来轰炸邮箱

pub mod rate_limit;

pub use rate_limit::{RateLimitConfig, RateLimitInfo, RateLimiter, SlidingWindowLimiter, Unlimited};
