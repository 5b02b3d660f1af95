//! 安全随机数生成模块
//!
//! 提供密码学安全的验证码生成和常量时间比较。

use rand::{TryRngCore, rngs::OsRng};

use crate::error::{CryptoError, Error, Result};

/// 数字验证码允许的最大位数（10^9 仍小于 u32::MAX）
const MAX_NUMERIC_DIGITS: u32 = 9;

/// 生成指定长度的随机字节数组
///
/// 使用操作系统提供的密码学安全随机数生成器 (CSPRNG)
///
/// # Example
///
/// ```rust
/// use inbox_otp::random::generate_random_bytes;
///
/// let bytes = generate_random_bytes(32).unwrap();
/// assert_eq!(bytes.len(), 32);
/// ```
pub fn generate_random_bytes(length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))?;
    Ok(bytes)
}

/// 生成 `[0, bound)` 内均匀分布的随机数
///
/// 直接取模会让较小的余数出现得更频繁，这里丢弃落在
/// `u32` 尾部不完整区间内的样本（拒绝采样）。
fn uniform_below(bound: u32) -> Result<u32> {
    debug_assert!(bound > 0);
    let zone = u32::MAX - (u32::MAX % bound);
    loop {
        let sample = OsRng
            .try_next_u32()
            .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))?;
        if sample < zone {
            return Ok(sample % bound);
        }
    }
}

/// 生成指定位数的数字验证码
///
/// 在 `0..10^digits` 上均匀分布，保留前导零（例如 `"004217"`）。
///
/// # Example
///
/// ```rust
/// use inbox_otp::random::generate_numeric_code;
///
/// let code = generate_numeric_code(6).unwrap();
/// assert_eq!(code.len(), 6);
/// assert!(code.bytes().all(|b| b.is_ascii_digit()));
/// ```
pub fn generate_numeric_code(digits: u32) -> Result<String> {
    if digits == 0 || digits > MAX_NUMERIC_DIGITS {
        return Err(Error::internal(format!(
            "numeric code length must be between 1 and {}",
            MAX_NUMERIC_DIGITS
        )));
    }
    let value = uniform_below(10u32.pow(digits))?;
    Ok(format!("{:0>width$}", value, width = digits as usize))
}

/// 常量时间比较两个字节切片
///
/// 用于防止时序攻击。长度不同时直接返回 false。
///
/// # Example
///
/// ```rust
/// use inbox_otp::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"123456", b"123456"));
/// assert!(!constant_time_compare(b"123456", b"654321"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
