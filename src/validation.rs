//! 输入校验
//!
//! 账本本身接受任意字符串；形状校验都在进入账本之前完成。

use validator::ValidateEmail;

use crate::error::{Result, ValidationError};

/// 验证码位数
pub const CODE_LENGTH: usize = 6;

/// 邮箱地址最大长度（RFC 5321 路径长度上限）
pub const MAX_IDENTITY_LENGTH: usize = 254;

/// 校验身份是否为合理的邮箱地址
///
/// ```rust
/// use inbox_otp::validation::validate_identity;
///
/// assert!(validate_identity("a@x.com").is_ok());
/// assert!(validate_identity("").is_err());
/// assert!(validate_identity("not-an-email").is_err());
/// ```
pub fn validate_identity(identity: &str) -> Result<()> {
    if identity.trim().is_empty() {
        return Err(ValidationError::EmptyField("identity".to_string()).into());
    }

    let plausible = identity.len() <= MAX_IDENTITY_LENGTH
        && identity.trim() == identity
        && identity.to_string().validate_email();
    if !plausible {
        return Err(ValidationError::InvalidEmail(identity.to_string()).into());
    }

    Ok(())
}

/// 校验验证码是否恰好为 6 位 ASCII 数字
pub fn validate_code(code: &str) -> Result<()> {
    if code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCode.into())
    }
}
