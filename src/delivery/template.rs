//! 邮件内容模板

use std::time::Duration;

/// 验证码邮件模板
///
/// 支持的占位符：`{code}`、`{minutes}`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    /// 邮件主题
    pub subject: String,

    /// 邮件正文
    pub body: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            subject: "Your verification code".to_string(),
            body: "Your verification code is {code}.\n\n\
                   It expires in {minutes} minutes. If you did not request it, \
                   you can ignore this email."
                .to_string(),
        }
    }
}

/// 渲染后的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

impl MessageTemplate {
    /// 使用自定义主题和正文
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// 填充占位符
    ///
    /// 有效期按分钟向上取整，至少为 1。
    pub fn render(&self, code: &str, ttl: Duration) -> RenderedMessage {
        let minutes = ttl.as_secs().div_ceil(60).max(1).to_string();
        let fill = |text: &str| text.replace("{code}", code).replace("{minutes}", &minutes);

        RenderedMessage {
            subject: fill(&self.subject),
            body: fill(&self.body),
        }
    }
}
