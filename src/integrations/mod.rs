//! 外部集成：消息网关 Webhook 与出站发送（需对应 feature 与公网 Webhook 域名）

#[cfg(feature = "whatsapp")]
pub mod onesender;
