//! Rollcall - WhatsApp 考勤机器人
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **engine**: 会话引擎（状态机），单一入口 `handle_message`
//! - **integrations**: 消息网关 Webhook 与出站发送
//! - **observability**: 日志初始化
//! - **roster**: 班级 / 学生花名册与考勤账本（内存 / SQLite）
//! - **session**: 会话状态与按发送者加锁的会话存储

pub mod config;
pub mod core;
pub mod engine;
pub mod integrations;
pub mod observability;
pub mod roster;
pub mod session;

pub use engine::{ConversationEngine, EngineSettings, Outbound};
pub use session::{SessionState, SessionStore};
