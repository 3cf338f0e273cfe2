//! 错误类型
//!
//! 存储层错误（花名册 / 考勤账本）向上传播给引擎调用方；引擎不重试，会话保持调用前状态。

use thiserror::Error;

/// 花名册与考勤账本读写失败
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "async-sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// 行数据无法解析（如日期或状态字段损坏）
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// 会话引擎对外错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// 发送者或消息为空：应在 Webhook 边界拦截，不应到达引擎
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
