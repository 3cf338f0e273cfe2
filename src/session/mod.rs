//! 会话：状态模型与按发送者加锁的会话存储

pub mod state;
pub mod store;

pub use state::{AttendanceRun, SessionState};
pub use store::{SessionGuard, SessionStore};
