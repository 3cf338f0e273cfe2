//! 花名册与考勤账本
//!
//! - **RosterStore**: 班级与学生的只读查询
//! - **AttendanceLedger**: 只追加的考勤记录
//! - **MemoryStore**: 内存实现（测试 / 无数据库运行）
//! - **SqliteStore**: SQLite 实现（需 `async-sqlite` feature）

mod memory;
#[cfg(feature = "async-sqlite")]
mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::StoreError;

pub use memory::MemoryStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteStore;

pub type ClassId = i64;
pub type StudentId = i64;

/// 班级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
}

/// 学生
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
}

/// 出勤状态；回复令牌 `1`..`4` 依次对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Sick,
    Excused,
    Absent,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Sick,
        AttendanceStatus::Excused,
        AttendanceStatus::Absent,
    ];

    /// 解析状态令牌（已去除首尾空白）
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "1" => Some(Self::Present),
            "2" => Some(Self::Sick),
            "3" => Some(Self::Excused),
            "4" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Present => "1",
            Self::Sick => "2",
            Self::Excused => "3",
            Self::Absent => "4",
        }
    }

    /// 数据库中存储的标签，与旧库 `absensi.status` 列兼容
    pub fn label(self) -> &'static str {
        match self {
            Self::Present => "Hadir",
            Self::Sick => "Sakit",
            Self::Excused => "Izin",
            Self::Absent => "Alpa",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 一条考勤记录：学生、日期、状态、记录人（发送者身份）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: StudentId,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub recorded_by: String,
}

/// 花名册查询
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// 全部班级，按名称排序
    async fn list_classes(&self) -> Result<Vec<Class>, StoreError>;

    /// 班级内学生，顺序稳定（按插入顺序）
    async fn list_students(&self, class_id: ClassId) -> Result<Vec<Student>, StoreError>;

    /// 班级名称；不存在时返回 None
    async fn class_name(&self, class_id: ClassId) -> Result<Option<String>, StoreError>;
}

/// 考勤账本：只追加，不去重
#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    async fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// 某天的全部记录，按写入顺序
    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError>;
}
