//! 会话状态
//!
//! 三个状态，每个状态只携带自身有效的字段；`Idle` 等价于没有会话。

use std::sync::Arc;

use crate::roster::{ClassId, Student};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// 已发送班级列表，等待回复班级编号
    AwaitingClassChoice,
    /// 正在逐个学生点名
    TakingAttendance(AttendanceRun),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    /// 日志用的状态名
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingClassChoice => "awaiting_class_choice",
            SessionState::TakingAttendance(_) => "taking_attendance",
        }
    }
}

/// 一次点名：选班时冻结的花名册快照 + 当前学生下标
///
/// 下标始终落在 `[0, roster.len())` 内；走完最后一名学生时 `advance` 返回 None。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRun {
    class_id: ClassId,
    class_name: String,
    roster: Arc<[Student]>,
    index: usize,
}

impl AttendanceRun {
    /// 花名册为空时返回 None
    pub fn start(class_id: ClassId, class_name: impl Into<String>, roster: Vec<Student>) -> Option<Self> {
        if roster.is_empty() {
            return None;
        }
        Some(Self {
            class_id,
            class_name: class_name.into(),
            roster: roster.into(),
            index: 0,
        })
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &Student {
        &self.roster[self.index]
    }

    /// (从 1 开始的序号, 总人数)
    pub fn position(&self) -> (usize, usize) {
        (self.index + 1, self.roster.len())
    }

    /// 前进到下一名学生；已是最后一名时返回 None（点名结束）
    pub fn advance(&self) -> Option<Self> {
        let next = self.index + 1;
        if next >= self.roster.len() {
            return None;
        }
        Some(Self {
            index: next,
            ..self.clone()
        })
    }
}
