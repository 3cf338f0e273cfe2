//! 会话引擎：把发送者的一条消息解释为状态转换
//!
//! 每条入站消息：
//! 1. 锁定发送者的会话（同一发送者串行）
//! 2. 全局取消指令优先于任何状态
//! 3. 按当前状态分派，查询花名册 / 写账本，得到下一状态与回复
//! 4. 存储出错时直接返回错误，会话保持调用前状态，重投同一消息可安全重放
//!
//! 一条入站消息可以产生多条回复（选班后紧接着发出第一个学生的提示）。

pub mod clock;
pub mod prompts;

use std::num::IntErrorKind;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BotSection;
use crate::core::EngineError;
use crate::roster::{AttendanceLedger, AttendanceRecord, AttendanceStatus, ClassId, RosterStore};
use crate::session::{AttendanceRun, SessionGuard, SessionState, SessionStore};

pub use clock::{Clock, FixedClock, SystemClock};

/// 待发送给某个接收者的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outbound {
    pub recipient: String,
    pub text: String,
}

/// 指令关键字（比较时忽略大小写与首尾空白）
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub start_keyword: String,
    pub cancel_keyword: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&BotSection::default())
    }
}

impl From<&BotSection> for EngineSettings {
    fn from(bot: &BotSection) -> Self {
        Self {
            start_keyword: bot.start_keyword.trim().to_string(),
            cancel_keyword: bot.cancel_keyword.trim().to_string(),
        }
    }
}

/// 一次状态转换的结果
#[derive(Debug)]
struct Transition {
    next: SessionState,
    replies: Vec<String>,
}

impl Transition {
    fn new(next: SessionState) -> Self {
        Self {
            next,
            replies: Vec::new(),
        }
    }

    fn reply(mut self, text: String) -> Self {
        self.replies.push(text);
        self
    }
}

pub struct ConversationEngine {
    roster: Arc<dyn RosterStore>,
    ledger: Arc<dyn AttendanceLedger>,
    sessions: Arc<SessionStore>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        roster: Arc<dyn RosterStore>,
        ledger: Arc<dyn AttendanceLedger>,
        sessions: Arc<SessionStore>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            roster,
            ledger,
            sessions,
            clock,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// 处理一条入站消息，返回按顺序发送的回复
    pub async fn handle_message(&self, sender: &str, text: &str) -> Result<Vec<Outbound>, EngineError> {
        let sender = sender.trim();
        let text = text.trim();
        if sender.is_empty() {
            return Err(EngineError::InvalidInput("missing sender identity".to_string()));
        }
        if text.is_empty() {
            return Err(EngineError::InvalidInput("missing message text".to_string()));
        }

        let mut session = self.sessions.lock(sender).await;
        let result = self.step(&mut session, sender, text).await;
        // Idle 会话不保留槽位
        self.sessions.release(session).await;
        result
    }

    async fn step(&self, session: &mut SessionGuard, sender: &str, text: &str) -> Result<Vec<Outbound>, EngineError> {
        if text.eq_ignore_ascii_case(&self.settings.cancel_keyword) {
            if session.clear() {
                info!(sender = %sender, "Attendance session cancelled");
            }
            return Ok(outbound(sender, vec![prompts::cancelled()]));
        }

        let from = session.state().name();
        let transition = match session.state() {
            SessionState::Idle => self.on_idle(text).await?,
            SessionState::AwaitingClassChoice => self.on_class_choice(sender, text).await?,
            SessionState::TakingAttendance(run) => self.on_attendance_input(sender, run, text).await?,
        };

        debug!(sender = %sender, from, to = transition.next.name(), "Session transition");
        session.set(transition.next);
        Ok(outbound(sender, transition.replies))
    }

    async fn on_idle(&self, text: &str) -> Result<Transition, EngineError> {
        if !text.eq_ignore_ascii_case(&self.settings.start_keyword) {
            return Ok(Transition::new(SessionState::Idle).reply(prompts::help(&self.settings.start_keyword)));
        }

        let classes = self.roster.list_classes().await?;
        if classes.is_empty() {
            warn!("Start requested but no classes are configured");
            return Ok(Transition::new(SessionState::Idle).reply(prompts::no_classes()));
        }

        Ok(Transition::new(SessionState::AwaitingClassChoice).reply(prompts::class_list(&classes)))
    }

    async fn on_class_choice(&self, sender: &str, text: &str) -> Result<Transition, EngineError> {
        let class_id = match text.parse::<ClassId>() {
            Ok(id) => Some(id),
            // 超出范围的数字不可能是已有班级
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => None,
            Err(_) => {
                return Ok(Transition::new(SessionState::AwaitingClassChoice).reply(prompts::invalid_class_input()));
            }
        };
        let Some(class_id) = class_id else {
            info!(sender = %sender, choice = text, "Class number out of range, session cancelled");
            return Ok(Transition::new(SessionState::Idle).reply(prompts::no_students()));
        };

        let students = self.roster.list_students(class_id).await?;
        let class_name = self.roster.class_name(class_id).await?;

        let run = match class_name {
            Some(name) => AttendanceRun::start(class_id, name, students),
            None => {
                if !students.is_empty() {
                    warn!(class_id, "Students reference a class that does not exist");
                }
                None
            }
        };

        let Some(run) = run else {
            info!(sender = %sender, class_id, "No students found, session cancelled");
            return Ok(Transition::new(SessionState::Idle).reply(prompts::no_students()));
        };

        info!(
            sender = %sender,
            class_id,
            class = run.class_name(),
            students = run.roster().len(),
            "Attendance session started"
        );
        let started = prompts::attendance_started(run.class_name());
        let first_prompt = prompts::student_prompt(&run, &self.settings.cancel_keyword);
        Ok(Transition::new(SessionState::TakingAttendance(run))
            .reply(started)
            .reply(first_prompt))
    }

    async fn on_attendance_input(
        &self,
        sender: &str,
        run: &AttendanceRun,
        text: &str,
    ) -> Result<Transition, EngineError> {
        let Some(status) = AttendanceStatus::from_token(text) else {
            return Ok(Transition::new(SessionState::TakingAttendance(run.clone()))
                .reply(prompts::invalid_status_choice())
                .reply(prompts::student_prompt(run, &self.settings.cancel_keyword)));
        };

        let record = AttendanceRecord {
            student_id: run.current().id,
            date: self.clock.today(),
            status,
            recorded_by: sender.to_string(),
        };
        self.ledger.record(&record).await?;
        debug!(
            sender = %sender,
            student_id = record.student_id,
            status = %status,
            "Attendance recorded"
        );

        match run.advance() {
            Some(next) => {
                let prompt = prompts::student_prompt(&next, &self.settings.cancel_keyword);
                Ok(Transition::new(SessionState::TakingAttendance(next)).reply(prompt))
            }
            None => {
                info!(sender = %sender, class = run.class_name(), "Attendance session completed");
                Ok(Transition::new(SessionState::Idle).reply(prompts::attendance_completed(run.class_name())))
            }
        }
    }
}

fn outbound(recipient: &str, replies: Vec<String>) -> Vec<Outbound> {
    replies
        .into_iter()
        .map(|text| Outbound {
            recipient: recipient.to_string(),
            text,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::roster::MemoryStore;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 15).unwrap()
    }

    async fn setup() -> (Arc<MemoryStore>, ConversationEngine) {
        let store = Arc::new(MemoryStore::new());
        store.add_class(1, "10-A").await;
        store.add_class(2, "11-B").await;
        store.add_class(3, "12-C").await;
        store.add_student(1, 1, "Budi").await;
        store.add_student(1, 2, "Citra").await;
        store.add_student(2, 3, "Dewi").await;

        let engine = ConversationEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(SessionStore::default()),
            Arc::new(FixedClock(today())),
            EngineSettings::default(),
        );
        (store, engine)
    }

    fn texts(out: &[Outbound]) -> Vec<&str> {
        out.iter().map(|o| o.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_start_lists_classes() {
        let (_, engine) = setup().await;
        let out = engine.handle_message("T1", "!ABSEN").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipient, "T1");
        assert!(out[0].text.contains("1. 10-A"));
        assert!(out[0].text.contains("2. 11-B"));
        assert_eq!(engine.sessions().snapshot("T1").await, SessionState::AwaitingClassChoice);
    }

    #[tokio::test]
    async fn test_start_without_classes() {
        let store = Arc::new(MemoryStore::new());
        let engine = ConversationEngine::new(
            store.clone(),
            store,
            Arc::new(SessionStore::default()),
            Arc::new(FixedClock(today())),
            EngineSettings::default(),
        );
        let out = engine.handle_message("T1", "!absen").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::no_classes().as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());
    }

    #[tokio::test]
    async fn test_idle_unknown_message_gets_help() {
        let (store, engine) = setup().await;
        let out = engine.handle_message("T1", "99").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::help("!absen").as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_class_choice() {
        let (_, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        let out = engine.handle_message("T1", "sepuluh").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::invalid_class_input().as_str()]);
        assert_eq!(engine.sessions().snapshot("T1").await, SessionState::AwaitingClassChoice);
    }

    #[tokio::test]
    async fn test_class_without_students_cancels() {
        let (_, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        let out = engine.handle_message("T1", "3").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::no_students().as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());

        engine.handle_message("T1", "!absen").await.unwrap();
        let out = engine.handle_message("T1", "42").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::no_students().as_str()]);
    }

    #[tokio::test]
    async fn test_out_of_range_class_number_cancels() {
        let (_, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        let out = engine.handle_message("T1", "99999999999999999999").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::no_students().as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());
    }

    #[tokio::test]
    async fn test_idle_senders_leave_no_slots() {
        let (_, engine) = setup().await;
        for i in 0..500 {
            engine.handle_message(&format!("628{i}"), "99").await.unwrap();
        }
        assert_eq!(engine.sessions().slot_count().await, 0);

        engine.handle_message("T1", "!absen").await.unwrap();
        assert_eq!(engine.sessions().slot_count().await, 1);
        engine.handle_message("T1", "!batal").await.unwrap();
        assert_eq!(engine.sessions().slot_count().await, 0);

        for msg in ["!absen", "2", "1"] {
            engine.handle_message("T2", msg).await.unwrap();
        }
        assert!(engine.sessions().snapshot("T2").await.is_idle());
        assert_eq!(engine.sessions().slot_count().await, 0);
    }

    #[tokio::test]
    async fn test_class_selection_emits_confirmation_and_first_prompt() {
        let (_, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        let out = engine.handle_message("T1", " 1 ").await.unwrap();

        assert_eq!(out.len(), 2);
        assert!(out[0].text.contains("10-A"));
        assert!(out[1].text.contains("(1/2)"));
        assert!(out[1].text.contains("Budi"));

        match engine.sessions().snapshot("T1").await {
            SessionState::TakingAttendance(run) => {
                assert_eq!(run.index(), 0);
                assert_eq!(run.roster().len(), 2);
                assert_eq!(run.class_id(), 1);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_status_reprompts_same_student() {
        let (store, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        engine.handle_message("T1", "1").await.unwrap();

        let out = engine.handle_message("T1", "5").await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, prompts::invalid_status_choice());
        assert!(out[1].text.contains("(1/2)"));
        assert!(out[1].text.contains("Budi"));
        assert!(store.records().await.is_empty());

        match engine.sessions().snapshot("T1").await {
            SessionState::TakingAttendance(run) => assert_eq!(run.index(), 0),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_status_records_and_advances() {
        let (store, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        engine.handle_message("T1", "1").await.unwrap();

        let out = engine.handle_message("T1", "2").await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].text.contains("(2/2)"));
        assert!(out[0].text.contains("Citra"));

        assert_eq!(
            store.records().await,
            vec![AttendanceRecord {
                student_id: 1,
                date: today(),
                status: AttendanceStatus::Sick,
                recorded_by: "T1".to_string(),
            }]
        );

        let out = engine.handle_message("T1", "3").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::attendance_completed("10-A").as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());
        assert_eq!(store.records().await.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_in_any_state() {
        let (_, engine) = setup().await;

        let out = engine.handle_message("T1", "!batal").await.unwrap();
        assert_eq!(texts(&out), vec![prompts::cancelled().as_str()]);
        assert!(engine.sessions().snapshot("T1").await.is_idle());

        engine.handle_message("T1", "!absen").await.unwrap();
        engine.handle_message("T1", "  !Batal ").await.unwrap();
        assert!(engine.sessions().snapshot("T1").await.is_idle());

        engine.handle_message("T1", "!absen").await.unwrap();
        engine.handle_message("T1", "1").await.unwrap();
        engine.handle_message("T1", "!BATAL").await.unwrap();
        assert!(engine.sessions().snapshot("T1").await.is_idle());
    }

    #[tokio::test]
    async fn test_store_read_error_leaves_session_unchanged() {
        let (store, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();

        store.set_fail_reads(true);
        let err = engine.handle_message("T1", "1").await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(engine.sessions().snapshot("T1").await, SessionState::AwaitingClassChoice);

        store.set_fail_reads(false);
        let out = engine.handle_message("T1", "1").await.unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn test_store_write_error_does_not_advance() {
        let (store, engine) = setup().await;
        engine.handle_message("T1", "!absen").await.unwrap();
        engine.handle_message("T1", "1").await.unwrap();

        store.set_fail_writes(true);
        assert!(engine.handle_message("T1", "1").await.is_err());
        match engine.sessions().snapshot("T1").await {
            SessionState::TakingAttendance(run) => assert_eq!(run.index(), 0),
            other => panic!("unexpected state {:?}", other),
        }

        // 重投同一消息从同一位置继续
        store.set_fail_writes(false);
        let out = engine.handle_message("T1", "1").await.unwrap();
        assert!(out[0].text.contains("Citra"));
        assert_eq!(store.records().await.len(), 1);
        assert_eq!(store.records().await[0].student_id, 1);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (_, engine) = setup().await;
        assert!(matches!(
            engine.handle_message("", "!absen").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.handle_message("T1", "   ").await,
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_keywords() {
        let store = Arc::new(MemoryStore::new());
        store.add_class(1, "10-A").await;
        let engine = ConversationEngine::new(
            store.clone(),
            store,
            Arc::new(SessionStore::default()),
            Arc::new(FixedClock(today())),
            EngineSettings {
                start_keyword: "/start".to_string(),
                cancel_keyword: "/stop".to_string(),
            },
        );

        let out = engine.handle_message("T1", "!absen").await.unwrap();
        assert!(out[0].text.contains("/start"));
        engine.handle_message("T1", "/START").await.unwrap();
        assert_eq!(engine.sessions().snapshot("T1").await, SessionState::AwaitingClassChoice);
        engine.handle_message("T1", "/stop").await.unwrap();
        assert!(engine.sessions().snapshot("T1").await.is_idle());
    }
}
