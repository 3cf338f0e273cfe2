//! 内存花名册 / 账本
//!
//! 无数据库时使用；可注入读写失败，用于验证存储错误下的会话回滚。

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{AttendanceLedger, AttendanceRecord, Class, ClassId, RosterStore, Student};
use crate::core::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    classes: RwLock<Vec<Class>>,
    /// (所属班级, 学生)，按插入顺序
    students: RwLock<Vec<(ClassId, Student)>>,
    records: RwLock<Vec<AttendanceRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_class(&self, id: ClassId, name: impl Into<String>) {
        self.classes.write().await.push(Class {
            id,
            name: name.into(),
        });
    }

    pub async fn add_student(&self, class_id: ClassId, id: i64, full_name: impl Into<String>) {
        self.students.write().await.push((
            class_id,
            Student {
                id,
                full_name: full_name.into(),
            },
        ));
    }

    /// 之后的花名册查询全部失败
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 之后的账本写入全部失败
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 所有已写入记录（不区分日期）
    pub async fn records(&self) -> Vec<AttendanceRecord> {
        self.records.read().await.clone()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("roster read failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RosterStore for MemoryStore {
    async fn list_classes(&self) -> Result<Vec<Class>, StoreError> {
        self.check_reads()?;
        let mut classes = self.classes.read().await.clone();
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    async fn list_students(&self, class_id: ClassId) -> Result<Vec<Student>, StoreError> {
        self.check_reads()?;
        Ok(self
            .students
            .read()
            .await
            .iter()
            .filter(|(owner, _)| *owner == class_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn class_name(&self, class_id: ClassId) -> Result<Option<String>, StoreError> {
        self.check_reads()?;
        Ok(self
            .classes
            .read()
            .await
            .iter()
            .find(|c| c.id == class_id)
            .map(|c| c.name.clone()))
    }
}

#[async_trait]
impl AttendanceLedger for MemoryStore {
    async fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger write failed".to_string()));
        }
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.date == date)
            .cloned()
            .collect())
    }
}
