//! SQLite 花名册 / 账本（sqlx）
//!
//! 表结构沿用旧库：`kelas`（班级）、`siswa`（学生）、`absensi`（考勤）。
//! 旧库的 `absensi` 表可能缺少 `dicatat_oleh`（记录人）列，启动时补齐。

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{AttendanceLedger, AttendanceRecord, AttendanceStatus, Class, ClassId, RosterStore, Student};
use crate::core::StoreError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// 示例数据：(班级名, 学生全名列表)
const SAMPLE_ROSTER: &[(&str, &[&str])] = &[
    ("10-A MIPA", &["Budi Darmawan", "Citra Lestari"]),
    ("11-B IPS", &["Dewi Sartika"]),
];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn open(db_path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kelas (
                id INTEGER PRIMARY KEY,
                nama_kelas TEXT NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS siswa (
                id INTEGER PRIMARY KEY,
                nama_lengkap TEXT NOT NULL,
                kelas_id INTEGER NOT NULL REFERENCES kelas(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS absensi (
                id INTEGER PRIMARY KEY,
                siswa_id INTEGER NOT NULL,
                tanggal TEXT NOT NULL,
                status TEXT NOT NULL,
                dicatat_oleh TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        // 旧库已有 absensi 表但没有记录人列
        let has_recorder: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('absensi') WHERE name = 'dicatat_oleh'",
        )
        .fetch_one(&self.pool)
        .await?;
        if has_recorder == 0 {
            sqlx::query("ALTER TABLE absensi ADD COLUMN dicatat_oleh TEXT")
                .execute(&self.pool)
                .await?;
            tracing::info!("Added dicatat_oleh column to legacy absensi table");
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_siswa_kelas ON siswa(kelas_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_absensi_tanggal ON absensi(tanggal)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 班级表为空时写入示例班级与学生；返回是否写入
    pub async fn seed_sample_data(&self) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kelas")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        for (class_name, students) in SAMPLE_ROSTER {
            let class_id = sqlx::query("INSERT INTO kelas (nama_kelas) VALUES (?)")
                .bind(*class_name)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            for full_name in *students {
                sqlx::query("INSERT INTO siswa (nama_lengkap, kelas_id) VALUES (?, ?)")
                    .bind(*full_name)
                    .bind(class_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        tracing::info!("Seeded sample roster ({} classes)", SAMPLE_ROSTER.len());
        Ok(true)
    }

    pub async fn add_class(&self, name: &str) -> Result<ClassId, StoreError> {
        let id = sqlx::query("INSERT INTO kelas (nama_kelas) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn add_student(&self, class_id: ClassId, full_name: &str) -> Result<i64, StoreError> {
        let id = sqlx::query("INSERT INTO siswa (nama_lengkap, kelas_id) VALUES (?, ?)")
            .bind(full_name)
            .bind(class_id)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RosterStore for SqliteStore {
    async fn list_classes(&self) -> Result<Vec<Class>, StoreError> {
        let rows = sqlx::query("SELECT id, nama_kelas FROM kelas ORDER BY nama_kelas")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Class, StoreError> {
                Ok(Class {
                    id: row.try_get("id")?,
                    name: row.try_get("nama_kelas")?,
                })
            })
            .collect()
    }

    async fn list_students(&self, class_id: ClassId) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query("SELECT id, nama_lengkap FROM siswa WHERE kelas_id = ? ORDER BY id")
            .bind(class_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Student, StoreError> {
                Ok(Student {
                    id: row.try_get("id")?,
                    full_name: row.try_get("nama_lengkap")?,
                })
            })
            .collect()
    }

    async fn class_name(&self, class_id: ClassId) -> Result<Option<String>, StoreError> {
        let name: Option<String> = sqlx::query_scalar("SELECT nama_kelas FROM kelas WHERE id = ?")
            .bind(class_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

#[async_trait]
impl AttendanceLedger for SqliteStore {
    async fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO absensi (siswa_id, tanggal, status, dicatat_oleh) VALUES (?, ?, ?, ?)",
        )
        .bind(record.student_id)
        .bind(record.date.format(DATE_FORMAT).to_string())
        .bind(record.status.label())
        .bind(&record.recorded_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT siswa_id, CAST(tanggal AS TEXT) AS tanggal, status, dicatat_oleh
             FROM absensi WHERE tanggal = ? ORDER BY id",
        )
        .bind(date.format(DATE_FORMAT).to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<AttendanceRecord, StoreError> {
                let tanggal: String = row.try_get("tanggal")?;
                let status: String = row.try_get("status")?;
                let recorded_by: Option<String> = row.try_get("dicatat_oleh")?;
                Ok(AttendanceRecord {
                    student_id: row.try_get("siswa_id")?,
                    date: NaiveDate::parse_from_str(&tanggal, DATE_FORMAT)
                        .map_err(|e| StoreError::InvalidRow(format!("tanggal '{}': {}", tanggal, e)))?,
                    status: AttendanceStatus::from_label(&status)
                        .ok_or_else(|| StoreError::InvalidRow(format!("status '{}'", status)))?,
                    recorded_by: recorded_by.unwrap_or_default(),
                })
            })
            .collect()
    }
}
