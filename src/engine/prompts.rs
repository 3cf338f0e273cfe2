//! 回复文案（印尼语，沿用原考勤机器人的措辞）

use std::fmt::Write;

use crate::roster::{AttendanceStatus, Class};
use crate::session::AttendanceRun;

pub fn no_classes() -> String {
    "Maaf, belum ada data kelas di dalam sistem.".to_string()
}

/// 班级列表：选择令牌是班级 ID，不是列表序号
pub fn class_list(classes: &[Class]) -> String {
    let mut msg = String::from(
        "Selamat datang di Bot Absensi!\n\nSilakan pilih kelas yang akan diabsen dengan membalas *nomornya*:\n",
    );
    for class in classes {
        let _ = write!(msg, "\n{}. {}", class.id, class.name);
    }
    msg
}

pub fn help(start_keyword: &str) -> String {
    format!("Perintah tidak dikenali. Ketik `{}` untuk memulai.", start_keyword)
}

pub fn invalid_class_input() -> String {
    "Input tidak valid. Mohon balas dengan *angka* (nomor kelas).".to_string()
}

pub fn no_students() -> String {
    "Tidak ditemukan siswa di kelas tersebut. Sesi dibatalkan.".to_string()
}

pub fn attendance_started(class_name: &str) -> String {
    format!("Baik, memulai absensi untuk kelas *{}*.", class_name)
}

fn status_icon(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Present => "✅",
        AttendanceStatus::Sick => "🤒",
        AttendanceStatus::Excused => "✉️",
        AttendanceStatus::Absent => "❌",
    }
}

/// 单个学生的点名提示：序号/总数、姓名、四个状态选项、取消指令
pub fn student_prompt(run: &AttendanceRun, cancel_keyword: &str) -> String {
    let (position, total) = run.position();
    let mut msg = format!(
        "({}/{}) Absensi untuk: *{}*\n\nBalas dengan nomor:",
        position,
        total,
        run.current().full_name
    );
    for status in AttendanceStatus::ALL {
        let _ = write!(msg, "\n{}. {} {}", status.token(), status.label(), status_icon(status));
    }
    let _ = write!(msg, "\n\nKetik `{}` untuk menghentikan sesi ini.", cancel_keyword);
    msg
}

pub fn invalid_status_choice() -> String {
    "Pilihan tidak valid. Mohon balas dengan angka 1, 2, 3, atau 4.".to_string()
}

pub fn attendance_completed(class_name: &str) -> String {
    format!("🎉 Absensi untuk kelas *{}* telah selesai. Terima kasih!", class_name)
}

pub fn cancelled() -> String {
    "Sesi absensi telah dibatalkan.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::Student;

    #[test]
    fn test_class_list_uses_class_ids() {
        let classes = vec![
            Class { id: 7, name: "10-A".to_string() },
            Class { id: 3, name: "11-B".to_string() },
        ];
        let msg = class_list(&classes);
        assert!(msg.contains("7. 10-A"));
        assert!(msg.contains("3. 11-B"));
        assert!(!msg.contains("1. 10-A"));
    }

    #[test]
    fn test_student_prompt_contents() {
        let roster = vec![
            Student { id: 1, full_name: "Budi Darmawan".to_string() },
            Student { id: 2, full_name: "Citra Lestari".to_string() },
        ];
        let run = AttendanceRun::start(1, "10-A", roster).unwrap().advance().unwrap();
        let msg = student_prompt(&run, "!batal");

        assert!(msg.starts_with("(2/2)"));
        assert!(msg.contains("Citra Lestari"));
        assert!(msg.contains("1. Hadir"));
        assert!(msg.contains("2. Sakit"));
        assert!(msg.contains("3. Izin"));
        assert!(msg.contains("4. Alpa"));
        assert!(msg.contains("!batal"));
    }
}
