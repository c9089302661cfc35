use crate::access::AccessPolicy;
use crate::ranking::{Metrics, ScoreDenominator, StudentRecord};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

pub const DB_FILE_NAME: &str = "portal.sqlite3";

const SETTING_DENOMINATOR: &str = "ranking.denominator";
const SETTING_ACCESS_POLICY: &str = "access.policy";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            exam_a REAL,
            exam_b REAL,
            internal_exams REAL,
            external_exams REAL,
            digital_platforms REAL,
            attendance REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_email ON students(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_profiles(
            user_id TEXT PRIMARY KEY,
            rank INTEGER,
            average_score INTEGER,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text).with_context(|| format!("setting {key} is not JSON"))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn ranking_denominator(conn: &Connection) -> anyhow::Result<ScoreDenominator> {
    let v = settings_get_json(conn, SETTING_DENOMINATOR)?;
    Ok(v.as_ref()
        .and_then(|v| v.as_str())
        .and_then(ScoreDenominator::parse)
        .unwrap_or_default())
}

pub fn set_ranking_denominator(conn: &Connection, d: ScoreDenominator) -> anyhow::Result<()> {
    settings_set_json(conn, SETTING_DENOMINATOR, &serde_json::json!(d.as_str()))
}

pub fn access_policy(conn: &Connection) -> anyhow::Result<AccessPolicy> {
    match settings_get_json(conn, SETTING_ACCESS_POLICY)? {
        Some(v) => Ok(serde_json::from_value::<AccessPolicy>(v)
            .context("stored access policy is malformed")?
            .normalized()),
        None => Ok(AccessPolicy::default()),
    }
}

pub fn set_access_policy(conn: &Connection, policy: &AccessPolicy) -> anyhow::Result<()> {
    settings_set_json(conn, SETTING_ACCESS_POLICY, &serde_json::to_value(policy)?)
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        metrics: Metrics {
            exam_a: r.get(3)?,
            exam_b: r.get(4)?,
            internal_exams: r.get(5)?,
            external_exams: r.get(6)?,
            digital_platforms: r.get(7)?,
            attendance: r.get(8)?,
        },
        rank: None,
    })
}

const STUDENT_COLUMNS: &str = "id, name, email, exam_a, exam_b, internal_exams, external_exams, digital_platforms, attendance";

/// Full point-in-time copy of the student directory.
pub fn students_snapshot(conn: &Connection) -> anyhow::Result<Vec<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_get(conn: &Connection, id: &str) -> anyhow::Result<Option<StudentRecord>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
    Ok(conn.query_row(&sql, [id], student_from_row).optional()?)
}

pub fn student_email_taken(conn: &Connection, email: &str, except_id: Option<&str>) -> anyhow::Result<bool> {
    let hit: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE lower(email) = lower(?) AND id <> COALESCE(?, '')",
            (email, except_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn student_insert(conn: &Connection, s: &StudentRecord) -> anyhow::Result<()> {
    let m = &s.metrics;
    conn.execute(
        "INSERT INTO students(
            id, name, email, exam_a, exam_b, internal_exams, external_exams,
            digital_platforms, attendance, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            s.id,
            s.name,
            s.email,
            m.exam_a,
            m.exam_b,
            m.internal_exams,
            m.external_exams,
            m.digital_platforms,
            m.attendance,
            now_rfc3339()
        ],
    )?;
    Ok(())
}

/// Returns false when no row matched.
pub fn student_update(conn: &Connection, s: &StudentRecord) -> anyhow::Result<bool> {
    let m = &s.metrics;
    let changed = conn.execute(
        "UPDATE students SET
            name = ?, email = ?, exam_a = ?, exam_b = ?, internal_exams = ?,
            external_exams = ?, digital_platforms = ?, attendance = ?, updated_at = ?
         WHERE id = ?",
        params![
            s.name,
            s.email,
            m.exam_a,
            m.exam_b,
            m.internal_exams,
            m.external_exams,
            m.digital_platforms,
            m.attendance,
            now_rfc3339(),
            s.id
        ],
    )?;
    Ok(changed > 0)
}

pub fn student_delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let changed = tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.execute("DELETE FROM user_profiles WHERE user_id = ?", [id])?;
    tx.commit()?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub rank: Option<u32>,
    pub average_score: Option<u8>,
    pub updated_at: String,
}

pub fn profile_record_rank(
    conn: &Connection,
    user_id: &str,
    rank: u32,
    average_score: u8,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO user_profiles(user_id, rank, average_score, updated_at) VALUES(?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            rank = excluded.rank,
            average_score = excluded.average_score,
            updated_at = excluded.updated_at",
        params![user_id, rank, average_score, now_rfc3339()],
    )?;
    Ok(())
}

pub fn profile_get(conn: &Connection, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
    Ok(conn
        .query_row(
            "SELECT user_id, rank, average_score, updated_at FROM user_profiles WHERE user_id = ?",
            [user_id],
            |r| {
                Ok(UserProfile {
                    user_id: r.get(0)?,
                    rank: r.get(1)?,
                    average_score: r.get(2)?,
                    updated_at: r.get(3)?,
                })
            },
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_workspace(prefix: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn student_crud_and_profile_cleanup() {
        let conn = open_db(&temp_workspace("portald-db-crud")).expect("open db");
        let mut s = StudentRecord {
            id: "s-1".into(),
            name: "Ana".into(),
            email: Some("ana@escola.pr.gov.br".into()),
            metrics: Metrics {
                exam_a: Some(90.0),
                ..Metrics::default()
            },
            rank: None,
        };
        student_insert(&conn, &s).expect("insert");
        assert!(student_email_taken(&conn, "ANA@escola.pr.gov.br", None).expect("lookup"));
        assert!(!student_email_taken(&conn, "ana@escola.pr.gov.br", Some("s-1")).expect("lookup"));

        s.metrics.exam_b = Some(70.0);
        assert!(student_update(&conn, &s).expect("update"));
        let back = student_get(&conn, "s-1").expect("get").expect("present");
        assert_eq!(back.metrics.exam_b, Some(70.0));
        assert_eq!(back.metrics.internal_exams, None);

        profile_record_rank(&conn, "s-1", 1, 32).expect("profile");
        assert_eq!(profile_get(&conn, "s-1").expect("get").map(|p| p.rank), Some(Some(1)));

        assert!(student_delete(&conn, "s-1").expect("delete"));
        assert!(profile_get(&conn, "s-1").expect("get").is_none());
        assert!(students_snapshot(&conn).expect("snapshot").is_empty());
        assert!(!student_delete(&conn, "s-1").expect("delete again"));
    }

    #[test]
    fn settings_default_and_roundtrip() {
        let conn = open_db(&temp_workspace("portald-db-settings")).expect("open db");
        assert_eq!(ranking_denominator(&conn).expect("get"), ScoreDenominator::Fixed);
        set_ranking_denominator(&conn, ScoreDenominator::PresentMetrics).expect("set");
        assert_eq!(
            ranking_denominator(&conn).expect("get"),
            ScoreDenominator::PresentMetrics
        );
        assert_eq!(access_policy(&conn).expect("policy"), AccessPolicy::default());
    }

    #[test]
    fn reopening_workspace_keeps_rows() {
        let ws = temp_workspace("portald-db-reopen");
        {
            let conn = open_db(&ws).expect("open db");
            let s = StudentRecord {
                id: "s-1".into(),
                name: "Bia".into(),
                email: None,
                metrics: Metrics {
                    attendance: Some(88.0),
                    ..Metrics::default()
                },
                rank: None,
            };
            student_insert(&conn, &s).expect("insert");
        }
        let conn = open_db(&ws).expect("reopen db");
        let back = student_get(&conn, "s-1").expect("get").expect("present");
        assert_eq!(back.metrics.attendance, Some(88.0));
    }
}
