use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use crate::ranking::{ScoreDenominator, StudentRecord};
use rusqlite::Connection;

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// The snapshot a ranking request operates on: an explicit `params.students`
/// array when the caller supplies one, else the workspace's student directory.
pub fn snapshot(state: &AppState, req: &Request) -> Result<Vec<StudentRecord>, HandlerErr> {
    match req.params.get("students") {
        Some(v) if !v.is_null() => {
            let students: Vec<StudentRecord> = serde_json::from_value(v.clone()).map_err(|e| {
                HandlerErr::new("bad_params", format!("params.students is not a snapshot: {e}"))
            })?;
            if let Some(bad) = students.iter().find(|s| s.name.trim().is_empty()) {
                return Err(HandlerErr::new("bad_params", "student name must not be empty")
                    .with_details(serde_json::json!({ "id": bad.id })));
            }
            Ok(students)
        }
        _ => {
            let conn = db_conn(state)?;
            db::students_snapshot(conn).map_err(|e| HandlerErr::storage("db_query_failed", e))
        }
    }
}

/// `params.denominator` wins over the workspace setting; without a workspace the
/// fixed denominator applies.
pub fn denominator(state: &AppState, req: &Request) -> Result<ScoreDenominator, HandlerErr> {
    if let Some(raw) = req.params.get("denominator").and_then(|v| v.as_str()) {
        return ScoreDenominator::parse(raw).ok_or_else(|| {
            HandlerErr::new("bad_params", "denominator must be 'fixed' or 'present'")
        });
    }
    match state.db.as_ref() {
        Some(conn) => {
            db::ranking_denominator(conn).map_err(|e| HandlerErr::storage("db_query_failed", e))
        }
        None => Ok(ScoreDenominator::default()),
    }
}
