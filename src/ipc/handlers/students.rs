use crate::collate;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{clamp_score, Metrics, StudentRecord};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const METRIC_KEYS: [&str; 6] = [
    "examA",
    "examB",
    "internalExams",
    "externalExams",
    "digitalPlatforms",
    "attendance",
];

fn metric_slot<'a>(m: &'a mut Metrics, key: &str) -> Option<&'a mut Option<f64>> {
    match key {
        "examA" => Some(&mut m.exam_a),
        "examB" => Some(&mut m.exam_b),
        "internalExams" => Some(&mut m.internal_exams),
        "externalExams" => Some(&mut m.external_exams),
        "digitalPlatforms" => Some(&mut m.digital_platforms),
        "attendance" => Some(&mut m.attendance),
        _ => None,
    }
}

/// Applies a metrics object onto `base`. Numbers are clamped into [0, 100],
/// null clears a metric, absent keys are left alone.
fn apply_metrics(base: &mut Metrics, raw: Option<&serde_json::Value>) -> Result<(), HandlerErr> {
    let Some(raw) = raw else {
        return Ok(());
    };
    if raw.is_null() {
        return Ok(());
    }
    let Some(obj) = raw.as_object() else {
        return Err(HandlerErr::new("bad_params", "metrics must be an object"));
    };
    for (key, value) in obj {
        let Some(slot) = metric_slot(base, key) else {
            return Err(HandlerErr::new("bad_params", format!("unknown metric: {}", key))
                .with_details(json!({ "allowed": METRIC_KEYS })));
        };
        if value.is_null() {
            *slot = None;
            continue;
        }
        let Some(n) = value.as_f64().filter(|n| n.is_finite()) else {
            return Err(HandlerErr::new(
                "bad_params",
                format!("metrics.{} must be a number or null", key),
            ));
        };
        *slot = Some(clamp_score(n));
    }
    Ok(())
}

fn clean_name(raw: Option<&serde_json::Value>) -> Result<Option<String>, HandlerErr> {
    match raw {
        None => Ok(None),
        Some(v) => {
            let name = v.as_str().map(|s| s.trim()).unwrap_or_default();
            if name.is_empty() {
                return Err(HandlerErr::new("bad_params", "name must not be empty"));
            }
            Ok(Some(name.to_string()))
        }
    }
}

/// `Ok(None)` means "leave as is"; `Ok(Some(None))` clears the address.
fn clean_email(
    conn: &Connection,
    raw: Option<&serde_json::Value>,
    student_id: Option<&str>,
) -> Result<Option<Option<String>>, HandlerErr> {
    let Some(v) = raw else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(Some(None));
    }
    let Some(s) = v.as_str() else {
        return Err(HandlerErr::new("bad_params", "email must be a string or null"));
    };
    let email = crate::access::normalize_email(s);
    if email.is_empty() {
        return Ok(Some(None));
    }
    if !email.contains('@') {
        return Err(HandlerErr::new("invalid_email", "email must contain '@'"));
    }
    let policy = db::access_policy(conn).map_err(|e| HandlerErr::storage("db_query_failed", e))?;
    if !policy.on_student_domain(&email) {
        let domain = policy.student_domain.clone().unwrap_or_default();
        return Err(HandlerErr::new(
            "invalid_email",
            format!("student email must be on the {} domain", domain),
        )
        .with_details(json!({ "studentDomain": domain })));
    }
    let taken = db::student_email_taken(conn, &email, student_id)
        .map_err(|e| HandlerErr::storage("db_query_failed", e))?;
    if taken {
        return Err(HandlerErr::new("duplicate_email", "another student already uses this email"));
    }
    Ok(Some(Some(email)))
}

fn handle_students_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let mut students =
        db::students_snapshot(conn).map_err(|e| HandlerErr::storage("db_query_failed", e))?;
    students.sort_by(|a, b| collate::compare_names(&a.name, &b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let Some(name) = clean_name(req.params.get("name"))? else {
        return Err(HandlerErr::new("bad_params", "missing name"));
    };
    let email = clean_email(conn, req.params.get("email"), None)?.flatten();
    let mut metrics = Metrics::default();
    apply_metrics(&mut metrics, req.params.get("metrics"))?;

    let student = StudentRecord {
        id: Uuid::new_v4().to_string(),
        name,
        email,
        metrics,
        rank: None,
    };
    db::student_insert(conn, &student).map_err(|e| HandlerErr::storage("db_insert_failed", e))?;
    tracing::info!(student_id = %student.id, "student created");
    Ok(json!({ "studentId": student.id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "missing patch"));
    };

    let mut student = db::student_get(conn, &student_id)
        .map_err(|e| HandlerErr::storage("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;

    if let Some(name) = clean_name(patch.get("name"))? {
        student.name = name;
    }
    if let Some(email) = clean_email(conn, patch.get("email"), Some(&student_id))? {
        student.email = email;
    }
    apply_metrics(&mut student.metrics, patch.get("metrics"))?;

    let updated =
        db::student_update(conn, &student).map_err(|e| HandlerErr::storage("db_update_failed", e))?;
    if !updated {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let student_id = required_str(req, "studentId")?;
    let deleted =
        db::student_delete(conn, &student_id).map_err(|e| HandlerErr::storage("db_delete_failed", e))?;
    if !deleted {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    tracing::info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
