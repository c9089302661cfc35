use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{denominator, required_str, snapshot};
use crate::ipc::types::{AppState, Request};
use crate::ranking;
use crate::report;
use serde_json::json;

fn handle_overview(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let students = snapshot(state, req)?;
    let ranked = ranking::compute_ranking(&students, denominator(state, req)?);
    Ok(json!({ "overview": report::class_overview(&ranked) }))
}

fn handle_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let students = snapshot(state, req)?;
    let ranked = ranking::compute_ranking(&students, denominator(state, req)?);
    let Some(r) = report::student_report(&ranked, &student_id) else {
        return Err(HandlerErr::new("not_found", "student not found"));
    };
    Ok(json!({ "report": r }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.overview" => handle_overview(state, req),
        "reports.student" => handle_student(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
