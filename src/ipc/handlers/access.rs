use crate::access::{AccessPolicy, Role};
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_policy_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let policy = db::access_policy(conn).map_err(|e| HandlerErr::storage("policy_invalid", e))?;
    Ok(json!({ "policy": policy }))
}

fn handle_policy_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let policy: AccessPolicy = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::new("policy_invalid", e.to_string()))?;
    let policy = policy.normalized();
    db::set_access_policy(conn, &policy).map_err(|e| HandlerErr::storage("db_update_failed", e))?;
    tracing::info!(
        admins = policy.admins.len(),
        students = policy.students.len(),
        "access policy replaced"
    );
    Ok(json!({ "policy": policy }))
}

fn handle_resolve(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let email = required_str(req, "email")?;
    let requested = match req.params.get("requestedRole") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let parsed = v.as_str().and_then(Role::parse);
            if parsed.is_none() {
                return Err(HandlerErr::new(
                    "bad_params",
                    "requestedRole must be 'admin' or 'student'",
                ));
            }
            parsed
        }
    };
    let policy = db::access_policy(conn).map_err(|e| HandlerErr::storage("policy_invalid", e))?;
    let decision = policy.resolve(&email, requested);
    if !decision.allowed {
        tracing::info!(reason = ?decision.reason, "access denied");
    }
    Ok(json!({ "decision": decision }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "access.policy.get" => handle_policy_get(state, req),
        "access.policy.set" => handle_policy_set(state, req),
        "access.resolve" => handle_resolve(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
