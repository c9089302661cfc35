use crate::access;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Best-effort import of `access_policy.json` from the workspace root. A broken
/// file is logged and skipped; it never blocks opening the workspace.
fn import_policy_file(conn: &rusqlite::Connection, workspace: &Path) -> bool {
    let path = workspace.join(access::POLICY_FILE_NAME);
    if !path.is_file() {
        return false;
    }
    let policy = match access::load_policy_file(&path) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "ignoring access policy file");
            return false;
        }
    };
    match db::set_access_policy(conn, &policy) {
        Ok(()) => {
            tracing::info!(
                admins = policy.admins.len(),
                students = policy.students.len(),
                "access policy loaded"
            );
            true
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "failed to store access policy");
            false
        }
    }
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(req, "path")?);
    let conn = db::open_db(&path).map_err(|e| HandlerErr::storage("db_open_failed", e))?;
    let policy_loaded = import_policy_file(&conn, &path);
    tracing::info!(workspace = %path.display(), "workspace opened");

    state.workspace = Some(path.clone());
    state.db = Some(conn);
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "policyLoaded": policy_loaded,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => return Some(handle_health(state, req)),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
