use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, denominator, required_str, snapshot};
use crate::ipc::types::{AppState, Request};
use crate::ranking::{self, ScoreDenominator};
use serde_json::json;

fn handle_ranking_compute(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let students = snapshot(state, req)?;
    let denom = denominator(state, req)?;
    let ranked = ranking::compute_ranking(&students, denom);
    tracing::debug!(students = ranked.len(), denominator = denom.as_str(), "ranking recomputed");
    Ok(json!({
        "denominator": denom.as_str(),
        "students": ranked,
        "podium": ranking::podium(&ranked),
    }))
}

/// Recomputes the ranking and looks up one user. When the user is ranked and a
/// workspace is open, their last-known rank is written to `user_profiles`.
fn handle_ranking_current_user(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let user_id = required_str(req, "userId")?;
    let students = snapshot(state, req)?;
    let denom = denominator(state, req)?;
    let ranked = ranking::compute_ranking(&students, denom);

    let Some(me) = ranking::refresh_current_user_rank(&ranked, &user_id) else {
        return Ok(json!({ "found": false, "student": null, "persisted": false }));
    };

    let persisted = match state.db.as_ref() {
        Some(conn) => {
            db::profile_record_rank(conn, &me.id, me.rank, me.average_score)
                .map_err(|e| HandlerErr::storage("db_update_failed", e))?;
            true
        }
        None => false,
    };
    Ok(json!({ "found": true, "student": me, "persisted": persisted }))
}

fn handle_profiles_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let user_id = required_str(req, "userId")?;
    let profile =
        db::profile_get(conn, &user_id).map_err(|e| HandlerErr::storage("db_query_failed", e))?;
    Ok(json!({ "profile": profile }))
}

fn handle_settings_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let d = db::ranking_denominator(conn).map_err(|e| HandlerErr::storage("db_query_failed", e))?;
    Ok(json!({ "denominator": d.as_str() }))
}

fn handle_settings_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let raw = required_str(req, "denominator")?;
    let Some(d) = ScoreDenominator::parse(&raw) else {
        return Err(HandlerErr::new(
            "bad_params",
            "denominator must be 'fixed' or 'present'",
        ));
    };
    db::set_ranking_denominator(conn, d).map_err(|e| HandlerErr::storage("db_update_failed", e))?;
    tracing::info!(denominator = d.as_str(), "ranking denominator changed");
    Ok(json!({ "denominator": d.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "ranking.compute" => handle_ranking_compute(state, req),
        "ranking.currentUser" => handle_ranking_current_user(state, req),
        "profiles.get" => handle_profiles_get(state, req),
        "settings.ranking.get" => handle_settings_get(state, req),
        "settings.ranking.set" => handle_settings_set(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
