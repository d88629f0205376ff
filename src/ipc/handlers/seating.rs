use crate::autoassign;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::moves::{self, MoveError};
use crate::session::ChartSession;
use crate::store::SqliteStore;
use serde_json::json;
use tracing::warn;

/// `persist_code` names the failed operation for taxonomy class (c)
/// errors; optimistic paths report `rolled_back` instead.
fn move_error_response(
    session: &mut ChartSession,
    store: &SqliteStore,
    id: &str,
    persist_code: &str,
    e: MoveError,
) -> serde_json::Value {
    match e {
        MoveError::BadRequest(m) => err(id, "bad_params", m, None),
        MoveError::OutOfSync(m) => {
            // Local state lied; resynchronize before the next gesture.
            let reloaded = match session.reload(store) {
                Ok(()) => true,
                Err(reload_err) => {
                    warn!(error = %reload_err, "session reload after consistency failure failed");
                    false
                }
            };
            err(
                id,
                "state_out_of_sync",
                m,
                Some(json!({ "reloaded": reloaded })),
            )
        }
        MoveError::Persist(cause) => err(id, persist_code, cause.to_string(), None),
    }
}

fn handle_seat_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };

    let store = SqliteStore::new(conn);
    match moves::assign_unseated(session, &store, &student_id, &group_id) {
        Ok(()) => ok(&req.id, json!({ "studentId": student_id, "groupId": group_id })),
        Err(e) => move_error_response(session, &store, &req.id, "db_insert_failed", e),
    }
}

fn handle_seat_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let group_id = req
        .params
        .get("groupId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let store = SqliteStore::new(conn);
    match moves::select(session, &store, &student_id, group_id.as_deref()) {
        Ok(outcome) => ok(&req.id, json!({ "outcome": outcome })),
        Err(e) => move_error_response(session, &store, &req.id, "rolled_back", e),
    }
}

fn handle_seat_place_into(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let group_id = match req.params.get("groupId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing groupId", None),
    };
    if session.group(&group_id).is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let store = SqliteStore::new(conn);
    match moves::place_into(session, &store, &group_id) {
        Ok(outcome) => ok(&req.id, json!({ "outcome": outcome })),
        Err(e) => move_error_response(session, &store, &req.id, "rolled_back", e),
    }
}

fn handle_chart_auto_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let store = SqliteStore::new(conn);
    match autoassign::auto_assign(session, &store) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => move_error_response(session, &store, &req.id, "db_insert_failed", e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "seat.assign" => Some(handle_seat_assign(state, req)),
        "seat.select" => Some(handle_seat_select(state, req)),
        "seat.placeInto" => Some(handle_seat_place_into(state, req)),
        "chart.autoAssign" => Some(handle_chart_auto_assign(state, req)),
        _ => None,
    }
}
