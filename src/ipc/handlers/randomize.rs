use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::randomize::{self, RandomizeError};
use crate::store::SqliteStore;
use serde_json::json;

fn randomize_error_response(id: &str, e: RandomizeError) -> serde_json::Value {
    match e {
        RandomizeError::NoRun => err(id, "not_found", "no active randomize run", None),
        RandomizeError::BadToken => err(id, "bad_params", "stale randomize token", None),
        RandomizeError::Persist(cause) => err(id, "rolled_back", cause.to_string(), None),
        RandomizeError::Store(cause) => err(id, "db_query_failed", cause.to_string(), None),
    }
}

fn handle_randomize_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let store = SqliteStore::new(conn);
    match randomize::start(session, &store) {
        Ok((token, total)) => ok(&req.id, json!({ "token": token, "total": total })),
        Err(e) => randomize_error_response(&req.id, e),
    }
}

fn handle_randomize_step(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };
    let token = match req.params.get("token").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing token", None),
    };

    let store = SqliteStore::new(conn);
    match randomize::step(session, &store, &token) {
        Ok(event) => {
            let done = matches!(event, randomize::StepEvent::Done { .. });
            ok(&req.id, json!({ "event": event, "done": done }))
        }
        Err(e) => randomize_error_response(&req.id, e),
    }
}

fn handle_randomize_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };
    let token = match req.params.get("token").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing token", None),
    };

    let store = SqliteStore::new(conn);
    match randomize::cancel(session, &store, &token) {
        Ok(()) => ok(&req.id, json!({ "cancelled": true })),
        Err(e) => randomize_error_response(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "randomize.start" => Some(handle_randomize_start(state, req)),
        "randomize.step" => Some(handle_randomize_step(state, req)),
        "randomize.cancel" => Some(handle_randomize_cancel(state, req)),
        _ => None,
    }
}
