use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::layout;
use crate::store::SqliteStore;
use serde_json::json;

const CREATE_BATCH_MAX: usize = 60;

fn handle_group_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let columns = req.params.get("columns").and_then(|v| v.as_i64()).unwrap_or(2);

    let store = SqliteStore::new(conn);
    match session.create_group(&store, &name, columns) {
        Ok(group_id) => ok(
            &req.id,
            json!({ "groupId": group_id, "columns": layout::clamp_columns(columns) }),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "seating_groups" })),
        ),
    }
}

fn handle_group_create_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let count = match req.params.get("count").and_then(|v| v.as_u64()) {
        Some(v) if v >= 1 => v as usize,
        _ => return err(&req.id, "bad_params", "missing/invalid count", None),
    };
    if count > CREATE_BATCH_MAX {
        return err(
            &req.id,
            "bad_params",
            "too many groups requested",
            Some(json!({ "count": count, "max": CREATE_BATCH_MAX })),
        );
    }

    let store = SqliteStore::new(conn);
    match session.create_group_batch(&store, count) {
        Ok(created) => ok(&req.id, json!({ "created": created })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "seating_groups" })),
        ),
    }
}

fn handle_group_move(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let x = match req.params.get("x").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid x", None),
    };
    let y = match req.params.get("y").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid y", None),
    };
    let canvas_w = req
        .params
        .get("canvasWidth")
        .and_then(|v| v.as_f64())
        .unwrap_or(layout::DEFAULT_CANVAS_W);
    let canvas_h = req
        .params
        .get("canvasHeight")
        .and_then(|v| v.as_f64())
        .unwrap_or(layout::DEFAULT_CANVAS_H);

    if session.group(&group_id).is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let store = SqliteStore::new(conn);
    match session.move_group(&store, &group_id, x, y, canvas_w, canvas_h) {
        Ok((cx, cy)) => ok(&req.id, json!({ "groupId": group_id, "x": cx, "y": cy })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_group_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };

    if session.group(&group_id).is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let store = SqliteStore::new(conn);
    match session.rename_group(&store, &group_id, &name) {
        Ok(effective) => ok(&req.id, json!({ "groupId": group_id, "name": effective })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_group_set_columns(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let columns = match req.params.get("columns").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid columns", None),
    };

    if session.group(&group_id).is_none() {
        return err(&req.id, "not_found", "group not found", None);
    }

    let store = SqliteStore::new(conn);
    match session.set_columns(&store, &group_id, columns) {
        Ok(c) => ok(&req.id, json!({ "groupId": group_id, "columns": c })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_group_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match session.clear_groups(&store, &[group_id.clone()]) {
        Ok(moved) => ok(&req.id, json!({ "groupId": group_id, "unseated": moved })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_chart_clear_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let store = SqliteStore::new(conn);
    match session.clear_all(&store) {
        Ok(moved) => ok(&req.id, json!({ "unseated": moved })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_group_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    match session.delete_groups(&store, &[group_id.clone()]) {
        Ok(_) => ok(&req.id, json!({ "groupId": group_id })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_chart_delete_all_groups(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let store = SqliteStore::new(conn);
    match session.delete_all_groups(&store) {
        Ok(deleted) => ok(&req.id, json!({ "deleted": deleted })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_layout_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let store = SqliteStore::new(conn);
    match session.save_layout(&store) {
        Ok(saved) => ok(&req.id, json!({ "saved": saved })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "group.create" => Some(handle_group_create(state, req)),
        "group.createBatch" => Some(handle_group_create_batch(state, req)),
        "group.move" => Some(handle_group_move(state, req)),
        "group.rename" => Some(handle_group_rename(state, req)),
        "group.setColumns" => Some(handle_group_set_columns(state, req)),
        "group.clear" => Some(handle_group_clear(state, req)),
        "group.delete" => Some(handle_group_delete(state, req)),
        "chart.clearAll" => Some(handle_chart_clear_all(state, req)),
        "chart.deleteAllGroups" => Some(handle_chart_delete_all_groups(state, req)),
        "layout.save" => Some(handle_layout_save(state, req)),
        _ => None,
    }
}
