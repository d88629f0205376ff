use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::layout;
use crate::session::{ChartSession, Selection};
use crate::store::SqliteStore;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_charts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, show_grid, show_furniture, orientation, updated_at
         FROM charts WHERE class_id = ? ORDER BY name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let show_grid: i64 = row.get(2)?;
            let show_furniture: i64 = row.get(3)?;
            let orientation: String = row.get(4)?;
            let updated_at: Option<String> = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "showGrid": show_grid != 0,
                "showFurniture": show_furniture != 0,
                "orientation": orientation,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(charts) => ok(&req.id, json!({ "charts": charts })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_charts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };

    let chart_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO charts(id, class_id, name, show_grid, show_furniture, orientation, updated_at)
         VALUES(?, ?, ?, 1, 1, 'Left', ?)",
        (&chart_id, &class_id, &name, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "charts" })),
        );
    }

    ok(&req.id, json!({ "chartId": chart_id, "name": name }))
}

fn handle_charts_update_flags(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let chart_id = match req.params.get("chartId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing chartId", None),
    };

    let show_grid = req.params.get("showGrid").and_then(|v| v.as_bool());
    let show_furniture = req.params.get("showFurniture").and_then(|v| v.as_bool());
    let orientation = req.params.get("orientation").and_then(|v| v.as_str());
    if let Some(o) = orientation {
        if o != "Left" && o != "Right" {
            return err(
                &req.id,
                "bad_params",
                "orientation must be 'Left' or 'Right'",
                Some(json!({ "orientation": o })),
            );
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let result = conn.execute(
        "UPDATE charts SET
           show_grid = COALESCE(?, show_grid),
           show_furniture = COALESCE(?, show_furniture),
           orientation = COALESCE(?, orientation),
           updated_at = ?
         WHERE id = ?",
        (
            show_grid.map(i64::from),
            show_furniture.map(i64::from),
            orientation,
            &now,
            &chart_id,
        ),
    );
    match result {
        Ok(0) => err(&req.id, "not_found", "chart not found", None),
        Ok(_) => {
            if let Some(session) = state.session.as_mut() {
                if session.chart.id == chart_id {
                    if let Some(v) = show_grid {
                        session.chart.show_grid = v;
                    }
                    if let Some(v) = show_furniture {
                        session.chart.show_furniture = v;
                    }
                    if let Some(o) = orientation {
                        session.chart.orientation = o.to_string();
                    }
                }
            }
            ok(&req.id, json!({ "ok": true }))
        }
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_charts_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let chart_id = match req.params.get("chartId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing chartId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM charts WHERE id = ?", [&chart_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "chart not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "DELETE FROM seating_assignments
         WHERE group_id IN (SELECT id FROM seating_groups WHERE chart_id = ?)",
        [&chart_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "seating_assignments" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM seating_groups WHERE chart_id = ?", [&chart_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "seating_groups" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM charts WHERE id = ?", [&chart_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "charts" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    if state.session.as_ref().is_some_and(|s| s.chart.id == chart_id) {
        state.session = None;
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_chart_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let chart_id = match req.params.get("chartId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing chartId", None),
    };

    let store = SqliteStore::new(conn);
    match ChartSession::load(&store, &chart_id) {
        Ok(session) => {
            let summary = json!({
                "chartId": session.chart.id,
                "name": session.chart.name,
                "groupCount": session.groups.len(),
                "unseatedCount": session.unseated.len()
            });
            state.session = Some(session);
            ok(&req.id, summary)
        }
        // Prior session stays as it was; the client may retry.
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_chart_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_chart", "open a chart first", None);
    };

    let groups: Vec<serde_json::Value> = session
        .groups
        .iter()
        .map(|g| {
            let members = session.members(&g.id);
            let member_ids: Vec<String> = members.iter().map(|s| s.id.clone()).collect();
            let geometry = layout::group_geometry(&member_ids, g.columns);
            let pos = session.group_positions.get(&g.id);
            json!({
                "id": g.id,
                "name": g.name,
                "sortOrder": g.sort_order,
                "columns": g.columns,
                "rowsHint": g.rows_hint,
                "position": {
                    "x": pos.map(|p| p.x).unwrap_or(g.position_x),
                    "y": pos.map(|p| p.y).unwrap_or(g.position_y)
                },
                "geometry": geometry,
                "members": members
            })
        })
        .collect();

    let pending = session.pending.as_ref().map(|sel| match sel {
        Selection::Unseated { student_id } => json!({
            "studentId": student_id,
            "groupId": null
        }),
        Selection::Seated {
            student_id,
            group_id,
        } => json!({
            "studentId": student_id,
            "groupId": group_id
        }),
    });

    let randomize = session.randomize.as_ref().map(|run| {
        let active = run.active_step().map(|(step, phase, index)| {
            json!({ "step": step, "phase": phase, "index": index })
        });
        json!({
            "token": run.token,
            "total": run.total_steps(),
            "active": active
        })
    });

    ok(
        &req.id,
        json!({
            "chart": {
                "id": session.chart.id,
                "classId": session.chart.class_id,
                "name": session.chart.name,
                "showGrid": session.chart.show_grid,
                "showFurniture": session.chart.show_furniture,
                "orientation": session.chart.orientation
            },
            "groups": groups,
            "unseated": session.unseated,
            "pendingSelection": pending,
            "randomize": randomize
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "charts.list" => Some(handle_charts_list(state, req)),
        "charts.create" => Some(handle_charts_create(state, req)),
        "charts.updateFlags" => Some(handle_charts_update_flags(state, req)),
        "charts.delete" => Some(handle_charts_delete(state, req)),
        "chart.open" => Some(handle_chart_open(state, req)),
        "chart.state" => Some(handle_chart_state(state, req)),
        _ => None,
    }
}
