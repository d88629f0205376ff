use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, gender, points, avatar
         FROM students WHERE class_id = ? ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_id], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let gender: String = row.get(2)?;
            let points: i64 = row.get(3)?;
            let avatar: Option<String> = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "gender": gender,
                "points": points,
                "avatar": avatar
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let gender = req
        .params
        .get("gender")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let avatar = req
        .params
        .get("avatar")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let next_sort: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, class_id, name, gender, points, avatar, sort_order)
         VALUES(?, ?, ?, ?, 0, ?, ?)",
        (&student_id, &class_id, &name, &gender, &avatar, next_sort),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id, "name": name }))
}

fn handle_students_award_points(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let delta = match req.params.get("delta").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing/invalid delta", None),
    };

    if let Err(e) = conn.execute(
        "UPDATE students SET points = points + ? WHERE id = ?",
        (delta, &student_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let points: Option<i64> = match conn
        .query_row(
            "SELECT points FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(points) = points else {
        return err(&req.id, "not_found", "student not found", None);
    };

    // The open session caches student rows; keep its point totals fresh.
    if let Some(session) = state.session.as_mut() {
        for members in session.group_students.values_mut() {
            for s in members.iter_mut() {
                if s.id == student_id {
                    s.points = points;
                }
            }
        }
        for s in session.unseated.iter_mut() {
            if s.id == student_id {
                s.points = points;
            }
        }
    }

    ok(&req.id, json!({ "studentId": student_id, "points": points }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.awardPoints" => Some(handle_students_award_points(state, req)),
        _ => None,
    }
}
