mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn health_reports_version_and_empty_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(result.get("version").and_then(|v| v.as_str()).is_some());
    assert!(result
        .get("workspacePath")
        .map(|v| v.is_null())
        .unwrap_or(false));
    assert!(result
        .get("openChartId")
        .map(|v| v.is_null())
        .unwrap_or(false));
}

#[test]
fn unknown_method_returns_not_implemented() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "definitely.not.a.method",
        json!({}),
    );
    assert_eq!(code, "not_implemented");
}

#[test]
fn workspace_gated_methods_fail_before_select() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in ["classes.create", "charts.create", "chart.open", "seat.assign"]
        .iter()
        .enumerate()
    {
        let code = request_err(
            &mut stdin,
            &mut reader,
            &format!("w{}", i),
            method,
            json!({ "name": "x" }),
        );
        assert_eq!(code, "no_workspace", "method {}", method);
    }
}

#[test]
fn workspace_select_round_trips_path_and_shows_in_health() {
    let workspace = temp_dir("seatingd-smoke-workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        result.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );

    let health = request_ok(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(workspace.to_string_lossy().as_ref())
    );
}

#[test]
fn bad_params_are_reported_with_code() {
    let workspace = temp_dir("seatingd-smoke-badparams");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let code = request_err(&mut stdin, &mut reader, "2", "classes.create", json!({}));
    assert_eq!(code, "bad_params");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "   " }),
    );
    assert_eq!(code, "bad_params");

    // The envelope echoes the request id even on failure.
    let raw = request(
        &mut stdin,
        &mut reader,
        "echo-id",
        "classes.create",
        json!({}),
    );
    assert_eq!(raw.get("id").and_then(|v| v.as_str()), Some("echo-id"));
}

#[test]
fn classes_list_counts_students_and_charts() {
    let workspace = temp_dir("seatingd-smoke-classes");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (class_id, _students) = test_support::seed_class(
        &mut stdin,
        &mut reader,
        &workspace,
        "Period 1",
        &["Ada", "Ben"],
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "charts.create",
        json!({ "classId": class_id, "name": "Rows" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "2", "classes.list", json!({}));
    let classes = listed
        .get("classes")
        .and_then(|v| v.as_array())
        .expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(
        classes[0].get("name").and_then(|v| v.as_str()),
        Some("Period 1")
    );
    assert_eq!(
        classes[0].get("studentCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        classes[0].get("chartCount").and_then(|v| v.as_i64()),
        Some(1)
    );
}

#[test]
fn classes_delete_cascades_and_closes_open_chart() {
    let workspace = temp_dir("seatingd-smoke-class-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let (class_id, _students) =
        test_support::seed_class(&mut stdin, &mut reader, &workspace, "Gone", &["Ada"]);
    let _chart_id = test_support::open_fresh_chart(&mut stdin, &mut reader, &class_id, "Rows");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    // The open session belonged to the deleted class.
    let code = request_err(&mut stdin, &mut reader, "2", "chart.state", json!({}));
    assert_eq!(code, "no_chart");

    let listed = request_ok(&mut stdin, &mut reader, "3", "classes.list", json!({}));
    assert_eq!(
        listed
            .get("classes")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}
