mod test_support;

use serde_json::json;
use std::collections::HashMap;
use test_support::{membership, request_err, request_ok, seed_class, spawn_sidecar, temp_dir};

type Io = (
    std::process::ChildStdin,
    std::io::BufReader<std::process::ChildStdout>,
);

/// Workspace + open chart + three groups seeded with six seated students.
fn seeded_board(prefix: &str) -> (std::process::Child, Io, Vec<String>) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let (class_id, student_ids) = seed_class(
        &mut stdin,
        &mut reader,
        &workspace,
        "Shuffle",
        &["Ada", "Ben", "Cam", "Dee", "Eli", "Fay"],
    );
    let _ = test_support::open_fresh_chart(&mut stdin, &mut reader, &class_id, "Rows");

    let mut groups = Vec::new();
    for i in 0..3 {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "group.create",
            json!({ "name": format!("Table {}", i + 1) }),
        );
        groups.push(
            created
                .get("groupId")
                .and_then(|v| v.as_str())
                .expect("groupId")
                .to_string(),
        );
    }
    for (i, sid) in student_ids.iter().enumerate() {
        let gid = groups[i % 3].clone();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{}", i),
            "seat.assign",
            json!({ "studentId": sid, "groupId": gid }),
        );
    }
    (child, (stdin, reader), groups)
}

fn group_sizes(m: &HashMap<String, Vec<String>>) -> HashMap<String, usize> {
    m.iter().map(|(g, s)| (g.clone(), s.len())).collect()
}

#[test]
fn run_steps_through_dwells_and_commits() {
    let (_child, (mut stdin, mut reader), _groups) = seeded_board("seatingd-randomize-run");

    let before = request_ok(&mut stdin, &mut reader, "b", "chart.state", json!({}));
    let sizes_before = group_sizes(&membership(&before));

    let started = request_ok(&mut stdin, &mut reader, "1", "randomize.start", json!({}));
    let token = started
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();
    let total = started.get("total").and_then(|v| v.as_u64()).expect("total");

    // While a run is live the state advertises it.
    if total > 0 {
        let state = request_ok(&mut stdin, &mut reader, "2", "chart.state", json!({}));
        let run = state.get("randomize").expect("randomize");
        assert_eq!(run.get("token").and_then(|v| v.as_str()), Some(token.as_str()));
        assert_eq!(run.get("total").and_then(|v| v.as_u64()), Some(total));
    }

    let mut moved = None;
    for i in 0..(total * 2 + 1) {
        let stepped = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "randomize.step",
            json!({ "token": token }),
        );
        let event = stepped.get("event").expect("event");
        match event.get("kind").and_then(|v| v.as_str()).expect("kind") {
            "highlight" => {
                assert_eq!(event.get("holdMs").and_then(|v| v.as_u64()), Some(600));
                assert_eq!(
                    stepped.get("done").and_then(|v| v.as_bool()),
                    Some(false)
                );
            }
            "place" => {
                assert_eq!(event.get("holdMs").and_then(|v| v.as_u64()), Some(800));
            }
            "done" => {
                moved = event.get("moved").and_then(|v| v.as_u64());
                assert_eq!(stepped.get("done").and_then(|v| v.as_bool()), Some(true));
                break;
            }
            other => panic!("unexpected event kind {}", other),
        }
    }
    let moved = moved.expect("run should finish within total*2+1 steps");
    assert_eq!(moved, total);

    // The shuffle never changes group sizes, only who sits where.
    let after = request_ok(&mut stdin, &mut reader, "3", "chart.state", json!({}));
    assert_eq!(group_sizes(&membership(&after)), sizes_before);
    assert!(after.get("randomize").map(|v| v.is_null()).unwrap_or(false));

    // The finished token is gone.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "randomize.step",
        json!({ "token": token }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn cancel_sheds_the_preview_and_keeps_the_old_seating() {
    let (_child, (mut stdin, mut reader), _groups) = seeded_board("seatingd-randomize-cancel");

    let before = request_ok(&mut stdin, &mut reader, "b", "chart.state", json!({}));
    let m_before = membership(&before);

    let started = request_ok(&mut stdin, &mut reader, "1", "randomize.start", json!({}));
    let token = started
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();
    let total = started.get("total").and_then(|v| v.as_u64()).expect("total");

    if total > 0 {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "randomize.step",
            json!({ "token": token }),
        );
    }

    let cancelled = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "randomize.cancel",
        json!({ "token": token }),
    );
    assert_eq!(
        cancelled.get("cancelled").and_then(|v| v.as_bool()),
        Some(true)
    );

    // Nothing was committed; seating is exactly what it was.
    let after = request_ok(&mut stdin, &mut reader, "4", "chart.state", json!({}));
    assert_eq!(membership(&after), m_before);
    assert!(after.get("randomize").map(|v| v.is_null()).unwrap_or(false));
}

#[test]
fn stale_token_is_rejected() {
    let (_child, (mut stdin, mut reader), _groups) = seeded_board("seatingd-randomize-stale");

    let first = request_ok(&mut stdin, &mut reader, "1", "randomize.start", json!({}));
    let stale = first
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();

    // A second start replaces the run and invalidates the old token.
    let second = request_ok(&mut stdin, &mut reader, "2", "randomize.start", json!({}));
    let fresh = second
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string();
    assert_ne!(stale, fresh);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "randomize.step",
        json!({ "token": stale }),
    );
    assert_eq!(code, "bad_params");
}

#[test]
fn step_without_a_run_is_not_found() {
    let (_child, (mut stdin, mut reader), _groups) = seeded_board("seatingd-randomize-norun");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "randomize.step",
        json!({ "token": "never-started" }),
    );
    assert_eq!(code, "not_found");
}
