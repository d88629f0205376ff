use serde::Serialize;

use crate::session::{ChartSession, Selection};
use crate::store::{AssignmentRow, ChartStore};

/// Coordinator failures, split by how the caller must react.
#[derive(Debug)]
pub enum MoveError {
    /// Request refers to students/groups the session does not know.
    BadRequest(String),
    /// Local state disagrees with what the gesture claims; the session
    /// must be reloaded from the store before anything else.
    OutOfSync(String),
    /// Persistence failed; any optimistic mutation was rolled back.
    Persist(anyhow::Error),
}

/// Result of a click in the selection protocol.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SelectionOutcome {
    #[serde(rename_all = "camelCase")]
    Armed {
        student_id: String,
        group_id: Option<String>,
    },
    Disarmed,
    #[serde(rename_all = "camelCase")]
    Swapped {
        first_student_id: String,
        first_group_id: String,
        second_student_id: String,
        second_group_id: String,
    },
    /// Both clicks landed in the same group: local reorder only.
    #[serde(rename_all = "camelCase")]
    Reordered { group_id: String },
}

/// Result of clicking a group while a selection is armed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlaceOutcome {
    #[serde(rename_all = "camelCase")]
    Placed {
        student_id: String,
        group_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Moved {
        student_id: String,
        from_group_id: String,
        to_group_id: String,
    },
    /// Target is the group the student already sits in.
    Unchanged,
}

fn member_index(session: &ChartSession, group_id: &str, student_id: &str) -> Option<usize> {
    session
        .members(group_id)
        .iter()
        .position(|s| s.id == student_id)
}

/// Seat an unseated student. The persistence call runs first, so a failure
/// leaves local state exactly as it was and needs no rollback.
pub fn assign_unseated(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    student_id: &str,
    group_id: &str,
) -> Result<(), MoveError> {
    if session.group(group_id).is_none() {
        return Err(MoveError::BadRequest(format!("unknown group: {}", group_id)));
    }
    let Some(idx) = session.unseated.iter().position(|s| s.id == student_id) else {
        return Err(MoveError::OutOfSync(format!(
            "student {} is not in the unseated list",
            student_id
        )));
    };

    store
        .replace_assignments(
            &[],
            &[AssignmentRow {
                group_id: group_id.to_string(),
                student_id: student_id.to_string(),
            }],
        )
        .map_err(MoveError::Persist)?;

    let student = session.unseated.remove(idx);
    if let Some(members) = session.group_students.get_mut(group_id) {
        members.push(student);
    }
    Ok(())
}

/// Move a seated student to a different group: optimistic splice/append,
/// one delete+insert transaction, snapshot restored on failure.
pub fn move_between_groups(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    student_id: &str,
    from_group_id: &str,
    to_group_id: &str,
) -> Result<(), MoveError> {
    if session.group(to_group_id).is_none() {
        return Err(MoveError::BadRequest(format!(
            "unknown group: {}",
            to_group_id
        )));
    }
    let Some(idx) = member_index(session, from_group_id, student_id) else {
        return Err(MoveError::OutOfSync(format!(
            "student {} not found in group {}",
            student_id, from_group_id
        )));
    };
    if from_group_id == to_group_id {
        return Ok(());
    }

    let deletes = [AssignmentRow {
        group_id: from_group_id.to_string(),
        student_id: student_id.to_string(),
    }];
    let inserts = [AssignmentRow {
        group_id: to_group_id.to_string(),
        student_id: student_id.to_string(),
    }];
    session
        .with_rollback(
            store,
            |s| {
                let student = s
                    .group_students
                    .get_mut(from_group_id)
                    .expect("source group membership")
                    .remove(idx);
                s.group_students
                    .get_mut(to_group_id)
                    .expect("target group membership")
                    .push(student);
            },
            |st| st.replace_assignments(&deletes, &inserts),
        )
        .map_err(MoveError::Persist)
}

/// Swap two seated students. Both must be where the gesture claims they
/// are; otherwise the caller reloads. Same group is a local reorder with
/// no persistence.
pub fn swap_students(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    first_student_id: &str,
    first_group_id: &str,
    second_student_id: &str,
    second_group_id: &str,
) -> Result<SelectionOutcome, MoveError> {
    let Some(first_idx) = member_index(session, first_group_id, first_student_id) else {
        return Err(MoveError::OutOfSync(format!(
            "student {} not found in group {}",
            first_student_id, first_group_id
        )));
    };
    let Some(second_idx) = member_index(session, second_group_id, second_student_id) else {
        return Err(MoveError::OutOfSync(format!(
            "student {} not found in group {}",
            second_student_id, second_group_id
        )));
    };

    if first_group_id == second_group_id {
        if let Some(members) = session.group_students.get_mut(first_group_id) {
            members.swap(first_idx, second_idx);
        }
        return Ok(SelectionOutcome::Reordered {
            group_id: first_group_id.to_string(),
        });
    }

    let deletes = [
        AssignmentRow {
            group_id: first_group_id.to_string(),
            student_id: first_student_id.to_string(),
        },
        AssignmentRow {
            group_id: second_group_id.to_string(),
            student_id: second_student_id.to_string(),
        },
    ];
    let inserts = [
        AssignmentRow {
            group_id: first_group_id.to_string(),
            student_id: second_student_id.to_string(),
        },
        AssignmentRow {
            group_id: second_group_id.to_string(),
            student_id: first_student_id.to_string(),
        },
    ];
    session
        .with_rollback(
            store,
            |s| {
                let first = s.group_students.get_mut(first_group_id).expect("first group")
                    [first_idx]
                    .clone();
                let second = s
                    .group_students
                    .get_mut(second_group_id)
                    .expect("second group")[second_idx]
                    .clone();
                s.group_students.get_mut(first_group_id).expect("first group")[first_idx] =
                    second;
                s.group_students.get_mut(second_group_id).expect("second group")[second_idx] =
                    first;
            },
            |st| st.replace_assignments(&deletes, &inserts),
        )
        .map_err(MoveError::Persist)?;

    Ok(SelectionOutcome::Swapped {
        first_student_id: first_student_id.to_string(),
        first_group_id: first_group_id.to_string(),
        second_student_id: second_student_id.to_string(),
        second_group_id: second_group_id.to_string(),
    })
}

/// One click in the selection protocol. `group_id` is absent for clicks in
/// the unseated list.
pub fn select(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    student_id: &str,
    group_id: Option<&str>,
) -> Result<SelectionOutcome, MoveError> {
    match group_id {
        None => {
            if !session.unseated.iter().any(|s| s.id == student_id) {
                return Err(MoveError::OutOfSync(format!(
                    "student {} is not in the unseated list",
                    student_id
                )));
            }
            let same = matches!(
                &session.pending,
                Some(Selection::Unseated { student_id: sid }) if sid == student_id
            );
            if same {
                session.pending = None;
                return Ok(SelectionOutcome::Disarmed);
            }
            session.pending = Some(Selection::Unseated {
                student_id: student_id.to_string(),
            });
            Ok(SelectionOutcome::Armed {
                student_id: student_id.to_string(),
                group_id: None,
            })
        }
        Some(gid) => {
            if member_index(session, gid, student_id).is_none() {
                return Err(MoveError::OutOfSync(format!(
                    "student {} not found in group {}",
                    student_id, gid
                )));
            }
            match session.pending.clone() {
                Some(Selection::Seated {
                    student_id: sid,
                    group_id: sgid,
                }) if sid == student_id && sgid == gid => {
                    session.pending = None;
                    Ok(SelectionOutcome::Disarmed)
                }
                Some(Selection::Seated {
                    student_id: sid,
                    group_id: sgid,
                }) => {
                    let outcome = swap_students(session, store, &sid, &sgid, student_id, gid)?;
                    session.pending = None;
                    Ok(outcome)
                }
                _ => {
                    // First seated click, or an unseated selection being
                    // replaced by a seated one.
                    session.pending = Some(Selection::Seated {
                        student_id: student_id.to_string(),
                        group_id: gid.to_string(),
                    });
                    Ok(SelectionOutcome::Armed {
                        student_id: student_id.to_string(),
                        group_id: Some(gid.to_string()),
                    })
                }
            }
        }
    }
}

/// A click on a group body while a selection is armed: place an unseated
/// student, or move a seated one.
pub fn place_into(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    group_id: &str,
) -> Result<PlaceOutcome, MoveError> {
    let Some(pending) = session.pending.clone() else {
        return Err(MoveError::BadRequest("no selection is armed".to_string()));
    };
    match pending {
        Selection::Unseated { student_id } => {
            assign_unseated(session, store, &student_id, group_id)?;
            session.pending = None;
            Ok(PlaceOutcome::Placed {
                student_id,
                group_id: group_id.to_string(),
            })
        }
        Selection::Seated {
            student_id,
            group_id: from,
        } => {
            if from == group_id {
                session.pending = None;
                return Ok(PlaceOutcome::Unchanged);
            }
            move_between_groups(session, store, &student_id, &from, group_id)?;
            session.pending = None;
            Ok(PlaceOutcome::Moved {
                student_id,
                from_group_id: from,
                to_group_id: group_id.to_string(),
            })
        }
    }
}
