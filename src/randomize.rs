use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::session::ChartSession;
use crate::store::{AssignmentRow, ChartStore};

/// Dwell while a student is marked about-to-move.
pub const HIGHLIGHT_DWELL_MS: u64 = 600;
/// Dwell while a student is marked being-placed.
pub const PLACE_DWELL_MS: u64 = 800;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveStep {
    pub student_id: String,
    pub from_group_id: String,
    pub to_group_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Highlight,
    Place,
}

/// An in-flight randomize run. The daemon only advances when the client
/// asks, so steps can never overlap; the token lets a stale client be
/// rejected and the run be cancelled cleanly.
pub struct RandomizeRun {
    pub token: String,
    steps: Vec<MoveStep>,
    cursor: usize,
    phase: Phase,
    old_rows: Vec<AssignmentRow>,
    new_rows: Vec<AssignmentRow>,
}

impl RandomizeRun {
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// The step the client is currently dwelling on, if any.
    pub fn active_step(&self) -> Option<(&MoveStep, Phase, usize)> {
        self.steps.get(self.cursor).map(|s| (s, self.phase, self.cursor))
    }
}

#[derive(Debug)]
pub enum RandomizeError {
    NoRun,
    BadToken,
    /// Commit failed; the session was reloaded to remote truth.
    Persist(anyhow::Error),
    Store(anyhow::Error),
}

/// One response from `step`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepEvent {
    #[serde(rename_all = "camelCase")]
    Highlight {
        step: MoveStep,
        index: usize,
        total: usize,
        hold_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Place {
        step: MoveStep,
        index: usize,
        total: usize,
        hold_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Done { moved: usize },
}

/// Shuffle all seated students into a new assignment that preserves each
/// group's original size. Input and output are (group id, member ids) in
/// group order.
pub fn plan_assignment<R: Rng>(
    seating: &[(String, Vec<String>)],
    rng: &mut R,
) -> Vec<(String, Vec<String>)> {
    let mut pool: Vec<String> = seating.iter().flat_map(|(_, m)| m.iter().cloned()).collect();
    pool.shuffle(rng);

    let mut offset = 0;
    seating
        .iter()
        .map(|(gid, members)| {
            let take = members.len();
            let assigned = pool[offset..offset + take].to_vec();
            offset += take;
            (gid.clone(), assigned)
        })
        .collect()
}

/// Steps for every student whose group actually changes.
pub fn plan_steps(
    before: &[(String, Vec<String>)],
    after: &[(String, Vec<String>)],
) -> Vec<MoveStep> {
    let mut origin: std::collections::HashMap<&str, &str> = std::collections::HashMap::new();
    for (gid, members) in before {
        for sid in members {
            origin.insert(sid.as_str(), gid.as_str());
        }
    }

    let mut steps = Vec::new();
    for (gid, members) in after {
        for sid in members {
            let Some(from) = origin.get(sid.as_str()) else {
                continue;
            };
            if *from != gid.as_str() {
                steps.push(MoveStep {
                    student_id: sid.clone(),
                    from_group_id: from.to_string(),
                    to_group_id: gid.clone(),
                });
            }
        }
    }
    steps
}

fn current_seating(session: &ChartSession) -> Vec<(String, Vec<String>)> {
    session
        .groups
        .iter()
        .map(|g| {
            (
                g.id.clone(),
                session.members(&g.id).iter().map(|s| s.id.clone()).collect(),
            )
        })
        .collect()
}

fn to_rows(seating: &[(String, Vec<String>)]) -> Vec<AssignmentRow> {
    seating
        .iter()
        .flat_map(|(gid, members)| {
            members.iter().map(|sid| AssignmentRow {
                group_id: gid.clone(),
                student_id: sid.clone(),
            })
        })
        .collect()
}

/// Begin a run. An already-active run is cancelled first (the session
/// reloads to shed its optimistic splices).
pub fn start(
    session: &mut ChartSession,
    store: &dyn ChartStore,
) -> Result<(String, usize), RandomizeError> {
    if session.randomize.is_some() {
        session.reload(store).map_err(RandomizeError::Store)?;
    }

    let before = current_seating(session);
    let after = plan_assignment(&before, &mut rand::thread_rng());
    let steps = plan_steps(&before, &after);
    let total = steps.len();

    let run = RandomizeRun {
        token: Uuid::new_v4().to_string(),
        steps,
        cursor: 0,
        phase: Phase::Highlight,
        old_rows: to_rows(&before),
        new_rows: to_rows(&after),
    };
    let token = run.token.clone();
    session.randomize = Some(run);
    Ok((token, total))
}

/// Advance one phase. The client performs the returned dwell, then calls
/// again. After the final place, the next call persists the whole new
/// assignment set and reloads from the store.
pub fn step(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    token: &str,
) -> Result<StepEvent, RandomizeError> {
    {
        let Some(run) = session.randomize.as_ref() else {
            return Err(RandomizeError::NoRun);
        };
        if run.token != token {
            return Err(RandomizeError::BadToken);
        }
    }

    let (cursor, phase, total) = {
        let run = session.randomize.as_ref().expect("run checked above");
        (run.cursor, run.phase, run.steps.len())
    };

    if cursor >= total {
        return commit(session, store);
    }

    match phase {
        Phase::Highlight => {
            let run = session.randomize.as_mut().expect("run checked above");
            run.phase = Phase::Place;
            let step = run.steps[cursor].clone();
            Ok(StepEvent::Highlight {
                step,
                index: cursor,
                total,
                hold_ms: HIGHLIGHT_DWELL_MS,
            })
        }
        Phase::Place => {
            let step = {
                let run = session.randomize.as_ref().expect("run checked above");
                run.steps[cursor].clone()
            };
            apply_step(session, &step);
            let run = session.randomize.as_mut().expect("run checked above");
            run.cursor += 1;
            run.phase = Phase::Highlight;
            Ok(StepEvent::Place {
                step,
                index: cursor,
                total,
                hold_ms: PLACE_DWELL_MS,
            })
        }
    }
}

/// Splice the student out of the source group and append to the target,
/// locally only. The commit at the end of the run is the sole persistence
/// point.
fn apply_step(session: &mut ChartSession, step: &MoveStep) {
    let Some(idx) = session
        .members(&step.from_group_id)
        .iter()
        .position(|s| s.id == step.student_id)
    else {
        return;
    };
    let student = session
        .group_students
        .get_mut(&step.from_group_id)
        .expect("source group")
        .remove(idx);
    if let Some(members) = session.group_students.get_mut(&step.to_group_id) {
        members.push(student);
    }
}

fn commit(session: &mut ChartSession, store: &dyn ChartStore) -> Result<StepEvent, RandomizeError> {
    let (old_rows, new_rows, moved) = {
        let run = session.randomize.as_ref().expect("run checked by caller");
        (run.old_rows.clone(), run.new_rows.clone(), run.steps.len())
    };

    if let Err(e) = store.replace_assignments(&old_rows, &new_rows) {
        // Shed the optimistic splices; remote truth wins.
        session.reload(store).map_err(RandomizeError::Store)?;
        return Err(RandomizeError::Persist(e));
    }
    session.reload(store).map_err(RandomizeError::Store)?;
    Ok(StepEvent::Done { moved })
}

/// Abandon the run and resynchronize from the store.
pub fn cancel(
    session: &mut ChartSession,
    store: &dyn ChartStore,
    token: &str,
) -> Result<(), RandomizeError> {
    let Some(run) = session.randomize.as_ref() else {
        return Err(RandomizeError::NoRun);
    };
    if run.token != token {
        return Err(RandomizeError::BadToken);
    }
    session.reload(store).map_err(RandomizeError::Store)?;
    Ok(())
}
