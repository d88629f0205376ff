use serde::Serialize;

use crate::moves::MoveError;
use crate::session::ChartSession;
use crate::store::{AssignmentRow, ChartStore};

/// Planned additions: (group id, student ids to seat there). Seated
/// students are never touched; only unseated students are consumed.
pub type FillPlan = Vec<(String, Vec<String>)>;

/// Balance-fill targets: `floor(T/G)` per group, with the first `T mod G`
/// groups (in array order) taking one extra, so sizes differ by at most 1.
pub fn balance_targets(total_students: usize, group_count: usize) -> Vec<usize> {
    if group_count == 0 {
        return Vec::new();
    }
    let base = total_students / group_count;
    let extra = total_students % group_count;
    (0..group_count)
        .map(|i| base + usize::from(i < extra))
        .collect()
}

/// Distribute unseated students into the groups with the largest shortfall
/// first, stopping when unseated students run out or every target is met.
pub fn plan_fill(current: &[(String, usize)], unseated: &[String]) -> FillPlan {
    let total = current.iter().map(|(_, n)| n).sum::<usize>() + unseated.len();
    let targets = balance_targets(total, current.len());

    let mut order: Vec<usize> = (0..current.len()).collect();
    // Stable sort keeps array order among equal shortfalls.
    order.sort_by_key(|&i| std::cmp::Reverse(targets[i].saturating_sub(current[i].1)));

    let mut pool = unseated.iter();
    let mut plan: FillPlan = current.iter().map(|(gid, _)| (gid.clone(), Vec::new())).collect();
    for i in order {
        let shortfall = targets[i].saturating_sub(current[i].1);
        for _ in 0..shortfall {
            let Some(sid) = pool.next() else {
                return plan;
            };
            plan[i].1.push(sid.clone());
        }
    }
    plan
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoAssignReport {
    pub placed: usize,
    pub per_group: Vec<GroupFill>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFill {
    pub group_id: String,
    pub added: usize,
    pub size: usize,
}

/// Plan, persist as one transactional bulk insert, then apply locally.
/// Persist-first: a failed insert changes nothing on either side.
pub fn auto_assign(
    session: &mut ChartSession,
    store: &dyn ChartStore,
) -> Result<AutoAssignReport, MoveError> {
    let current: Vec<(String, usize)> = session
        .groups
        .iter()
        .map(|g| (g.id.clone(), session.members(&g.id).len()))
        .collect();
    let unseated_ids: Vec<String> = session.unseated.iter().map(|s| s.id.clone()).collect();

    let plan = plan_fill(&current, &unseated_ids);
    let inserts: Vec<AssignmentRow> = plan
        .iter()
        .flat_map(|(gid, sids)| {
            sids.iter().map(|sid| AssignmentRow {
                group_id: gid.clone(),
                student_id: sid.clone(),
            })
        })
        .collect();

    if !inserts.is_empty() {
        store
            .replace_assignments(&[], &inserts)
            .map_err(MoveError::Persist)?;
    }

    let mut placed = 0;
    for (gid, sids) in &plan {
        for sid in sids {
            let Some(idx) = session.unseated.iter().position(|s| &s.id == sid) else {
                continue;
            };
            let student = session.unseated.remove(idx);
            if let Some(members) = session.group_students.get_mut(gid) {
                members.push(student);
                placed += 1;
            }
        }
    }

    let per_group = plan
        .iter()
        .map(|(gid, sids)| GroupFill {
            group_id: gid.clone(),
            added: sids.len(),
            size: session.members(gid).len(),
        })
        .collect();

    Ok(AutoAssignReport { placed, per_group })
}
