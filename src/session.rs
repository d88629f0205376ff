use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::layout;
use crate::randomize::RandomizeRun;
use crate::store::{ChartRow, ChartStore, GroupRow, LayoutHint, Student};

const DEFAULT_GROUP_POS: (f64, f64) = (20.0, 20.0);
const BATCH_ORIGIN: (f64, f64) = (50.0, 50.0);
const BATCH_GUTTER: f64 = 30.0;
const BATCH_COLUMNS: usize = 3;
const DEFAULT_ROWS_HINT: i64 = 2;

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A pending click-selection, armed by the first click of a gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Unseated { student_id: String },
    Seated { student_id: String, group_id: String },
}

/// Authoritative in-memory view of the open chart: groups, per-group
/// membership, free positions, and the derived unseated set.
pub struct ChartSession {
    pub chart: ChartRow,
    pub groups: Vec<GroupRow>,
    pub group_students: HashMap<String, Vec<Student>>,
    pub group_positions: HashMap<String, Position>,
    pub unseated: Vec<Student>,
    pub pending: Option<Selection>,
    pub randomize: Option<RandomizeRun>,
}

/// Membership state captured before an optimistic mutation.
pub struct MembershipSnapshot {
    group_students: HashMap<String, Vec<Student>>,
    unseated: Vec<Student>,
}

impl ChartSession {
    /// Build a session from the store. The caller keeps its previous
    /// session when this fails, so a bad fetch never clobbers state.
    pub fn load(store: &dyn ChartStore, chart_id: &str) -> Result<Self> {
        let chart = store
            .chart_meta(chart_id)?
            .with_context(|| format!("chart not found: {}", chart_id))?;

        let groups = store.groups_for_chart(chart_id)?;
        let group_ids: Vec<String> = groups.iter().map(|g| g.id.clone()).collect();
        let assignments = store.assignments_for_groups(&group_ids)?;
        let students = store.class_students(&chart.class_id)?;

        let by_id: HashMap<&str, &Student> =
            students.iter().map(|s| (s.id.as_str(), s)).collect();

        // A student sits in at most one group per chart; duplicate
        // assignment rows keep their first occurrence only.
        let mut seated: HashSet<String> = HashSet::new();
        let mut group_students: HashMap<String, Vec<Student>> = HashMap::new();
        for g in &groups {
            group_students.insert(g.id.clone(), Vec::new());
        }
        for a in &assignments {
            let Some(student) = by_id.get(a.student_id.as_str()) else {
                continue;
            };
            if !seated.insert(a.student_id.clone()) {
                continue;
            }
            if let Some(members) = group_students.get_mut(&a.group_id) {
                members.push((*student).clone());
            }
        }

        let unseated: Vec<Student> = students
            .iter()
            .filter(|s| !seated.contains(&s.id))
            .cloned()
            .collect();

        let group_positions = groups
            .iter()
            .map(|g| {
                (
                    g.id.clone(),
                    Position {
                        x: g.position_x,
                        y: g.position_y,
                    },
                )
            })
            .collect();

        Ok(Self {
            chart,
            groups,
            group_students,
            group_positions,
            unseated,
            pending: None,
            randomize: None,
        })
    }

    /// Re-fetch everything from the store, dropping any pending selection
    /// or randomize run. Used after consistency failures and cancels.
    pub fn reload(&mut self, store: &dyn ChartStore) -> Result<()> {
        *self = Self::load(store, &self.chart.id.clone())?;
        Ok(())
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupRow> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn members(&self, group_id: &str) -> &[Student] {
        self.group_students
            .get(group_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn next_sort_order(&self) -> i64 {
        self.groups.iter().map(|g| g.sort_order + 1).max().unwrap_or(0)
    }

    // ---- snapshot / rollback ------------------------------------------

    pub fn snapshot_membership(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            group_students: self.group_students.clone(),
            unseated: self.unseated.clone(),
        }
    }

    pub fn restore_membership(&mut self, snap: MembershipSnapshot) {
        self.group_students = snap.group_students;
        self.unseated = snap.unseated;
    }

    /// Optimistic-update combinator: snapshot membership, apply the local
    /// mutation, attempt the persistence call, and restore the snapshot if
    /// persistence fails. Every rollback path in the subsystem goes
    /// through here.
    pub fn with_rollback<M, P>(&mut self, store: &dyn ChartStore, mutate: M, persist: P) -> Result<()>
    where
        M: FnOnce(&mut Self),
        P: FnOnce(&dyn ChartStore) -> Result<()>,
    {
        let snap = self.snapshot_membership();
        mutate(self);
        if let Err(e) = persist(store) {
            self.restore_membership(snap);
            return Err(e);
        }
        Ok(())
    }

    // ---- group lifecycle ----------------------------------------------

    pub fn create_group(
        &mut self,
        store: &dyn ChartStore,
        name: &str,
        columns: i64,
    ) -> Result<String> {
        let row = GroupRow {
            id: Uuid::new_v4().to_string(),
            chart_id: self.chart.id.clone(),
            name: name.to_string(),
            sort_order: self.next_sort_order(),
            columns: layout::clamp_columns(columns),
            rows_hint: DEFAULT_ROWS_HINT,
            position_x: DEFAULT_GROUP_POS.0,
            position_y: DEFAULT_GROUP_POS.1,
        };
        let id = row.id.clone();
        store.insert_groups(&[row])?;
        self.reload(store)?;
        Ok(id)
    }

    /// Create `count` groups laid out in a 3-wide grid, spaced by the
    /// default 2-column group's rendered size plus fixed gutters. The
    /// insert is one transaction: a failure adds nothing.
    pub fn create_group_batch(&mut self, store: &dyn ChartStore, count: usize) -> Result<usize> {
        let default_h = layout::group_height(0, 2);
        let base_sort = self.next_sort_order();
        let rows: Vec<GroupRow> = (0..count)
            .map(|i| {
                let col = i % BATCH_COLUMNS;
                let row = i / BATCH_COLUMNS;
                GroupRow {
                    id: Uuid::new_v4().to_string(),
                    chart_id: self.chart.id.clone(),
                    name: format!("Group {}", base_sort + i as i64 + 1),
                    sort_order: base_sort + i as i64,
                    columns: 2,
                    rows_hint: DEFAULT_ROWS_HINT,
                    position_x: BATCH_ORIGIN.0 + col as f64 * (layout::W2 + BATCH_GUTTER),
                    position_y: BATCH_ORIGIN.1 + row as f64 * (default_h + BATCH_GUTTER),
                }
            })
            .collect();
        store.insert_groups(&rows)?;
        self.reload(store)?;
        Ok(count)
    }

    /// Clamp the dragged position into the canvas and persist best-effort:
    /// a persistence failure keeps the local position and is only logged.
    pub fn move_group(
        &mut self,
        store: &dyn ChartStore,
        group_id: &str,
        x: f64,
        y: f64,
        canvas_w: f64,
        canvas_h: f64,
    ) -> Result<(f64, f64)> {
        if self.group(group_id).is_none() {
            bail!("unknown group: {}", group_id);
        }
        let (cx, cy) = layout::clamp_position(x, y, canvas_w, canvas_h);
        self.group_positions
            .insert(group_id.to_string(), Position { x: cx, y: cy });
        for g in self.groups.iter_mut() {
            if g.id == group_id {
                g.position_x = cx;
                g.position_y = cy;
            }
        }
        if let Err(e) = store.update_group_position(group_id, cx, cy) {
            warn!(group_id, error = %e, "group position persist failed; keeping local position");
        }
        Ok((cx, cy))
    }

    /// A trimmed-empty name is a no-op that keeps the prior name.
    pub fn rename_group(
        &mut self,
        store: &dyn ChartStore,
        group_id: &str,
        new_name: &str,
    ) -> Result<String> {
        let Some(group) = self.group(group_id) else {
            bail!("unknown group: {}", group_id);
        };
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Ok(group.name.clone());
        }
        let name = trimmed.to_string();
        store.update_group_name(group_id, &name)?;
        for g in self.groups.iter_mut() {
            if g.id == group_id {
                g.name = name.clone();
            }
        }
        Ok(name)
    }

    /// Columns are clamped; the row hint stays stale until `save_layout`.
    pub fn set_columns(
        &mut self,
        store: &dyn ChartStore,
        group_id: &str,
        columns: i64,
    ) -> Result<i64> {
        if self.group(group_id).is_none() {
            bail!("unknown group: {}", group_id);
        }
        let c = layout::clamp_columns(columns);
        store.update_group_columns(group_id, c)?;
        for g in self.groups.iter_mut() {
            if g.id == group_id {
                g.columns = c;
            }
        }
        Ok(c)
    }

    /// Delete the groups' assignments; their students return to the
    /// unseated set. Persist-first, so a failure changes nothing locally.
    pub fn clear_groups(&mut self, store: &dyn ChartStore, group_ids: &[String]) -> Result<usize> {
        store.delete_assignments_for_groups(group_ids)?;
        Ok(self.unseat_members(group_ids))
    }

    pub fn clear_all(&mut self, store: &dyn ChartStore) -> Result<usize> {
        let ids: Vec<String> = self.groups.iter().map(|g| g.id.clone()).collect();
        self.clear_groups(store, &ids)
    }

    pub fn delete_groups(&mut self, store: &dyn ChartStore, group_ids: &[String]) -> Result<usize> {
        store.delete_groups(group_ids)?;
        self.unseat_members(group_ids);
        self.groups.retain(|g| !group_ids.contains(&g.id));
        for id in group_ids {
            self.group_students.remove(id);
            self.group_positions.remove(id);
        }
        Ok(group_ids.len())
    }

    pub fn delete_all_groups(&mut self, store: &dyn ChartStore) -> Result<usize> {
        let ids: Vec<String> = self.groups.iter().map(|g| g.id.clone()).collect();
        self.delete_groups(store, &ids)
    }

    fn unseat_members(&mut self, group_ids: &[String]) -> usize {
        let mut moved = 0;
        let already: HashSet<String> = self.unseated.iter().map(|s| s.id.clone()).collect();
        let mut seen = already;
        for id in group_ids {
            let Some(members) = self.group_students.get_mut(id) else {
                continue;
            };
            for s in members.drain(..) {
                if seen.insert(s.id.clone()) {
                    self.unseated.push(s);
                    moved += 1;
                }
            }
        }
        moved
    }

    /// Recompute every group's row-count hint from current membership and
    /// persist all hints in one batch. The only writer of `rows_hint`.
    pub fn save_layout(&mut self, store: &dyn ChartStore) -> Result<usize> {
        let hints: Vec<LayoutHint> = self
            .groups
            .iter()
            .map(|g| LayoutHint {
                group_id: g.id.clone(),
                rows: layout::rows_hint(self.members(&g.id).len(), g.columns),
                columns: g.columns,
            })
            .collect();
        store.save_layout_hints(&hints)?;
        for h in &hints {
            for g in self.groups.iter_mut() {
                if g.id == h.group_id {
                    g.rows_hint = h.rows;
                }
            }
        }
        Ok(hints.len())
    }
}
