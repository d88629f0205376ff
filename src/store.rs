use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

/// Roster entry. Read-only from the seating subsystem except `points`,
/// which the award-points handler mutates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub points: i64,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChartRow {
    pub id: String,
    pub class_id: String,
    pub name: String,
    pub show_grid: bool,
    pub show_furniture: bool,
    pub orientation: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub chart_id: String,
    pub name: String,
    pub sort_order: i64,
    pub columns: i64,
    pub rows_hint: i64,
    pub position_x: f64,
    pub position_y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRow {
    pub group_id: String,
    pub student_id: String,
}

#[derive(Debug, Clone)]
pub struct LayoutHint {
    pub group_id: String,
    pub rows: i64,
    pub columns: i64,
}

/// The seating subsystem's only view of persistence. Everything behind
/// this trait is an opaque table-query/mutation collaborator; the session
/// never sees a connection handle.
pub trait ChartStore {
    fn chart_meta(&self, chart_id: &str) -> Result<Option<ChartRow>>;
    fn groups_for_chart(&self, chart_id: &str) -> Result<Vec<GroupRow>>;
    fn assignments_for_groups(&self, group_ids: &[String]) -> Result<Vec<AssignmentRow>>;
    fn class_students(&self, class_id: &str) -> Result<Vec<Student>>;

    /// Insert one or more group rows atomically: a failed batch adds nothing.
    fn insert_groups(&self, rows: &[GroupRow]) -> Result<()>;
    fn update_group_position(&self, group_id: &str, x: f64, y: f64) -> Result<()>;
    fn update_group_name(&self, group_id: &str, name: &str) -> Result<()>;
    fn update_group_columns(&self, group_id: &str, columns: i64) -> Result<()>;
    /// Write back the row-count hints for every group in one transaction.
    fn save_layout_hints(&self, hints: &[LayoutHint]) -> Result<()>;

    fn delete_assignments_for_groups(&self, group_ids: &[String]) -> Result<()>;
    /// Cascade: assignments first, then the group rows, one transaction.
    fn delete_groups(&self, group_ids: &[String]) -> Result<()>;
    /// Apply a set of assignment deletes and inserts as one transaction.
    /// This is the single seam used by moves, swaps, auto-assign, and the
    /// randomizer commit.
    fn replace_assignments(&self, deletes: &[AssignmentRow], inserts: &[AssignmentRow])
        -> Result<()>;
}

pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn in_placeholders(n: usize) -> String {
    std::iter::repeat_n("?", n).collect::<Vec<_>>().join(",")
}

impl ChartStore for SqliteStore<'_> {
    fn chart_meta(&self, chart_id: &str) -> Result<Option<ChartRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, class_id, name, show_grid, show_furniture, orientation
                 FROM charts WHERE id = ?",
                [chart_id],
                |r| {
                    Ok(ChartRow {
                        id: r.get(0)?,
                        class_id: r.get(1)?,
                        name: r.get(2)?,
                        show_grid: r.get::<_, i64>(3)? != 0,
                        show_furniture: r.get::<_, i64>(4)? != 0,
                        orientation: r.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn groups_for_chart(&self, chart_id: &str) -> Result<Vec<GroupRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, chart_id, name, sort_order, columns, rows_hint, position_x, position_y
             FROM seating_groups WHERE chart_id = ? ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([chart_id], |r| {
                Ok(GroupRow {
                    id: r.get(0)?,
                    chart_id: r.get(1)?,
                    name: r.get(2)?,
                    sort_order: r.get(3)?,
                    columns: r.get(4)?,
                    rows_hint: r.get(5)?,
                    position_x: r.get(6)?,
                    position_y: r.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn assignments_for_groups(&self, group_ids: &[String]) -> Result<Vec<AssignmentRow>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT group_id, student_id FROM seating_assignments
             WHERE group_id IN ({}) ORDER BY rowid",
            in_placeholders(group_ids.len())
        );
        let binds: Vec<Value> = group_ids.iter().map(|id| Value::Text(id.clone())).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok(AssignmentRow {
                    group_id: r.get(0)?,
                    student_id: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn class_students(&self, class_id: &str) -> Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, gender, points, avatar
             FROM students WHERE class_id = ? ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    gender: r.get(2)?,
                    points: r.get(3)?,
                    avatar: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn insert_groups(&self, rows: &[GroupRow]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for g in rows {
            tx.execute(
                "INSERT INTO seating_groups(
                   id, chart_id, name, sort_order, columns, rows_hint, position_x, position_y
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &g.id,
                    &g.chart_id,
                    &g.name,
                    g.sort_order,
                    g.columns,
                    g.rows_hint,
                    g.position_x,
                    g.position_y,
                ),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_group_position(&self, group_id: &str, x: f64, y: f64) -> Result<()> {
        self.conn.execute(
            "UPDATE seating_groups SET position_x = ?, position_y = ? WHERE id = ?",
            (x, y, group_id),
        )?;
        Ok(())
    }

    fn update_group_name(&self, group_id: &str, name: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE seating_groups SET name = ? WHERE id = ?",
            (name, group_id),
        )?;
        Ok(())
    }

    fn update_group_columns(&self, group_id: &str, columns: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE seating_groups SET columns = ? WHERE id = ?",
            (columns, group_id),
        )?;
        Ok(())
    }

    fn save_layout_hints(&self, hints: &[LayoutHint]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for h in hints {
            tx.execute(
                "UPDATE seating_groups SET rows_hint = ?, columns = ? WHERE id = ?",
                (h.rows, h.columns, &h.group_id),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_assignments_for_groups(&self, group_ids: &[String]) -> Result<()> {
        if group_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM seating_assignments WHERE group_id IN ({})",
            in_placeholders(group_ids.len())
        );
        let binds: Vec<Value> = group_ids.iter().map(|id| Value::Text(id.clone())).collect();
        self.conn.execute(&sql, params_from_iter(binds))?;
        Ok(())
    }

    fn delete_groups(&self, group_ids: &[String]) -> Result<()> {
        if group_ids.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        let binds: Vec<Value> = group_ids.iter().map(|id| Value::Text(id.clone())).collect();
        let sql = format!(
            "DELETE FROM seating_assignments WHERE group_id IN ({})",
            in_placeholders(group_ids.len())
        );
        tx.execute(&sql, params_from_iter(binds.clone()))?;
        let sql = format!(
            "DELETE FROM seating_groups WHERE id IN ({})",
            in_placeholders(group_ids.len())
        );
        tx.execute(&sql, params_from_iter(binds))?;
        tx.commit()?;
        Ok(())
    }

    fn replace_assignments(
        &self,
        deletes: &[AssignmentRow],
        inserts: &[AssignmentRow],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for a in deletes {
            tx.execute(
                "DELETE FROM seating_assignments WHERE group_id = ? AND student_id = ?",
                (&a.group_id, &a.student_id),
            )?;
        }
        for a in inserts {
            tx.execute(
                "INSERT INTO seating_assignments(group_id, student_id) VALUES(?, ?)",
                (&a.group_id, &a.student_id),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// In-memory store for session/coordinator tests. Set `fail_writes`
    /// to make every mutating call error without touching state.
    #[derive(Default)]
    pub struct MemStore {
        pub chart: RefCell<Option<ChartRow>>,
        pub groups: RefCell<Vec<GroupRow>>,
        pub assignments: RefCell<Vec<AssignmentRow>>,
        pub students: RefCell<Vec<Student>>,
        pub fail_writes: Cell<bool>,
    }

    impl MemStore {
        pub fn with_chart(chart_id: &str, class_id: &str) -> Self {
            let store = Self::default();
            *store.chart.borrow_mut() = Some(ChartRow {
                id: chart_id.to_string(),
                class_id: class_id.to_string(),
                name: "Period 1".to_string(),
                show_grid: true,
                show_furniture: false,
                orientation: "Left".to_string(),
            });
            store
        }

        pub fn add_student(&self, id: &str) {
            self.students.borrow_mut().push(Student {
                id: id.to_string(),
                name: format!("Student {}", id),
                gender: "F".to_string(),
                points: 0,
                avatar: None,
            });
        }

        pub fn add_group(&self, id: &str, chart_id: &str, sort_order: i64) {
            self.groups.borrow_mut().push(GroupRow {
                id: id.to_string(),
                chart_id: chart_id.to_string(),
                name: format!("Group {}", sort_order + 1),
                sort_order,
                columns: 2,
                rows_hint: 2,
                position_x: 20.0,
                position_y: 20.0,
            });
        }

        pub fn assign(&self, group_id: &str, student_id: &str) {
            self.assignments.borrow_mut().push(AssignmentRow {
                group_id: group_id.to_string(),
                student_id: student_id.to_string(),
            });
        }

        fn check_write(&self) -> Result<()> {
            if self.fail_writes.get() {
                anyhow::bail!("injected store failure");
            }
            Ok(())
        }
    }

    impl ChartStore for MemStore {
        fn chart_meta(&self, chart_id: &str) -> Result<Option<ChartRow>> {
            Ok(self
                .chart
                .borrow()
                .clone()
                .filter(|c| c.id == chart_id))
        }

        fn groups_for_chart(&self, chart_id: &str) -> Result<Vec<GroupRow>> {
            let mut rows: Vec<GroupRow> = self
                .groups
                .borrow()
                .iter()
                .filter(|g| g.chart_id == chart_id)
                .cloned()
                .collect();
            rows.sort_by_key(|g| g.sort_order);
            Ok(rows)
        }

        fn assignments_for_groups(&self, group_ids: &[String]) -> Result<Vec<AssignmentRow>> {
            Ok(self
                .assignments
                .borrow()
                .iter()
                .filter(|a| group_ids.contains(&a.group_id))
                .cloned()
                .collect())
        }

        fn class_students(&self, _class_id: &str) -> Result<Vec<Student>> {
            Ok(self.students.borrow().clone())
        }

        fn insert_groups(&self, rows: &[GroupRow]) -> Result<()> {
            self.check_write()?;
            self.groups.borrow_mut().extend_from_slice(rows);
            Ok(())
        }

        fn update_group_position(&self, group_id: &str, x: f64, y: f64) -> Result<()> {
            self.check_write()?;
            for g in self.groups.borrow_mut().iter_mut() {
                if g.id == group_id {
                    g.position_x = x;
                    g.position_y = y;
                }
            }
            Ok(())
        }

        fn update_group_name(&self, group_id: &str, name: &str) -> Result<()> {
            self.check_write()?;
            for g in self.groups.borrow_mut().iter_mut() {
                if g.id == group_id {
                    g.name = name.to_string();
                }
            }
            Ok(())
        }

        fn update_group_columns(&self, group_id: &str, columns: i64) -> Result<()> {
            self.check_write()?;
            for g in self.groups.borrow_mut().iter_mut() {
                if g.id == group_id {
                    g.columns = columns;
                }
            }
            Ok(())
        }

        fn save_layout_hints(&self, hints: &[LayoutHint]) -> Result<()> {
            self.check_write()?;
            for h in hints {
                for g in self.groups.borrow_mut().iter_mut() {
                    if g.id == h.group_id {
                        g.rows_hint = h.rows;
                        g.columns = h.columns;
                    }
                }
            }
            Ok(())
        }

        fn delete_assignments_for_groups(&self, group_ids: &[String]) -> Result<()> {
            self.check_write()?;
            self.assignments
                .borrow_mut()
                .retain(|a| !group_ids.contains(&a.group_id));
            Ok(())
        }

        fn delete_groups(&self, group_ids: &[String]) -> Result<()> {
            self.check_write()?;
            self.assignments
                .borrow_mut()
                .retain(|a| !group_ids.contains(&a.group_id));
            self.groups.borrow_mut().retain(|g| !group_ids.contains(&g.id));
            Ok(())
        }

        fn replace_assignments(
            &self,
            deletes: &[AssignmentRow],
            inserts: &[AssignmentRow],
        ) -> Result<()> {
            self.check_write()?;
            self.assignments.borrow_mut().retain(|a| !deletes.contains(a));
            self.assignments.borrow_mut().extend_from_slice(inserts);
            Ok(())
        }
    }
}
