use serde::Serialize;
use std::collections::HashSet;

/// Minimum rendered width of a single student card.
pub const CARD_MIN_WIDTH: f64 = 180.0;
/// Horizontal gap between cards and the group border.
pub const CARD_GUTTER: f64 = 8.0;
/// No group renders narrower than this regardless of columns.
pub const MIN_GROUP_WIDTH: f64 = 300.0;

pub const HEADER_HEIGHT: f64 = 50.0;
pub const ROW_HEIGHT: f64 = 50.0;
pub const GROUP_PADDING: f64 = 16.0;

/// Reference unit: rendered width of a 2-column group
/// (two cards plus three gutters).
pub const W2: f64 = 2.0 * CARD_MIN_WIDTH + 3.0 * CARD_GUTTER;

/// Minimum footprint kept inside the canvas when a group is dragged.
pub const MIN_FOOTPRINT_W: f64 = 300.0;
pub const MIN_FOOTPRINT_H: f64 = 100.0;

/// Fallback viewport when the client does not report its canvas size.
pub const DEFAULT_CANVAS_W: f64 = 1600.0;
pub const DEFAULT_CANVAS_H: f64 = 900.0;

pub fn clamp_columns(columns: i64) -> i64 {
    columns.clamp(1, 3)
}

/// Number of student rows a group renders: at least 1, even when empty.
pub fn student_rows(member_count: usize, columns: i64) -> i64 {
    let c = clamp_columns(columns) as usize;
    let rows = member_count.div_ceil(c);
    rows.max(1) as i64
}

/// Persisted row-count hint: one header row plus the student rows.
/// Written back only on an explicit layout save.
pub fn rows_hint(member_count: usize, columns: i64) -> i64 {
    1 + student_rows(member_count, columns)
}

pub fn group_width(columns: i64) -> f64 {
    match clamp_columns(columns) {
        1 => 0.5 * W2,
        2 => W2,
        _ => (3.0 * CARD_MIN_WIDTH + 4.0 * CARD_GUTTER).max(MIN_GROUP_WIDTH),
    }
}

pub fn group_height(member_count: usize, columns: i64) -> f64 {
    HEADER_HEIGHT + ROW_HEIGHT * student_rows(member_count, columns) as f64 + GROUP_PADDING
}

/// Clamp a dragged position so the group's minimum footprint stays inside
/// the canvas. Never negative.
pub fn clamp_position(x: f64, y: f64, canvas_w: f64, canvas_h: f64) -> (f64, f64) {
    let max_x = (canvas_w - MIN_FOOTPRINT_W).max(0.0);
    let max_y = (canvas_h - MIN_FOOTPRINT_H).max(0.0);
    (x.clamp(0.0, max_x), y.clamp(0.0, max_y))
}

/// Drop duplicate ids, keeping the first occurrence. Duplicate assignment
/// rows must never produce duplicate membership.
pub fn dedup_by_id<T, F>(items: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(id_of(&item).to_string()) {
            out.push(item);
        }
    }
    out
}

/// One rendered seat cell: a student id, or empty padding in the last row.
pub type SeatCell = Option<String>;

/// Distribute member ids into rows, left-to-right, top-to-bottom,
/// `columns` per row. The last row pads remaining cells empty. Duplicate
/// ids are filtered first, keeping the first occurrence.
pub fn pack_rows(member_ids: &[String], columns: i64) -> Vec<Vec<SeatCell>> {
    let c = clamp_columns(columns) as usize;
    let ids = dedup_by_id(member_ids.to_vec(), |s| s.as_str());

    let row_count = student_rows(ids.len(), columns) as usize;
    let mut rows: Vec<Vec<SeatCell>> = Vec::with_capacity(row_count);
    for r in 0..row_count {
        let mut row: Vec<SeatCell> = Vec::with_capacity(c);
        for k in 0..c {
            row.push(ids.get(r * c + k).cloned());
        }
        rows.push(row);
    }
    rows
}

/// Computed geometry for one group, recomputed on every render.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupGeometry {
    pub columns: i64,
    pub rows: i64,
    pub width: f64,
    pub height: f64,
    pub seats: Vec<Vec<SeatCell>>,
}

pub fn group_geometry(member_ids: &[String], columns: i64) -> GroupGeometry {
    let c = clamp_columns(columns);
    let seats = pack_rows(member_ids, c);
    let n = seats.iter().flatten().filter(|s| s.is_some()).count();
    GroupGeometry {
        columns: c,
        rows: student_rows(n, c),
        width: group_width(c),
        height: group_height(n, c),
        seats,
    }
}
