//! Grid planning: rows, columns and canvas geometry for a montage.

use anyhow::{bail, Context, Result};

/// Placement plan for a flat list of selected frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub columns: usize,
    pub margin: u32,
    pub black_margin: bool,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl GridLayout {
    pub fn cells(&self) -> usize {
        self.rows * self.columns
    }
}

/// Integer whose square is nearest `count`; ties go to the larger candidate.
pub fn closest_square(count: usize) -> usize {
    let mut below = 0usize;
    let mut above = 1usize;
    while above * above < count {
        below += 1;
        above += 1;
    }
    if count.abs_diff(below * below) < count.abs_diff(above * above) {
        below
    } else {
        above
    }
}

/// Derive rows/columns (auto square-ish unless overridden) and the exact
/// canvas size for `frame_count` frames of `frame_height` x `frame_width`
/// pixels separated by `margin` background pixels.
pub fn plan_grid(
    frame_count: usize,
    frame_height: u32,
    frame_width: u32,
    columns: Option<usize>,
    rows: Option<usize>,
    margin: u32,
    black_margin: bool,
) -> Result<GridLayout> {
    if frame_count == 0 {
        bail!("cannot plan a grid for zero frames");
    }
    if frame_height == 0 || frame_width == 0 {
        bail!("frame size must be positive, got {frame_width}x{frame_height}");
    }

    let (columns, rows) = match (columns, rows) {
        (None, None) => {
            let columns = closest_square(frame_count);
            (columns, frame_count.div_ceil(columns))
        }
        (Some(columns), None) => (columns, frame_count.div_ceil(columns)),
        (None, Some(rows)) => (frame_count.div_ceil(rows), rows),
        (Some(columns), Some(rows)) => (columns, rows),
    };
    if columns == 0 || rows == 0 {
        bail!("grid must have at least one row and one column");
    }

    let canvas_height = span(rows, frame_height, margin)
        .with_context(|| format!("canvas height overflows for {rows} rows"))?;
    let canvas_width = span(columns, frame_width, margin)
        .with_context(|| format!("canvas width overflows for {columns} columns"))?;

    Ok(GridLayout {
        rows,
        columns,
        margin,
        black_margin,
        canvas_width,
        canvas_height,
    })
}

/// `cells * extent + (cells - 1) * margin`, checked into `u32`.
fn span(cells: usize, extent: u32, margin: u32) -> Result<u32> {
    let total = cells as u64 * u64::from(extent) + (cells as u64 - 1) * u64::from(margin);
    u32::try_from(total).context("canvas dimension exceeds u32")
}
