//! Tiling treated frames into the montage canvas.

use anyhow::Result;
use log::{debug, warn};

use crate::framebuf::FrameBuf;
use crate::grid::GridLayout;
use crate::sequence::FrameSequence;

/// Allocate the canvas, fill the margin background, and copy each selected
/// treated frame into its cell, row-major.
///
/// A selection longer than the grid is tolerated: placement stops at
/// `rows * columns` frames and the remainder is ignored. That only happens
/// when the layout was planned for a different frame count.
pub fn compose(
    layout: &GridLayout,
    sequence: &FrameSequence,
    selection: &[usize],
) -> Result<FrameBuf> {
    let margin_value = if layout.black_margin {
        0
    } else {
        sequence.kind().max_value()
    };
    let mut canvas = FrameBuf::filled(
        layout.canvas_width,
        layout.canvas_height,
        sequence.kind(),
        margin_value,
    );

    let frame_width = sequence.width();
    let frame_height = sequence.height();
    for (slot, &frame_index) in selection.iter().enumerate() {
        if slot >= layout.cells() {
            warn!(
                "selection holds {} frames but the grid only has {} cells; dropping the rest",
                selection.len(),
                layout.cells()
            );
            break;
        }

        let row = slot / layout.columns;
        let column = slot % layout.columns;
        let x = column as u32 * (frame_width + layout.margin);
        let y = row as u32 * (frame_height + layout.margin);
        canvas.copy_from(sequence.treated(frame_index), x, y)?;
    }

    debug!(
        "composed {} frames into a {}x{} canvas",
        selection.len().min(layout.cells()),
        layout.canvas_width,
        layout.canvas_height
    );
    Ok(canvas)
}
