//! Frame selection: which source frames end up in the montage.

/// Compute the ordered frame indices to include.
///
/// Bounds are clamped rather than rejected: `begin` is forced into
/// `[0, total_frames - 1]`, an unset or oversized `end` becomes
/// `total_frames`, and `end <= begin` becomes `begin + 1` so the selection is
/// never empty. `skip` is the number of frames dropped between two kept
/// frames (0 = consecutive). `max_frames` truncates the result.
///
/// Precondition: `total_frames >= 1`.
pub fn compute_selection(
    total_frames: usize,
    begin: i64,
    end: Option<i64>,
    skip: u32,
    max_frames: Option<usize>,
) -> Vec<usize> {
    debug_assert!(total_frames >= 1);

    let begin = begin.clamp(0, total_frames as i64 - 1) as usize;
    let end = match end {
        Some(end) if end < total_frames as i64 => end.max(0) as usize,
        _ => total_frames,
    };
    let end = if end <= begin { begin + 1 } else { end };

    let step = skip as usize + 1;
    let mut selection: Vec<usize> = (begin..end).step_by(step).collect();
    if let Some(max_frames) = max_frames {
        selection.truncate(max_frames);
    }
    selection
}
