//! Writing the finished canvas to disk.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::error_codes::{CodedError, OUTPUT_DIR_MISSING};
use crate::framebuf::FrameBuf;

/// Encode `canvas` to `path`; the format follows the file extension.
///
/// The parent directory must already exist — failing before encoding keeps
/// "no partial montage is written" trivially true.
pub fn write_montage(canvas: &FrameBuf, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(CodedError::resource(
                OUTPUT_DIR_MISSING,
                format!("output directory '{}' does not exist", parent.display()),
            )
            .into());
        }
    }

    canvas
        .to_dynamic()?
        .save(path)
        .with_context(|| format!("failed to write montage to '{}'", path.display()))?;
    info!(
        "wrote {}x{} montage to '{}'",
        canvas.width(),
        canvas.height(),
        path.display()
    );
    Ok(())
}
