use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::schema::Manifest;

/// Read, parse and validate a montage manifest. Source and output paths are
/// resolved relative to the manifest's directory.
pub fn load_and_validate_manifest(path: &Path) -> Result<Manifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut manifest: Manifest = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    manifest.validate()?;

    let manifest_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if let Some(folder) = &manifest.source.folder {
        manifest.source.folder = Some(resolve(&manifest_dir, folder));
    }
    if let Some(stack) = &manifest.source.stack {
        manifest.source.stack = Some(resolve(&manifest_dir, stack));
    }
    if let Some(output) = &manifest.output {
        manifest.output = Some(resolve(&manifest_dir, output));
    }

    Ok(manifest)
}

fn resolve(manifest_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        manifest_dir.join(path)
    }
}
