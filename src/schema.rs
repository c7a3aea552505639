use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Deserialize;

/// Top-level montage manifest. Every section is optional except the source;
/// defaults follow the original tool's behavior (every frame, auto grid,
/// no captions).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub source: Source,
    /// Intensity factor applied to every frame before annotation.
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub overlay: Option<OverlayConfig>,
    #[serde(default)]
    pub grid: GridConfig,
    /// Output file; may instead be given on the command line.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Manifest {
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale <= 0.0 {
                bail!("scale must be a positive finite factor, got {scale}");
            }
        }
        self.time.validate()?;
        if let Some(overlay) = &self.overlay {
            overlay.validate()?;
        }
        self.grid.validate()?;
        Ok(())
    }
}

/// Where frames come from: a folder of image files or one multi-frame stack
/// (animated GIF, or anything ffmpeg can decode). Exactly one must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    #[serde(default)]
    pub folder: Option<PathBuf>,
    #[serde(default)]
    pub stack: Option<PathBuf>,
}

impl Source {
    pub fn validate(&self) -> Result<()> {
        match (&self.folder, &self.stack) {
            (Some(_), Some(_)) => bail!("source takes exactly one of `folder` or `stack`, not both"),
            (None, None) => bail!("source requires one of `folder` or `stack`"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SelectionConfig {
    pub begin: i64,
    pub end: Option<i64>,
    pub skip: u32,
    pub max_frames: Option<usize>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            begin: 0,
            end: None,
            skip: 0,
            max_frames: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimeConfig {
    pub scale: f64,
    pub unit: String,
}

impl TimeConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            bail!("time.scale must be a positive finite factor, got {}", self.scale);
        }
        if self.unit.trim().is_empty() {
            bail!("time.unit cannot be empty");
        }
        Ok(())
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            unit: "frame".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OverlayConfig {
    pub text: CaptionSource,
    /// Fixed font size in pixels; unset means fit the longest caption.
    pub size: Option<u32>,
    pub font: String,
    pub padding: u32,
    pub position: CaptionPosition,
    pub color: CaptionColor,
}

impl OverlayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.font.trim().is_empty() {
            bail!("overlay.font cannot be empty");
        }
        if self.size == Some(0) {
            bail!("overlay.size must be at least 1 pixel");
        }
        Ok(())
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            text: CaptionSource::File,
            size: None,
            font: "Arial".to_owned(),
            padding: 10,
            position: CaptionPosition::Bottom,
            color: CaptionColor::White,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridConfig {
    pub columns: Option<usize>,
    pub rows: Option<usize>,
    pub margin: u32,
    pub black_margin: bool,
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if self.columns == Some(0) {
            bail!("grid.columns must be at least 1");
        }
        if self.rows == Some(0) {
            bail!("grid.rows must be at least 1");
        }
        Ok(())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: None,
            rows: None,
            margin: 0,
            black_margin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSource {
    /// Caption each frame with its display title (file name or stack index).
    File,
    /// Caption each frame with its scaled timestamp and unit.
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionPosition {
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionColor {
    White,
    Black,
}
