//! Font resolution and caption text rasterization.
//!
//! The overlay engine never touches the filesystem or a glyph rasterizer
//! directly: it is handed a [`CaptionFace`], and the CLI builds one from a
//! family name via [`FontResolver`]. Tests substitute a stub face.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use log::debug;

use crate::error_codes::{CodedError, FONT_NOT_FOUND};

/// Glyph coverage at or above this value becomes mask foreground.
const COVERAGE_THRESHOLD: u8 = 128;

/// Resolves a font family name to a font file on the host.
pub trait FontResolver {
    fn resolve(&self, family: &str) -> Result<PathBuf>;
}

/// Scans font directories for a file whose name contains the requested
/// family, case-insensitively. `"Arial"` matches `Arial.ttf` and
/// `Arial Bold.ttf`; an explicit `"Arial.ttf"` matches exactly that file.
pub struct SystemFonts {
    roots: Vec<PathBuf>,
}

impl SystemFonts {
    pub fn new() -> Self {
        let mut roots = vec![
            PathBuf::from("/usr/share/fonts"),
            PathBuf::from("/usr/local/share/fonts"),
            PathBuf::from("/Library/Fonts"),
            PathBuf::from("/System/Library/Fonts"),
            PathBuf::from("C:\\Windows\\Fonts"),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            roots.push(home.join(".fonts"));
            roots.push(home.join(".local/share/fonts"));
        }
        Self { roots }
    }

    /// Restrict the scan to explicit directories. Used by tests.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl Default for SystemFonts {
    fn default() -> Self {
        Self::new()
    }
}

impl FontResolver for SystemFonts {
    fn resolve(&self, family: &str) -> Result<PathBuf> {
        let needle = family.trim().to_lowercase();
        let mut candidates = Vec::new();
        for root in &self.roots {
            collect_font_files(root, &mut candidates);
        }
        candidates.retain(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
        // Scan order depends on the filesystem; sort so the pick is stable.
        candidates.sort();

        match candidates.into_iter().next() {
            Some(path) => {
                debug!("resolved font '{family}' to {}", path.display());
                Ok(path)
            }
            None => Err(CodedError::resource(
                FONT_NOT_FOUND,
                format!("no installed font file matches '{family}'"),
            )
            .into()),
        }
    }
}

fn collect_font_files(dir: &Path, out: &mut Vec<PathBuf>) {
    // Missing roots are normal across platforms; skip quietly.
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_font_files(&path, out);
        } else if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("ttf" | "otf" | "TTF" | "OTF" | "ttc")
        ) {
            out.push(path);
        }
    }
}

/// Measure and stamp single-line captions. Implementations must be
/// monotonic: a larger `px` never renders the same text narrower.
pub trait CaptionFace {
    /// Rendered width and height of `text` at `px` pixels.
    fn measure(&mut self, text: &str, px: u32) -> (u32, u32);

    /// Stamp `text` into `mask` (one byte per pixel, row-major
    /// `mask_width * mask_height`) with its top-left pen position at
    /// `(x, y)`, writing `255` on covered pixels. Clips at mask edges.
    fn draw_line(&mut self, mask: &mut [u8], mask_width: u32, mask_height: u32, x: u32, y: u32, text: &str, px: u32);
}

#[derive(Debug, Clone)]
struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// A parsed TrueType/OpenType face backed by `fontdue`.
pub struct TrueTypeFace {
    font: Font,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl TrueTypeFace {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font file '{}'", path.display()))?;
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))?;
        Ok(Self {
            font,
            glyph_cache: HashMap::new(),
        })
    }

    fn line_layout(&self, text: &str, px: f32, x: f32, y: f32) -> Layout {
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x,
            y,
            max_width: None,
            max_height: None,
            horizontal_align: fontdue::layout::HorizontalAlign::Left,
            vertical_align: fontdue::layout::VerticalAlign::Top,
            line_height: 1.0,
            wrap_style: fontdue::layout::WrapStyle::Letter,
            wrap_hard_breaks: false,
        });
        layout.append(&[&self.font], &TextStyle::new(text, px, 0));
        layout
    }
}

impl CaptionFace for TrueTypeFace {
    fn measure(&mut self, text: &str, px: u32) -> (u32, u32) {
        if text.is_empty() {
            return (0, 0);
        }
        let layout = self.line_layout(text, px as f32, 0.0, 0.0);
        let width = layout
            .glyphs()
            .iter()
            .map(|glyph| glyph.x + glyph.width as f32)
            .fold(0.0f32, f32::max);
        (width.ceil() as u32, layout.height().ceil() as u32)
    }

    fn draw_line(&mut self, mask: &mut [u8], mask_width: u32, mask_height: u32, x: u32, y: u32, text: &str, px: u32) {
        let layout = self.line_layout(text, px as f32, x as f32, y as f32);
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let glyph_bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = self.font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            stamp_glyph(
                mask,
                mask_width,
                mask_height,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                glyph_bitmap,
            );
        }
    }
}

fn stamp_glyph(mask: &mut [u8], mask_width: u32, mask_height: u32, x: i32, y: i32, glyph: &GlyphBitmap) {
    for row in 0..glyph.height {
        let target_y = y + row as i32;
        if target_y < 0 || target_y >= mask_height as i32 {
            continue;
        }
        for column in 0..glyph.width {
            let target_x = x + column as i32;
            if target_x < 0 || target_x >= mask_width as i32 {
                continue;
            }
            if glyph.bitmap[row * glyph.width + column] >= COVERAGE_THRESHOLD {
                mask[target_y as usize * mask_width as usize + target_x as usize] = u8::MAX;
            }
        }
    }
}
