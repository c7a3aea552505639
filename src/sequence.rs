//! A loaded frame sequence: immutable raw frames plus a treated working copy.
//!
//! Edits (intensity scaling, caption burn-in) only ever touch the treated
//! buffers; `reset` rebuilds them from raw plus the recorded intensity scale,
//! so annotation can be re-applied without re-decoding.

use anyhow::{bail, Result};
use log::debug;

use crate::error_codes::{CodedError, FRAME_SHAPE_MISMATCH};
use crate::framebuf::{FrameBuf, PixelKind};

#[derive(Debug)]
pub struct FrameSequence {
    raw: Vec<FrameBuf>,
    treated: Vec<FrameBuf>,
    titles: Vec<String>,
    times: Vec<f64>,
    time_unit: String,
    intensity_scale: Option<f32>,
    overlay_applied: bool,
    width: u32,
    height: u32,
    kind: PixelKind,
}

impl FrameSequence {
    /// Build a sequence from decoded frames and their display titles.
    ///
    /// Every frame must share the first frame's size and pixel kind; a
    /// mismatch is fatal for the whole sequence.
    pub fn new(frames: Vec<FrameBuf>, titles: Vec<String>) -> Result<Self> {
        if frames.is_empty() {
            bail!("a frame sequence cannot be empty");
        }
        if titles.len() != frames.len() {
            bail!(
                "{} titles supplied for {} frames",
                titles.len(),
                frames.len()
            );
        }

        let width = frames[0].width();
        let height = frames[0].height();
        let kind = frames[0].kind();
        for (index, frame) in frames.iter().enumerate() {
            if frame.width() != width || frame.height() != height || frame.kind() != kind {
                return Err(CodedError::shape(
                    FRAME_SHAPE_MISMATCH,
                    format!(
                        "frame {} ('{}') is {}x{} {}, expected {}x{} {}",
                        index,
                        titles[index],
                        frame.width(),
                        frame.height(),
                        frame.kind().label(),
                        width,
                        height,
                        kind.label()
                    ),
                )
                .into());
            }
        }

        let times = (0..frames.len()).map(|index| index as f64).collect();
        debug!(
            "sequence of {} frames, {}x{} {}",
            frames.len(),
            width,
            height,
            kind.label()
        );
        Ok(Self {
            treated: frames.clone(),
            raw: frames,
            titles,
            times,
            time_unit: "frame".to_owned(),
            intensity_scale: None,
            overlay_applied: false,
            width,
            height,
            kind,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn kind(&self) -> PixelKind {
        self.kind
    }

    pub fn title(&self, index: usize) -> &str {
        &self.titles[index]
    }

    pub fn time(&self, index: usize) -> f64 {
        self.times[index]
    }

    pub fn time_unit(&self) -> &str {
        &self.time_unit
    }

    pub fn treated(&self, index: usize) -> &FrameBuf {
        &self.treated[index]
    }

    pub fn treated_mut(&mut self, index: usize) -> &mut FrameBuf {
        &mut self.treated[index]
    }

    pub fn raw(&self, index: usize) -> &FrameBuf {
        &self.raw[index]
    }

    /// Give each frame the time `index * scale` in `unit`s.
    pub fn set_time_scale(&mut self, scale: f64, unit: &str) {
        self.times = (0..self.raw.len()).map(|index| index as f64 * scale).collect();
        self.time_unit = unit.to_owned();
    }

    /// Record and apply an intensity factor. Treated frames are rebuilt from
    /// raw first, so repeated calls do not compound.
    pub fn scale_intensity(&mut self, factor: f32) {
        self.intensity_scale = Some(factor);
        self.rebuild_treated();
    }

    /// Discard burned-in annotations: treated becomes raw with the recorded
    /// intensity scale re-applied.
    pub fn reset(&mut self) {
        self.rebuild_treated();
    }

    fn rebuild_treated(&mut self) {
        self.treated = self.raw.clone();
        if let Some(factor) = self.intensity_scale {
            for frame in &mut self.treated {
                frame.scale_intensity(factor);
            }
        }
        self.overlay_applied = false;
    }

    pub fn overlay_applied(&self) -> bool {
        self.overlay_applied
    }

    pub(crate) fn mark_overlay_applied(&mut self) {
        self.overlay_applied = true;
    }
}
