//! Caption overlay: uniform font sizing, mask rendering and burn-in.
//!
//! One font size is chosen from the longest caption and reused for every
//! frame, so a montage never mixes text sizes. Captions are rendered into
//! binary masks the size of one frame, then burned into the treated buffers.

use anyhow::Result;
use log::debug;

use crate::error_codes::{CodedError, OVERLAY_PADDING_TOO_LARGE};
use crate::fonts::CaptionFace;
use crate::schema::{CaptionColor, CaptionPosition, CaptionSource, OverlayConfig};
use crate::sequence::FrameSequence;

pub const MASK_BACKGROUND: u8 = 0;
pub const MASK_TEXT: u8 = u8::MAX;

// Caps the fit search; frames wider than this in text terms would produce
// absurd glyphs long before the cap matters.
const MAX_FONT_SIZE: u32 = 512;

/// Binary caption mask, one byte per pixel of one frame.
pub struct CaptionMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Caption text for each selected frame: display titles or timestamps.
pub fn caption_strings(
    sequence: &FrameSequence,
    selection: &[usize],
    source: CaptionSource,
) -> Vec<String> {
    selection
        .iter()
        .map(|&index| match source {
            CaptionSource::File => sequence.title(index).to_owned(),
            CaptionSource::Time => {
                format!("{} {}", sequence.time(index), sequence.time_unit())
            }
        })
        .collect()
}

/// Largest integer size at which the longest caption still renders narrower
/// than `width_limit`. Linear search from 1; the rasterizer is assumed
/// monotonic in size. Returns at least 1.
pub fn uniform_font_size(
    face: &mut dyn CaptionFace,
    captions: &[String],
    width_limit: u32,
) -> u32 {
    let mut longest = "";
    for caption in captions {
        if caption.chars().count() > longest.chars().count() {
            longest = caption;
        }
    }
    if longest.is_empty() {
        return 1;
    }

    let mut size = 1;
    while size < MAX_FONT_SIZE && face.measure(longest, size).0 < width_limit {
        size += 1;
    }
    (size - 1).max(1)
}

/// Rasterize one caption into a frame-sized binary mask at `(padding, y)`,
/// where `y` is `padding` for top placement and
/// `height - padding - text_height` for bottom placement.
pub fn render_caption_mask(
    face: &mut dyn CaptionFace,
    caption: &str,
    frame_width: u32,
    frame_height: u32,
    size: u32,
    padding: u32,
    position: CaptionPosition,
) -> CaptionMask {
    let mut data = vec![MASK_BACKGROUND; frame_width as usize * frame_height as usize];
    if !caption.is_empty() {
        let (_, text_height) = face.measure(caption, size);
        let y = match position {
            CaptionPosition::Top => padding,
            CaptionPosition::Bottom => frame_height.saturating_sub(padding + text_height),
        };
        face.draw_line(&mut data, frame_width, frame_height, padding, y, caption, size);
    }
    CaptionMask {
        width: frame_width,
        height: frame_height,
        data,
    }
}

/// Burn captions into the treated frames of `selection`.
///
/// Re-annotation is idempotent: if captions were already burned in, the
/// treated buffers are rebuilt from raw first. White burns the pixel-type
/// maximum, black burns zero; only mask-foreground pixels change.
pub fn apply_overlay(
    sequence: &mut FrameSequence,
    selection: &[usize],
    face: &mut dyn CaptionFace,
    config: &OverlayConfig,
) -> Result<()> {
    let captions = caption_strings(sequence, selection, config.text);
    if captions.is_empty() {
        return Ok(());
    }

    let width_limit = config
        .padding
        .checked_mul(2)
        .and_then(|pad| sequence.width().checked_sub(pad))
        .filter(|&limit| limit > 0)
        .ok_or_else(|| {
            CodedError::configuration(
                OVERLAY_PADDING_TOO_LARGE,
                format!(
                    "padding {} leaves no room for text in {}px wide frames",
                    config.padding,
                    sequence.width()
                ),
            )
        })?;

    if sequence.overlay_applied() {
        debug!("captions already burned in; resetting treated frames first");
        sequence.reset();
    }

    let size = match config.size {
        Some(size) => size,
        None => uniform_font_size(face, &captions, width_limit),
    };
    let color_value = match config.color {
        CaptionColor::White => sequence.kind().max_value(),
        CaptionColor::Black => 0,
    };
    debug!(
        "burning {} captions at {size}px, color value {color_value}",
        captions.len()
    );

    for (slot, &frame_index) in selection.iter().enumerate() {
        let mask = render_caption_mask(
            face,
            &captions[slot],
            sequence.width(),
            sequence.height(),
            size,
            config.padding,
            config.position,
        );
        sequence
            .treated_mut(frame_index)
            .burn_mask(&mask.data, color_value)?;
    }
    sequence.mark_overlay_applied();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuf::{FrameBuf, PixelKind};

    /// Deterministic face: every glyph is a `px/2`-wide, `px`-tall solid
    /// block, so rendered width is `len * px / 2`.
    struct StubFace;

    impl CaptionFace for StubFace {
        fn measure(&mut self, text: &str, px: u32) -> (u32, u32) {
            (text.chars().count() as u32 * px / 2, px)
        }

        fn draw_line(&mut self, mask: &mut [u8], mask_width: u32, mask_height: u32, x: u32, y: u32, text: &str, px: u32) {
            let (width, height) = self.measure(text, px);
            for row in y..(y + height).min(mask_height) {
                for column in x..(x + width).min(mask_width) {
                    mask[row as usize * mask_width as usize + column as usize] = MASK_TEXT;
                }
            }
        }
    }

    fn sequence(frames: usize, width: u32, height: u32, value: u32) -> FrameSequence {
        let buffers = (0..frames)
            .map(|_| FrameBuf::filled(width, height, PixelKind::Gray8, value))
            .collect();
        let titles = (0..frames).map(|index| format!("cell_{index:03}.tif")).collect();
        FrameSequence::new(buffers, titles).expect("uniform frames build a sequence")
    }

    fn overlay(position: CaptionPosition, color: CaptionColor, padding: u32) -> OverlayConfig {
        OverlayConfig {
            padding,
            position,
            color,
            ..OverlayConfig::default()
        }
    }

    #[test]
    fn caption_strings_follow_the_selection_order() {
        let mut seq = sequence(4, 40, 20, 0);
        seq.set_time_scale(0.5, "s");

        assert_eq!(
            caption_strings(&seq, &[1, 3], CaptionSource::File),
            vec!["cell_001.tif", "cell_003.tif"]
        );
        assert_eq!(
            caption_strings(&seq, &[0, 1, 2], CaptionSource::Time),
            vec!["0 s", "0.5 s", "1 s"]
        );
    }

    #[test]
    fn font_size_search_is_deterministic() {
        // Stub width is len * px / 2; for "abcd" the first px at which
        // width >= 20 is 10, so the search settles on 9.
        let captions = vec!["abcd".to_owned()];
        assert_eq!(uniform_font_size(&mut StubFace, &captions, 20), 9);
        // Repeatable.
        assert_eq!(uniform_font_size(&mut StubFace, &captions, 20), 9);
    }

    #[test]
    fn font_size_search_uses_the_longest_caption() {
        let captions = vec!["ab".to_owned(), "abcdefgh".to_owned(), "abc".to_owned()];
        // Longest is 8 chars: first overflow of 20 at px 5 -> size 4.
        assert_eq!(uniform_font_size(&mut StubFace, &captions, 20), 4);
    }

    #[test]
    fn font_size_never_drops_below_one() {
        let captions = vec!["a-very-long-caption-name.png".to_owned()];
        assert_eq!(uniform_font_size(&mut StubFace, &captions, 2), 1);
    }

    #[test]
    fn mask_places_text_at_top_or_bottom() {
        let top = render_caption_mask(&mut StubFace, "ab", 20, 16, 4, 2, CaptionPosition::Top);
        // Block is 4 wide, 4 tall at (2, 2).
        assert_eq!(top.data[2 * 20 + 2], MASK_TEXT);
        assert_eq!(top.data[0], MASK_BACKGROUND);
        assert_eq!(top.data[6 * 20 + 2], MASK_BACKGROUND);

        let bottom = render_caption_mask(&mut StubFace, "ab", 20, 16, 4, 2, CaptionPosition::Bottom);
        // text_height = 4, so y = 16 - 2 - 4 = 10.
        assert_eq!(bottom.data[10 * 20 + 2], MASK_TEXT);
        assert_eq!(bottom.data[2 * 20 + 2], MASK_BACKGROUND);
    }

    #[test]
    fn empty_caption_renders_an_empty_mask() {
        let mask = render_caption_mask(&mut StubFace, "", 10, 10, 4, 2, CaptionPosition::Top);
        assert!(mask.data.iter().all(|&tone| tone == MASK_BACKGROUND));
    }

    #[test]
    fn empty_selection_is_a_no_op() {
        let mut seq = sequence(2, 40, 20, 7);
        apply_overlay(
            &mut seq,
            &[],
            &mut StubFace,
            &overlay(CaptionPosition::Bottom, CaptionColor::White, 2),
        )
        .expect("empty selection is fine");
        assert!(!seq.overlay_applied());
        assert_eq!(seq.treated(0).sample(0, 0, 0), 7);
    }

    #[test]
    fn white_burns_max_and_black_burns_zero() {
        let mut seq = sequence(1, 40, 20, 100);
        apply_overlay(
            &mut seq,
            &[0],
            &mut StubFace,
            &overlay(CaptionPosition::Top, CaptionColor::White, 2),
        )
        .expect("overlay applies");
        assert_eq!(seq.treated(0).sample(2, 2, 0), 255);

        let mut seq = sequence(1, 40, 20, 100);
        apply_overlay(
            &mut seq,
            &[0],
            &mut StubFace,
            &overlay(CaptionPosition::Top, CaptionColor::Black, 2),
        )
        .expect("overlay applies");
        assert_eq!(seq.treated(0).sample(2, 2, 0), 0);
        assert_eq!(seq.treated(0).sample(39, 19, 0), 100, "background untouched");
    }

    #[test]
    fn reapplying_overlay_is_idempotent() {
        let mut seq = sequence(3, 60, 24, 40);
        let config = overlay(CaptionPosition::Bottom, CaptionColor::White, 3);
        let selection = [0, 2];

        apply_overlay(&mut seq, &selection, &mut StubFace, &config).expect("first apply");
        let first: Vec<FrameBuf> = (0..3).map(|index| seq.treated(index).clone()).collect();

        apply_overlay(&mut seq, &selection, &mut StubFace, &config).expect("second apply");
        for index in 0..3 {
            assert_eq!(
                seq.treated(index),
                &first[index],
                "treated frame {index} should be pixel-identical on re-annotation"
            );
        }
    }

    #[test]
    fn oversized_padding_is_a_configuration_error() {
        let mut seq = sequence(1, 40, 20, 0);
        let error = apply_overlay(
            &mut seq,
            &[0],
            &mut StubFace,
            &overlay(CaptionPosition::Top, CaptionColor::White, 20),
        )
        .expect_err("padding consumes the whole width");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, OVERLAY_PADDING_TOO_LARGE);
    }

    #[test]
    fn fixed_size_skips_the_search() {
        let mut seq = sequence(1, 400, 200, 0);
        let mut config = overlay(CaptionPosition::Top, CaptionColor::White, 2);
        config.size = Some(12);
        apply_overlay(&mut seq, &[0], &mut StubFace, &config).expect("overlay applies");

        // Stub block at size 12 is 12 rows tall starting at y=2.
        assert_eq!(seq.treated(0).sample(2, 2, 0), 255);
        assert_eq!(seq.treated(0).sample(2, 13, 0), 255);
        assert_eq!(seq.treated(0).sample(2, 14, 0), 0);
    }
}
