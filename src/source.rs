//! Frame sources: a folder of image files or a multi-frame stack file.
//!
//! Animated GIF stacks are decoded in-process; any other stack format goes
//! through an ffmpeg rawvideo pipe so the core only ever sees decoded RGBA
//! frames. Folder sources keep their native pixel depth.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use log::{debug, info};

use crate::error_codes::{CodedError, SOURCE_EMPTY, SOURCE_NOT_FOUND};
use crate::framebuf::FrameBuf;
use crate::schema::Source;
use crate::sequence::FrameSequence;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "gif"];

pub fn load(source: &Source) -> Result<FrameSequence> {
    match (&source.folder, &source.stack) {
        (Some(folder), None) => load_folder(folder),
        (None, Some(stack)) => load_stack(stack),
        // The manifest validator rejects these before loading.
        _ => bail!("source requires exactly one of `folder` or `stack`"),
    }
}

/// Decode every image file in `folder`, in alphabetical order, into one
/// sequence titled by file name.
pub fn load_folder(folder: &Path) -> Result<FrameSequence> {
    if !folder.is_dir() {
        return Err(CodedError::resource(
            SOURCE_NOT_FOUND,
            format!("source folder '{}' does not exist", folder.display()),
        )
        .into());
    }

    let pattern = folder.join("*").to_string_lossy().into_owned();
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)
        .with_context(|| format!("invalid folder pattern '{pattern}'"))?
    {
        let path = entry.context("unreadable directory entry")?;
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        } else {
            debug!("skipping non-image entry '{}'", path.display());
        }
    }
    if paths.is_empty() {
        return Err(CodedError::resource(
            SOURCE_EMPTY,
            format!("no image files in folder '{}'", folder.display()),
        )
        .into());
    }

    let mut frames = Vec::with_capacity(paths.len());
    let mut titles = Vec::with_capacity(paths.len());
    for path in &paths {
        let image = image::open(path)
            .with_context(|| format!("failed to decode '{}'", path.display()))?;
        frames.push(FrameBuf::from_dynamic(image)?);
        titles.push(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        );
    }

    info!("loaded {} frames from '{}'", frames.len(), folder.display());
    FrameSequence::new(frames, titles)
}

/// Decode a multi-frame stack file into one sequence with synthetic
/// `"<path> frame N"` titles.
pub fn load_stack(path: &Path) -> Result<FrameSequence> {
    if !path.is_file() {
        return Err(CodedError::resource(
            SOURCE_NOT_FOUND,
            format!("stack file '{}' does not exist", path.display()),
        )
        .into());
    }

    let is_gif = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gif"))
        .unwrap_or(false);
    let frames = if is_gif {
        decode_gif_frames(path)?
    } else {
        decode_ffmpeg_frames(path)?
    };
    if frames.is_empty() {
        return Err(CodedError::resource(
            SOURCE_EMPTY,
            format!("stack '{}' holds no frames", path.display()),
        )
        .into());
    }

    let titles = (0..frames.len())
        .map(|index| format!("{} frame {}", path.display(), index))
        .collect();
    info!("loaded {} frames from stack '{}'", frames.len(), path.display());
    FrameSequence::new(frames, titles)
}

fn decode_gif_frames(path: &Path) -> Result<Vec<FrameBuf>> {
    let file =
        File::open(path).with_context(|| format!("failed to open '{}'", path.display()))?;
    let decoder = GifDecoder::new(BufReader::new(file))
        .with_context(|| format!("failed to read gif header of '{}'", path.display()))?;

    let mut frames = Vec::new();
    for frame in decoder.into_frames() {
        let frame =
            frame.with_context(|| format!("failed to decode gif frame of '{}'", path.display()))?;
        frames.push(FrameBuf::from_dynamic(DynamicImage::ImageRgba8(
            frame.into_buffer(),
        ))?);
    }
    Ok(frames)
}

fn decode_ffmpeg_frames(path: &Path) -> Result<Vec<FrameBuf>> {
    let (width, height) = probe_stack(path)?;
    let pipe = FfmpegFrames::spawn(path, width, height)?;

    let mut frames = Vec::new();
    while let Some(raw) = pipe.read_frame() {
        let buffer = image::RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| anyhow!("ffmpeg emitted a truncated frame"))?;
        frames.push(FrameBuf::from_dynamic(DynamicImage::ImageRgba8(buffer))?);
    }
    pipe.finish()?;
    Ok(frames)
}

/// Video stream dimensions via ffprobe's JSON output.
fn probe_stack(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height")
        .arg("-print_format")
        .arg("json")
        .arg(path)
        .output()
        .context("failed to run ffprobe (is ffmpeg installed?)")?;
    if !output.status.success() {
        bail!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let probe: serde_json::Value =
        serde_json::from_slice(&output.stdout).context("ffprobe emitted invalid json")?;
    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| anyhow!("'{}' has no video stream", path.display()))?;
    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| anyhow!("ffprobe reported no width for '{}'", path.display()))?;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| anyhow!("ffprobe reported no height for '{}'", path.display()))?;
    Ok((u32::try_from(width)?, u32::try_from(height)?))
}

/// Streaming RGBA frames out of an ffmpeg child process.
struct FfmpegFrames {
    receiver: mpsc::Receiver<Vec<u8>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Child,
}

impl FfmpegFrames {
    fn spawn(input_path: &Path, width: u32, height: u32) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input_path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn ffmpeg decoder")?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;
        let frame_size = width as usize * height as usize * 4;

        let worker = thread::Builder::new()
            .name("montage-ffmpeg-decoder".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stdout.read_exact(&mut buffer) {
                        Ok(_) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            receiver,
            worker: Some(worker),
            child,
        })
    }

    fn read_frame(&self) -> Option<Vec<u8>> {
        self.receiver.recv().ok()
    }

    fn finish(mut self) -> Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();

        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("ffmpeg reader thread panicked")),
            }
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuf::PixelKind;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, RgbaImage};

    fn write_gray_png(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
        let image = image::GrayImage::from_pixel(width, height, image::Luma([value]));
        image.save(dir.join(name)).expect("fixture png should save");
    }

    #[test]
    fn folder_frames_load_in_alphabetical_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_gray_png(dir.path(), "c.png", 4, 4, 30);
        write_gray_png(dir.path(), "a.png", 4, 4, 10);
        write_gray_png(dir.path(), "b.png", 4, 4, 20);

        let sequence = load_folder(dir.path()).expect("folder should load");
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.title(0), "a.png");
        assert_eq!(sequence.title(2), "c.png");
        assert_eq!(sequence.treated(1).sample(0, 0, 0), 20);
        assert_eq!(sequence.kind(), PixelKind::Gray8);
    }

    #[test]
    fn non_image_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_gray_png(dir.path(), "a.png", 4, 4, 10);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").expect("fixture");

        let sequence = load_folder(dir.path()).expect("folder should load");
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn empty_folder_is_a_resource_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = load_folder(dir.path()).expect_err("nothing to load");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, SOURCE_EMPTY);
    }

    #[test]
    fn missing_folder_is_a_resource_error() {
        let error = load_folder(Path::new("/definitely/not/here")).expect_err("missing folder");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, SOURCE_NOT_FOUND);
    }

    #[test]
    fn mixed_frame_sizes_in_a_folder_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_gray_png(dir.path(), "a.png", 4, 4, 10);
        write_gray_png(dir.path(), "b.png", 6, 4, 20);

        let error = load_folder(dir.path()).expect_err("shapes differ");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, crate::error_codes::FRAME_SHAPE_MISMATCH);
    }

    #[test]
    fn gif_stack_gets_synthetic_frame_titles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stack.gif");

        let file = File::create(&path).expect("gif file");
        let mut encoder = GifEncoder::new(file);
        for value in [0u8, 128, 255] {
            let frame = RgbaImage::from_pixel(5, 3, image::Rgba([value, value, value, 255]));
            encoder
                .encode_frame(Frame::new(frame))
                .expect("gif frame should encode");
        }
        drop(encoder);

        let sequence = load_stack(&path).expect("gif stack should load");
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.kind(), PixelKind::Rgba8);
        assert_eq!(
            sequence.title(1),
            format!("{} frame 1", path.display())
        );
    }

    #[test]
    fn missing_stack_is_a_resource_error() {
        let error = load_stack(Path::new("/no/such/stack.gif")).expect_err("missing stack");
        let coded = crate::error_codes::find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, SOURCE_NOT_FOUND);
    }
}
