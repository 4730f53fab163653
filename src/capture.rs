use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    core::{Millis, Viewport},
    error::{GiftboxError, GiftboxResult},
    render_frame::{FrameAssets, render_stage},
    session::PresentationData,
    store::{FsBlobCache, FsSessionStore},
    surface::Surface,
    timeline::{Player, PresentationScript},
};

pub const DEFAULT_DURATION_SECS: f64 = 30.0;
pub const DEFAULT_WIDTH: u32 = 720;
pub const DEFAULT_HEIGHT: u32 = 1280;
pub const DEFAULT_FPS: u32 = 30;
const GIF_FPS: u32 = 15;

/// Offline capture run: plays the presentation on a deterministic clock and
/// transcodes the frames to `<out_base>.mp4` and `<out_base>.gif`.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Session key/value file holding the handoff record; absent means the
    /// default presentation.
    pub session_path: Option<PathBuf>,
    /// Blob cache directory holding cropped images.
    pub blob_dir: Option<PathBuf>,
    /// Root under which bundled `assets/` paths resolve.
    pub asset_root: Option<PathBuf>,
    pub out_base: PathBuf,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub overwrite: bool,
}

impl CaptureConfig {
    pub fn new(out_base: impl Into<PathBuf>) -> Self {
        Self {
            session_path: None,
            blob_dir: None,
            asset_root: None,
            out_base: out_base.into(),
            duration_secs: DEFAULT_DURATION_SECS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            overwrite: true,
        }
    }

    pub fn validate(&self) -> GiftboxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GiftboxError::validation(
                "capture width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(GiftboxError::validation(
                "capture width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if self.fps == 0 {
            return Err(GiftboxError::validation("capture fps must be non-zero"));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(GiftboxError::validation("capture duration must be > 0"));
        }
        Ok(())
    }

    pub fn mp4_path(&self) -> PathBuf {
        self.out_base.with_extension("mp4")
    }

    pub fn gif_path(&self) -> PathBuf {
        self.out_base.with_extension("gif")
    }
}

#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub mp4_path: PathBuf,
    pub gif_path: PathBuf,
    pub frames: u64,
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> GiftboxResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Plays the presentation and produces both output files. Fatal on any
/// transcode step failure; outputs the step already produced are left in
/// place.
#[tracing::instrument(skip(cfg), fields(out = %cfg.out_base.display()))]
pub fn capture(cfg: &CaptureConfig) -> GiftboxResult<CaptureReport> {
    cfg.validate()?;
    ensure_parent_dir(&cfg.mp4_path())?;

    let data = cfg.session_path.as_ref().and_then(|path| {
        let store = FsSessionStore::new(path);
        PresentationData::load(&store)
    });
    let cache = cfg.blob_dir.as_ref().map(FsBlobCache::new);
    let script = PresentationScript::from_session(
        data.as_ref(),
        cache.as_ref().map(|c| c as &dyn crate::store::BlobCache),
    );
    let assets = FrameAssets::prepare(&script, cfg.asset_root.as_deref());
    let canvas = Viewport::new(cfg.width, cfg.height)?;

    let mut player = Player::new(script);
    player.tap(Millis::ZERO);

    let mut encoder = FfmpegEncoder::new(cfg)?;
    let total_frames = (cfg.duration_secs * f64::from(cfg.fps)).ceil() as u64;
    for frame in 0..total_frames {
        let now = Millis(frame * 1000 / u64::from(cfg.fps));
        player.advance_to(now);
        let surface = render_stage(player.view(), player.script(), &assets, canvas, now)?;
        encoder.encode_frame(&surface)?;
    }
    encoder.finish()?;
    tracing::debug!(frames = total_frames, "mp4 written");

    transcode_gif(cfg)?;

    Ok(CaptureReport {
        mp4_path: cfg.mp4_path(),
        gif_path: cfg.gif_path(),
        frames: total_frames,
    })
}

/// Streams raw RGBA frames into a spawned system `ffmpeg` producing H.264
/// MP4. The system binary is used deliberately; linking FFmpeg would drag in
/// native dev headers for no gain.
struct FfmpegEncoder {
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    scratch: Vec<u8>,
}

impl FfmpegEncoder {
    fn new(cfg: &CaptureConfig) -> GiftboxResult<Self> {
        if !cfg.overwrite && cfg.mp4_path().exists() {
            return Err(GiftboxError::validation(format!(
                "output file '{}' already exists",
                cfg.mp4_path().display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(GiftboxError::capture(
                "ffmpeg is required for capture, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.arg(if cfg.overwrite { "-y" } else { "-n" });
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(cfg.mp4_path());

        let mut child = cmd.spawn().map_err(|e| {
            GiftboxError::capture(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GiftboxError::capture("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Self {
            scratch: vec![0u8; (cfg.width * cfg.height * 4) as usize],
            width: cfg.width,
            height: cfg.height,
            child,
            stdin: Some(stdin),
        })
    }

    fn encode_frame(&mut self, frame: &Surface) -> GiftboxResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(GiftboxError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        flatten_premul_over_black(&mut self.scratch, frame.data());

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(GiftboxError::capture("ffmpeg encoder is already finalized"));
        };
        use std::io::Write as _;
        stdin
            .write_all(&self.scratch)
            .map_err(|e| GiftboxError::capture(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    fn finish(mut self) -> GiftboxResult<()> {
        drop(self.stdin.take());
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| GiftboxError::capture(format!("failed to wait for ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GiftboxError::capture(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn transcode_gif(cfg: &CaptureConfig) -> GiftboxResult<()> {
    let output = Command::new("ffmpeg")
        .arg("-y")
        .args(["-loglevel", "error", "-i"])
        .arg(cfg.mp4_path())
        .args([
            "-vf",
            &format!(
                "fps={GIF_FPS},scale={}:{}:flags=lanczos",
                cfg.width, cfg.height
            ),
        ])
        .arg(cfg.gif_path())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| GiftboxError::capture(format!("failed to run ffmpeg for gif: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GiftboxError::capture(format!(
            "gif transcode exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Premultiplied source over an opaque black background, for the encoder.
fn flatten_premul_over_black(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        d[0] = s[0];
        d[1] = s[1];
        d[2] = s[2];
        d[3] = 255;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation_catches_bad_values() {
        let mut cfg = CaptureConfig::new("target/capture/out");
        cfg.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CaptureConfig::new("target/capture/out");
        cfg.height = 11;
        assert!(cfg.validate().is_err());

        let mut cfg = CaptureConfig::new("target/capture/out");
        cfg.fps = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = CaptureConfig::new("target/capture/out");
        cfg.duration_secs = 0.0;
        assert!(cfg.validate().is_err());

        assert!(CaptureConfig::new("target/capture/out").validate().is_ok());
    }

    #[test]
    fn output_paths_share_the_base() {
        let cfg = CaptureConfig::new("exports/preview");
        assert_eq!(cfg.mp4_path(), PathBuf::from("exports/preview.mp4"));
        assert_eq!(cfg.gif_path(), PathBuf::from("exports/preview.gif"));
    }

    #[test]
    fn flatten_forces_opaque_alpha() {
        let src = [10u8, 20, 30, 128];
        let mut dst = [0u8; 4];
        flatten_premul_over_black(&mut dst, &src);
        assert_eq!(dst, [10, 20, 30, 255]);
    }
}
