use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use kurbo::Vec2;

#[derive(Parser, Debug)]
#[command(name = "giftbox", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crop and compress an image into one presentation slot (requires no display).
    Crop(CropArgs),
    /// Play the presentation offline and write MP4 + GIF (requires `ffmpeg` on PATH).
    Capture(CaptureArgs),
}

#[derive(Parser, Debug)]
struct CropArgs {
    /// Input image file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Which presentation slot the image fills.
    #[arg(long, value_enum)]
    slot: SlotChoice,

    /// Session key/value file updated with the text-safe form.
    #[arg(long)]
    session: PathBuf,

    /// Blob cache directory updated with the binary form.
    #[arg(long)]
    blobs: PathBuf,

    /// Zoom override; defaults to the cover-fit floor.
    #[arg(long)]
    zoom: Option<f64>,

    /// Horizontal pan in frame pixels.
    #[arg(long, default_value_t = 0.0)]
    offset_x: f64,

    /// Vertical pan in frame pixels.
    #[arg(long, default_value_t = 0.0)]
    offset_y: f64,
}

#[derive(Parser, Debug)]
struct CaptureArgs {
    /// Session key/value file holding the handoff record.
    #[arg(long)]
    session: Option<PathBuf>,

    /// Blob cache directory holding cropped images.
    #[arg(long)]
    blobs: Option<PathBuf>,

    /// Root directory under which bundled `assets/` paths resolve.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Output base path; `.mp4` and `.gif` are appended.
    #[arg(long)]
    out: PathBuf,

    /// Recording length in seconds.
    #[arg(long, default_value_t = giftbox::capture::DEFAULT_DURATION_SECS)]
    duration: f64,

    #[arg(long, default_value_t = giftbox::capture::DEFAULT_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = giftbox::capture::DEFAULT_HEIGHT)]
    height: u32,

    #[arg(long, default_value_t = giftbox::capture::DEFAULT_FPS)]
    fps: u32,

    /// Overwrite outputs if they already exist.
    #[arg(long, default_value_t = true)]
    overwrite: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SlotChoice {
    Giver,
    Receiver,
    Gift,
}

impl From<SlotChoice> for giftbox::ImageSlot {
    fn from(choice: SlotChoice) -> Self {
        match choice {
            SlotChoice::Giver => giftbox::ImageSlot::Giver,
            SlotChoice::Receiver => giftbox::ImageSlot::Receiver,
            SlotChoice::Gift => giftbox::ImageSlot::Gift,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Crop(args) => cmd_crop(args),
        Command::Capture(args) => cmd_capture(args),
    }
}

fn cmd_crop(args: CropArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read input image '{}'", args.in_path.display()))?;
    let source = image::load_from_memory(&bytes)
        .with_context(|| "decode input image")?
        .to_rgba8();

    let mut session = giftbox::CropSession::open(args.slot.into(), source)?;
    if let Some(zoom) = args.zoom {
        session.set_zoom(zoom);
    }
    if args.offset_x != 0.0 || args.offset_y != 0.0 {
        session.drag_start(Vec2::ZERO);
        session.drag_move(Vec2::new(args.offset_x, args.offset_y));
        session.drag_end();
    }

    let mut cache = giftbox::FsBlobCache::new(&args.blobs);
    let mut store = giftbox::FsSessionStore::new(&args.session);
    match session.commit(&mut cache, &mut store)? {
        Some(commit) => {
            eprintln!(
                "saved {} ({} bytes) to '{}' and '{}'",
                commit.blob.kind.mime(),
                commit.blob.len(),
                args.blobs.display(),
                args.session.display()
            );
            Ok(())
        }
        None => anyhow::bail!("encoder produced no output, nothing saved"),
    }
}

fn cmd_capture(args: CaptureArgs) -> anyhow::Result<()> {
    let cfg = giftbox::CaptureConfig {
        session_path: args.session,
        blob_dir: args.blobs,
        asset_root: args.assets,
        out_base: args.out,
        duration_secs: args.duration,
        width: args.width,
        height: args.height,
        fps: args.fps,
        overwrite: args.overwrite,
    };
    let report = giftbox::capture(&cfg)?;
    println!("MP4: {}", report.mp4_path.display());
    println!("GIF: {}", report.gif_path.display());
    Ok(())
}
