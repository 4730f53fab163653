#![forbid(unsafe_code)]

pub mod capture;
pub mod chat;
pub mod compress;
pub mod core;
pub mod crop;
pub mod error;
pub mod render_frame;
pub mod resolve;
pub mod session;
pub mod store;
pub mod surface;
pub mod timeline;

pub use capture::{CaptureConfig, CaptureReport, capture, is_ffmpeg_on_path};
pub use chat::{BubbleAlign, ChatBubble, ChatPlan, PanelKind};
pub use compress::{EncodeKind, EncodedBlob, compress, decode_data_url};
pub use core::{ImageSlot, Millis, Viewport};
pub use crop::{CropCommit, CropSession, cover_fit_scale};
pub use error::{GiftboxError, GiftboxResult};
pub use render_frame::{FrameAssets, render_stage};
pub use resolve::{DisplayRef, ImageDescriptor, resolve};
pub use session::{PresentationData, SlotUpload, SubmissionForm, submit};
pub use store::{
    BlobCache, FsBlobCache, FsSessionStore, MemoryBlobCache, MemorySessionStore, SessionStore,
};
pub use surface::Surface;
pub use timeline::{PlayState, Player, PresentationScript, Stage, StageView, TimerWheel};
