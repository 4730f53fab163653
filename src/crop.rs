use std::sync::Arc;

use image::RgbaImage;
use kurbo::{Rect, Vec2};

use crate::{
    compress::{EncodeKind, EncodedBlob, compress},
    core::{ImageSlot, Viewport},
    error::{GiftboxError, GiftboxResult},
    resolve::DisplayRef,
    store::{BlobCache, SessionStore},
    surface::Surface,
};

/// Byte ceiling for a committed crop.
pub const CROP_MAX_BYTES: usize = 1024 * 1024;

/// Interactive crop editor: a uniform scale plus translation applied to a
/// source image inside a fixed-aspect frame. Created when a crop opens,
/// dropped on cancel, consumed on apply.
#[derive(Clone, Debug)]
pub struct CropSession {
    slot: ImageSlot,
    source: RgbaImage,
    frame: Viewport,
    scale: f64,
    offset: Vec2,
    /// Pointer anchor while a drag is active: pointer position minus the
    /// offset at drag start.
    drag: Option<Vec2>,
}

/// Result of a committed crop: the encoded blob, its text-safe form, and the
/// refreshed preview reference. All three session-visible writes have already
/// happened by the time this is returned.
#[derive(Clone, Debug)]
pub struct CropCommit {
    pub blob: EncodedBlob,
    pub data_url: String,
    pub preview: DisplayRef,
}

impl CropSession {
    /// Opens a crop session with the frame sized to the slot's output raster.
    pub fn open(slot: ImageSlot, source: RgbaImage) -> GiftboxResult<Self> {
        let frame = slot.output_size();
        Self::open_with_frame(slot, source, frame)
    }

    /// Opens a crop session against an arbitrary on-screen frame. The initial
    /// scale is the cover-fit floor: the smallest uniform scale at which the
    /// image fully covers the frame.
    pub fn open_with_frame(
        slot: ImageSlot,
        source: RgbaImage,
        frame: Viewport,
    ) -> GiftboxResult<Self> {
        if source.width() == 0 || source.height() == 0 {
            return Err(GiftboxError::validation("crop source image is empty"));
        }
        let scale = cover_fit_scale(frame, source.width(), source.height());
        Ok(Self {
            slot,
            source,
            frame,
            scale,
            offset: Vec2::ZERO,
            drag: None,
        })
    }

    pub fn slot(&self) -> ImageSlot {
        self.slot
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn drag_start(&mut self, pointer: Vec2) {
        self.drag = Some(pointer - self.offset);
    }

    /// Pans by the pointer delta from the drag anchor. Deliberately
    /// unconstrained: the image may leave the frame entirely.
    pub fn drag_move(&mut self, pointer: Vec2) {
        if let Some(anchor) = self.drag {
            self.offset = pointer - anchor;
        }
    }

    pub fn drag_end(&mut self) {
        self.drag = None;
    }

    /// Sets the scale directly from the zoom control. No floor is applied,
    /// so zooming below cover-fit can expose background.
    pub fn set_zoom(&mut self, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.scale = value;
        }
    }

    /// Discards the session without side effects.
    pub fn cancel(self) {
        tracing::debug!(slot = self.slot.storage_key(), "crop cancelled");
    }

    /// Rasterizes the current transform into the slot's fixed output size.
    /// Portraits get a black letterbox fill first; the gift raster keeps its
    /// transparency.
    pub fn rasterize(&self) -> GiftboxResult<Surface> {
        let out = self.slot.output_size();
        let mut surface = match self.slot {
            ImageSlot::Giver | ImageSlot::Receiver => Surface::solid(out.width, out.height, [0, 0, 0])?,
            ImageSlot::Gift => Surface::new(out.width, out.height)?,
        };

        // Image placement in frame space, then frame→output scaling per axis.
        let img_w = f64::from(self.source.width()) * self.scale;
        let img_h = f64::from(self.source.height()) * self.scale;
        let image_x = f64::from(self.frame.width) / 2.0 - img_w / 2.0 + self.offset.x;
        let image_y = f64::from(self.frame.height) / 2.0 - img_h / 2.0 + self.offset.y;
        let rx = f64::from(out.width) / f64::from(self.frame.width);
        let ry = f64::from(out.height) / f64::from(self.frame.height);

        let dst = Rect::new(
            image_x * rx,
            image_y * ry,
            (image_x + img_w) * rx,
            (image_y + img_h) * ry,
        );
        surface.draw_image_scaled(&self.source, dst);
        Ok(surface)
    }

    fn encode_kind(&self) -> EncodeKind {
        match self.slot {
            ImageSlot::Gift => EncodeKind::Png,
            _ => EncodeKind::Jpeg,
        }
    }

    /// Rasterizes, compresses to the byte budget, and performs the three
    /// commit writes (binary cache, text-safe session form, preview) as one
    /// effective transaction. If the encoder cannot produce output, none of
    /// the writes happen and `None` is returned.
    #[tracing::instrument(skip(self, cache, session), fields(slot = self.slot.storage_key()))]
    pub fn commit(
        self,
        cache: &mut dyn BlobCache,
        session: &mut dyn SessionStore,
    ) -> GiftboxResult<Option<CropCommit>> {
        let surface = self.rasterize()?;
        let blob = match compress(&surface, self.encode_kind(), CROP_MAX_BYTES) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "encoder produced no output, nothing saved");
                return Ok(None);
            }
        };

        let data_url = blob.to_data_url();
        if let Err(e) = cache.put(self.slot, blob.bytes.clone()) {
            tracing::warn!(error = %e, "blob cache write failed");
        }
        if let Err(e) = session.set_item(self.slot.data_key(), &data_url) {
            tracing::warn!(error = %e, "session write failed");
        }

        let preview = DisplayRef::Data(Arc::from(data_url.as_str()));
        Ok(Some(CropCommit {
            blob,
            data_url,
            preview,
        }))
    }
}

/// Minimum uniform scale at which a `src_w`×`src_h` image fully covers the frame.
pub fn cover_fit_scale(frame: Viewport, src_w: u32, src_h: u32) -> f64 {
    let sx = f64::from(frame.width) / f64::from(src_w);
    let sy = f64::from(frame.height) / f64::from(src_h);
    sx.max(sy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBlobCache, MemorySessionStore};

    fn source(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba([120, 130, 140, 255]))
    }

    #[test]
    fn open_sets_cover_fit_floor() {
        let session = CropSession::open(ImageSlot::Giver, source(400, 300)).unwrap();
        // max(800/400, 1000/300)
        assert!((session.scale() - 1000.0 / 300.0).abs() < 1e-12);
        assert_eq!(session.offset(), Vec2::ZERO);

        let square = CropSession::open(ImageSlot::Gift, source(300, 450)).unwrap();
        // max(900/300, 900/450) = 3
        assert_eq!(square.scale(), 3.0);
    }

    #[test]
    fn cover_fit_equal_ratios() {
        let frame = Viewport::new(800, 1000).unwrap();
        assert_eq!(cover_fit_scale(frame, 400, 500), 2.0);
    }

    #[test]
    fn drag_is_unconstrained() {
        let mut s = CropSession::open(ImageSlot::Giver, source(100, 100)).unwrap();
        s.drag_start(Vec2::new(10.0, 10.0));
        s.drag_move(Vec2::new(-5000.0, 9000.0));
        assert_eq!(s.offset(), Vec2::new(-5010.0, 8990.0));
        s.drag_end();
        // Moves after the drag ended are ignored.
        s.drag_move(Vec2::new(0.0, 0.0));
        assert_eq!(s.offset(), Vec2::new(-5010.0, 8990.0));
    }

    #[test]
    fn zoom_below_cover_fit_is_permitted() {
        let mut s = CropSession::open(ImageSlot::Gift, source(900, 900)).unwrap();
        assert_eq!(s.scale(), 1.0);
        s.set_zoom(0.25);
        assert_eq!(s.scale(), 0.25);
        s.set_zoom(0.0);
        assert_eq!(s.scale(), 0.25);
        s.set_zoom(f64::NAN);
        assert_eq!(s.scale(), 0.25);
    }

    #[test]
    fn commit_writes_cache_session_and_preview() {
        let mut cache = MemoryBlobCache::new();
        let mut session = MemorySessionStore::new();
        let s = CropSession::open(ImageSlot::Receiver, source(400, 500)).unwrap();
        let commit = s.commit(&mut cache, &mut session).unwrap().unwrap();

        assert_eq!(commit.blob.kind, EncodeKind::Jpeg);
        assert!(commit.blob.len() <= CROP_MAX_BYTES);
        assert_eq!(
            cache.get(ImageSlot::Receiver).unwrap().unwrap(),
            commit.blob.bytes
        );
        let stored = session
            .get_item(ImageSlot::Receiver.data_key())
            .unwrap()
            .unwrap();
        assert_eq!(stored, commit.data_url);
        assert!(matches!(commit.preview, DisplayRef::Data(_)));
    }

    #[test]
    fn gift_commit_is_png() {
        let mut cache = MemoryBlobCache::new();
        let mut session = MemorySessionStore::new();
        let s = CropSession::open(ImageSlot::Gift, source(900, 900)).unwrap();
        let commit = s.commit(&mut cache, &mut session).unwrap().unwrap();
        assert_eq!(commit.blob.kind, EncodeKind::Png);
        assert!(commit.data_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn cancel_leaves_no_trace() {
        let cache = MemoryBlobCache::new();
        let s = CropSession::open(ImageSlot::Giver, source(10, 10)).unwrap();
        s.cancel();
        assert!(cache.get(ImageSlot::Giver).unwrap().is_none());
    }

    #[test]
    fn rasterize_centers_cover_fit_image() {
        let s = CropSession::open(ImageSlot::Gift, source(450, 900)).unwrap();
        // scale = max(900/450, 900/900) = 2; image fills the full 900x900 output.
        let surface = s.rasterize().unwrap();
        let img = surface.to_rgba_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0[3], 255);
        assert_eq!(img.get_pixel(899, 899).0[3], 255);
        assert_eq!(img.get_pixel(450, 450).0[0], 120);
    }
}
