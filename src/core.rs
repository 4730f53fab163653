use crate::error::{GiftboxError, GiftboxResult};

pub use kurbo::{Point, Rect, Vec2};

/// Milliseconds on the playback clock. The clock is owned by the caller
/// (interactive host or capture loop); the library never reads wall time.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Millis(pub u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    pub fn saturating_add(self, delta: u64) -> Millis {
        Millis(self.0.saturating_add(delta))
    }

    pub fn saturating_sub(self, other: Millis) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

/// Fixed-aspect pixel region: the crop frame, a crop output, or a capture canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> GiftboxResult<Self> {
        if width == 0 || height == 0 {
            return Err(GiftboxError::validation("viewport width/height must be > 0"));
        }
        Ok(Self { width, height })
    }

    pub fn aspect(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// The three persisted image slots of a presentation.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ImageSlot {
    Giver,
    Receiver,
    Gift,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 3] = [ImageSlot::Giver, ImageSlot::Receiver, ImageSlot::Gift];

    /// Logical key under which the slot's binary blob is cached.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Giver => "giverImage",
            Self::Receiver => "receiverImage",
            Self::Gift => "giftImage",
        }
    }

    /// Session key holding the slot's text-safe encoded form.
    pub fn data_key(self) -> &'static str {
        match self {
            Self::Giver => "giverImageData",
            Self::Receiver => "receiverImageData",
            Self::Gift => "giftImageData",
        }
    }

    /// Fixed raster size a committed crop produces for this slot.
    pub fn output_size(self) -> Viewport {
        match self {
            Self::Giver | Self::Receiver => Viewport {
                width: 800,
                height: 1000,
            },
            Self::Gift => Viewport {
                width: 900,
                height: 900,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_rejects_zero_axis() {
        assert!(Viewport::new(0, 10).is_err());
        assert!(Viewport::new(10, 0).is_err());
        assert!(Viewport::new(1, 1).is_ok());
    }

    #[test]
    fn slot_output_sizes_are_fixed() {
        assert_eq!(ImageSlot::Giver.output_size(), ImageSlot::Receiver.output_size());
        assert_eq!(ImageSlot::Gift.output_size().width, 900);
        assert_eq!(ImageSlot::Gift.output_size().height, 900);
        assert_eq!(ImageSlot::Giver.output_size().height, 1000);
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(Millis(5).saturating_sub(Millis(9)), 0);
        assert_eq!(Millis(u64::MAX).saturating_add(1), Millis(u64::MAX));
    }
}
