use std::sync::Arc;

/// Root prefix under which bundled asset paths must live.
pub const ASSET_PREFIX: &str = "assets/";
/// Directory holding the bundled presentation images.
pub const ASSET_IMAGE_DIR: &str = "assets/images";

/// Closed set of bundled image names a descriptor may reference.
pub const KNOWN_IMAGES: [&str; 14] = [
    "chara_send.jpg",
    "chara_receive.jpg",
    "present1.png",
    "present2.png",
    "present3.png",
    "present4.png",
    "present5.png",
    "present6.png",
    "presentbox1_close.png",
    "presentbox1_open.png",
    "present_effect.png",
    "background_wait.jpg",
    "background_result.jpg",
    "heart.png",
];

pub const DEFAULT_GIVER_IMAGE: &str = "assets/images/chara_send.jpg";
pub const DEFAULT_RECEIVER_IMAGE: &str = "assets/images/chara_receive.jpg";
pub const WAIT_BACKGROUND: &str = "assets/images/background_wait.jpg";
pub const RESULT_BACKGROUND: &str = "assets/images/background_result.jpg";
pub const BOX_CLOSED_IMAGE: &str = "assets/images/presentbox1_close.png";
pub const BOX_OPEN_IMAGE: &str = "assets/images/presentbox1_open.png";

/// Identifies an image's source: explicit encoded bytes, a raw cached blob,
/// a bundled asset path, or a known asset name. At most one field is
/// authoritative at resolution time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Text-safe encoded image (data URL), highest priority.
    pub data: Option<Arc<str>>,
    /// Raw path; only honored when rooted under the asset prefix.
    pub path: Option<String>,
    /// Bare file name; only honored when it is a member of the known set.
    pub name: Option<String>,
}

impl ImageDescriptor {
    pub fn from_fields(data: &str, path: &str, name: &str) -> Self {
        Self {
            data: (!data.is_empty()).then(|| Arc::from(data)),
            path: (!path.is_empty()).then(|| path.to_string()),
            name: (!name.is_empty()).then(|| name.to_string()),
        }
    }
}

/// A resolved, displayable image reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DisplayRef {
    /// Inline encoded image (data URL).
    Data(Arc<str>),
    /// Raw blob restored from the cache.
    Bytes(Arc<Vec<u8>>),
    /// Path relative to the asset root.
    Path(String),
}

impl DisplayRef {
    pub fn path(p: impl Into<String>) -> Self {
        Self::Path(p.into())
    }
}

pub fn is_known_image(name: &str) -> bool {
    KNOWN_IMAGES.contains(&name)
}

/// Maps a known image name to its bundled path; unknown names resolve to nothing.
pub fn asset_path(name: &str) -> Option<String> {
    is_known_image(name).then(|| format!("{ASSET_IMAGE_DIR}/{name}"))
}

/// Pure descriptor resolution with priority explicit data > rooted path >
/// known name > fallback. Deterministic, no I/O.
pub fn resolve(descriptor: &ImageDescriptor, fallback: &str) -> DisplayRef {
    if let Some(data) = &descriptor.data {
        return DisplayRef::Data(data.clone());
    }
    if let Some(path) = &descriptor.path
        && path.starts_with(ASSET_PREFIX)
    {
        return DisplayRef::Path(path.clone());
    }
    if let Some(name) = &descriptor.name
        && let Some(path) = asset_path(name)
    {
        return DisplayRef::Path(path);
    }
    DisplayRef::Path(fallback.to_string())
}

/// Default gift image for a gift-type tag when no image was provided.
pub fn gift_fallback(gift_type: &str) -> &'static str {
    match gift_type {
        "type-a" => "assets/images/present1.png",
        "type-b" => "assets/images/present2.png",
        "type-c" => "assets/images/present3.png",
        "type-d" => "assets/images/present4.png",
        "type-e" => "assets/images/present5.png",
        "type-f" => "assets/images/present6.png",
        _ => "assets/images/present1.png",
    }
}
