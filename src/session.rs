use crate::{
    compress::decode_data_url,
    core::ImageSlot,
    error::GiftboxResult,
    resolve::{ImageDescriptor, asset_path},
    store::{BlobCache, SessionStore},
};

/// Session key under which the handoff record is stored.
pub const SESSION_KEY: &str = "giftPreviewData";

pub const DEFAULT_GIVER_NAME: &str = "テレーズ";
pub const DEFAULT_RECEIVER_NAME: &str = "ヘクター";
pub const DEFAULT_AUTHOR_LABEL: &str = "未入力";

/// Fixed arity per line group; empty slots are valid and render as nothing.
pub const GIVER_LINES: usize = 6;
pub const SENDER_REACTION_LINES: usize = 3;
pub const RECEIVER_LINES: usize = 6;
pub const REACTION_LINES: usize = 3;

/// The handoff record written by the editor and read by the playback engine.
/// Written once at submission; read-only during playback.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresentationData {
    pub giver_name: String,
    pub giver_image: String,
    pub giver_image_path: String,
    pub giver_image_data: String,
    pub skip_giver_image: bool,

    pub receiver_name: String,
    pub receiver_image: String,
    pub receiver_image_path: String,
    pub receiver_image_data: String,
    pub skip_receiver_image: bool,

    pub gift_image: String,
    pub gift_image_path: String,
    pub gift_image_data: String,
    pub skip_gift_image: bool,

    pub author_name: String,
    pub gift_type: String,

    pub giver_lines: Vec<String>,
    pub sender_reaction_lines: Vec<String>,
    pub receiver_lines: Vec<String>,
    pub reaction_lines: Vec<String>,
}

impl PresentationData {
    /// Reads the handoff record. A missing record, a storage failure, or
    /// malformed JSON all count as "no prior state".
    pub fn load(store: &dyn SessionStore) -> Option<Self> {
        let text = match store.get_item(SESSION_KEY) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "session read failed, starting fresh");
                return None;
            }
        };
        match serde_json::from_str::<Self>(&text) {
            Ok(mut data) => {
                data.normalize_lines();
                Some(data)
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed session record");
                None
            }
        }
    }

    pub fn save(&self, store: &mut dyn SessionStore) -> GiftboxResult<()> {
        let text = serde_json::to_string(self)
            .map_err(|e| crate::error::GiftboxError::serde(e.to_string()))?;
        store.set_item(SESSION_KEY, &text)
    }

    /// Pads or truncates every line group to its fixed arity.
    pub fn normalize_lines(&mut self) {
        self.giver_lines.resize(GIVER_LINES, String::new());
        self.sender_reaction_lines
            .resize(SENDER_REACTION_LINES, String::new());
        self.receiver_lines.resize(RECEIVER_LINES, String::new());
        self.reaction_lines.resize(REACTION_LINES, String::new());
    }

    pub fn descriptor(&self, slot: ImageSlot) -> ImageDescriptor {
        match slot {
            ImageSlot::Giver => ImageDescriptor::from_fields(
                &self.giver_image_data,
                &self.giver_image_path,
                &self.giver_image,
            ),
            ImageSlot::Receiver => ImageDescriptor::from_fields(
                &self.receiver_image_data,
                &self.receiver_image_path,
                &self.receiver_image,
            ),
            ImageSlot::Gift => ImageDescriptor::from_fields(
                &self.gift_image_data,
                &self.gift_image_path,
                &self.gift_image,
            ),
        }
    }

    pub fn skip(&self, slot: ImageSlot) -> bool {
        match slot {
            ImageSlot::Giver => self.skip_giver_image,
            ImageSlot::Receiver => self.skip_receiver_image,
            ImageSlot::Gift => self.skip_gift_image,
        }
    }
}

/// Raw per-slot input at submission time: the picked file's name and, when
/// one was actually selected, its bytes.
#[derive(Clone, Debug, Default)]
pub struct SlotUpload {
    pub file_name: String,
    pub bytes: Option<Vec<u8>>,
}

/// Raw field values collected by the (external) form layer.
#[derive(Clone, Debug, Default)]
pub struct SubmissionForm {
    pub giver_name: String,
    pub receiver_name: String,
    pub author_name: String,
    pub gift_type: String,
    pub giver_upload: SlotUpload,
    pub receiver_upload: SlotUpload,
    pub gift_upload: SlotUpload,
    pub skip_giver_image: bool,
    pub skip_receiver_image: bool,
    pub skip_gift_image: bool,
    pub giver_lines: Vec<String>,
    pub sender_reaction_lines: Vec<String>,
    pub receiver_lines: Vec<String>,
    pub reaction_lines: Vec<String>,
}

/// Builds the handoff record from raw form values, syncs the blob cache, and
/// writes the record to the session store.
///
/// Per slot the cache follows the submission state: a cropped data URL beats
/// the raw upload, a raw upload beats nothing, and an empty slot deletes the
/// cached blob. Storage failures degrade silently; the record write itself
/// is reported.
pub fn submit(
    form: &SubmissionForm,
    session: &mut dyn SessionStore,
    cache: &mut dyn BlobCache,
) -> GiftboxResult<PresentationData> {
    let mut data = PresentationData {
        giver_name: form.giver_name.trim().to_string(),
        receiver_name: form.receiver_name.trim().to_string(),
        author_name: form.author_name.trim().to_string(),
        gift_type: form.gift_type.clone(),
        skip_giver_image: form.skip_giver_image,
        skip_receiver_image: form.skip_receiver_image,
        skip_gift_image: form.skip_gift_image,
        giver_lines: trimmed(&form.giver_lines),
        sender_reaction_lines: trimmed(&form.sender_reaction_lines),
        receiver_lines: trimmed(&form.receiver_lines),
        reaction_lines: trimmed(&form.reaction_lines),
        ..Default::default()
    };
    data.normalize_lines();

    for slot in ImageSlot::ALL {
        let upload = match slot {
            ImageSlot::Giver => &form.giver_upload,
            ImageSlot::Receiver => &form.receiver_upload,
            ImageSlot::Gift => &form.gift_upload,
        };
        let data_url = session
            .get_item(slot.data_key())
            .unwrap_or_default()
            .unwrap_or_default();
        let name = upload.file_name.clone();
        let path = asset_path(&name).unwrap_or_default();
        match slot {
            ImageSlot::Giver => {
                data.giver_image = name;
                data.giver_image_path = path;
                data.giver_image_data = data_url.clone();
            }
            ImageSlot::Receiver => {
                data.receiver_image = name;
                data.receiver_image_path = path;
                data.receiver_image_data = data_url.clone();
            }
            ImageSlot::Gift => {
                data.gift_image = name;
                data.gift_image_path = path;
                data.gift_image_data = data_url.clone();
            }
        }
        sync_slot_blob(slot, &data_url, upload, cache);
    }

    data.save(session)?;
    Ok(data)
}

fn sync_slot_blob(slot: ImageSlot, data_url: &str, upload: &SlotUpload, cache: &mut dyn BlobCache) {
    let outcome = if !data_url.is_empty() {
        match decode_data_url(data_url) {
            Ok(bytes) => cache.put(slot, bytes),
            Err(e) => {
                tracing::warn!(slot = slot.storage_key(), error = %e, "bad data url, leaving cache as-is");
                return;
            }
        }
    } else if let Some(bytes) = upload.bytes.as_ref().filter(|b| !b.is_empty()) {
        cache.put(slot, bytes.clone())
    } else {
        cache.delete(slot)
    };
    if let Err(e) = outcome {
        tracing::warn!(slot = slot.storage_key(), error = %e, "blob cache sync failed");
    }
}

/// Clears every stored trace of one image slot: the session data key, the
/// cached blob. Bound to the "skip this image" toggle.
pub fn clear_slot(slot: ImageSlot, session: &mut dyn SessionStore, cache: &mut dyn BlobCache) {
    if let Err(e) = session.remove_item(slot.data_key()) {
        tracing::warn!(slot = slot.storage_key(), error = %e, "session clear failed");
    }
    if let Err(e) = cache.delete(slot) {
        tracing::warn!(slot = slot.storage_key(), error = %e, "blob delete failed");
    }
}

fn trimmed(lines: &[String]) -> Vec<String> {
    lines.iter().map(|l| l.trim().to_string()).collect()
}
