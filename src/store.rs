use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    core::ImageSlot,
    error::{GiftboxError, GiftboxResult},
};

/// Key→binary-object store holding the three cropped presentation images.
/// Injected into the editor and the playback engine rather than accessed
/// ambiently, so both sides stay independently testable.
pub trait BlobCache {
    fn get(&self, slot: ImageSlot) -> GiftboxResult<Option<Vec<u8>>>;
    fn put(&mut self, slot: ImageSlot, bytes: Vec<u8>) -> GiftboxResult<()>;
    fn delete(&mut self, slot: ImageSlot) -> GiftboxResult<()>;
}

/// Ephemeral cross-page string key/value state: a JSON handoff record plus
/// per-slot text-safe image data.
pub trait SessionStore {
    fn get_item(&self, key: &str) -> GiftboxResult<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> GiftboxResult<()>;
    fn remove_item(&mut self, key: &str) -> GiftboxResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryBlobCache {
    blobs: HashMap<ImageSlot, Vec<u8>>,
}

impl MemoryBlobCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobCache for MemoryBlobCache {
    fn get(&self, slot: ImageSlot) -> GiftboxResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(&slot).cloned())
    }

    fn put(&mut self, slot: ImageSlot, bytes: Vec<u8>) -> GiftboxResult<()> {
        self.blobs.insert(slot, bytes);
        Ok(())
    }

    fn delete(&mut self, slot: ImageSlot) -> GiftboxResult<()> {
        self.blobs.remove(&slot);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    items: HashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get_item(&self, key: &str) -> GiftboxResult<Option<String>> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> GiftboxResult<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> GiftboxResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Blob cache persisted as one file per slot under a directory, used by the
/// headless CLI so a crop run and a later capture run share images.
#[derive(Debug)]
pub struct FsBlobCache {
    root: PathBuf,
}

impl FsBlobCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn slot_path(&self, slot: ImageSlot) -> PathBuf {
        self.root.join(format!("{}.bin", slot.storage_key()))
    }
}

impl BlobCache for FsBlobCache {
    fn get(&self, slot: ImageSlot) -> GiftboxResult<Option<Vec<u8>>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| GiftboxError::storage(format!("read '{}': {e}", path.display())))?;
        Ok(Some(bytes))
    }

    fn put(&mut self, slot: ImageSlot, bytes: Vec<u8>) -> GiftboxResult<()> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create blob dir '{}'", self.root.display()))?;
        let path = self.slot_path(slot);
        std::fs::write(&path, bytes)
            .map_err(|e| GiftboxError::storage(format!("write '{}': {e}", path.display())))
    }

    fn delete(&mut self, slot: ImageSlot) -> GiftboxResult<()> {
        let path = self.slot_path(slot);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GiftboxError::storage(format!(
                "delete '{}': {e}",
                path.display()
            ))),
        }
    }
}

/// Session store persisted as a single JSON object of string pairs.
#[derive(Debug)]
pub struct FsSessionStore {
    path: PathBuf,
}

impl FsSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> GiftboxResult<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| GiftboxError::storage(format!("read '{}': {e}", self.path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| GiftboxError::serde(format!("session file is not a string map: {e}")))
    }

    fn save(&self, items: &HashMap<String, String>) -> GiftboxResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create session dir '{}'", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(items)
            .map_err(|e| GiftboxError::serde(format!("serialize session map: {e}")))?;
        std::fs::write(&self.path, text)
            .map_err(|e| GiftboxError::storage(format!("write '{}': {e}", self.path.display())))
    }
}

impl SessionStore for FsSessionStore {
    fn get_item(&self, key: &str) -> GiftboxResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> GiftboxResult<()> {
        let mut items = self.load().unwrap_or_default();
        items.insert(key.to_string(), value.to_string());
        self.save(&items)
    }

    fn remove_item(&mut self, key: &str) -> GiftboxResult<()> {
        let mut items = self.load().unwrap_or_default();
        items.remove(key);
        self.save(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_blob_cache_roundtrip() {
        let mut cache = MemoryBlobCache::new();
        assert!(cache.get(ImageSlot::Gift).unwrap().is_none());
        cache.put(ImageSlot::Gift, vec![9, 9]).unwrap();
        assert_eq!(cache.get(ImageSlot::Gift).unwrap().unwrap(), vec![9, 9]);
        cache.delete(ImageSlot::Gift).unwrap();
        assert!(cache.get(ImageSlot::Gift).unwrap().is_none());
    }

    #[test]
    fn fs_session_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!(
            "giftbox_session_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let mut store = FsSessionStore::new(dir.join("session.json"));
        assert!(store.get_item("k").unwrap().is_none());
        store.set_item("k", "v").unwrap();
        assert_eq!(store.get_item("k").unwrap().unwrap(), "v");
        store.remove_item("k").unwrap();
        assert!(store.get_item("k").unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fs_blob_cache_delete_is_idempotent() {
        let dir = std::env::temp_dir().join(format!(
            "giftbox_blobs_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let mut cache = FsBlobCache::new(&dir);
        cache.delete(ImageSlot::Giver).unwrap();
        cache.put(ImageSlot::Giver, vec![1]).unwrap();
        assert_eq!(cache.get(ImageSlot::Giver).unwrap().unwrap(), vec![1]);
        cache.delete(ImageSlot::Giver).unwrap();
        assert!(cache.get(ImageSlot::Giver).unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
