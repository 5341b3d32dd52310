use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use crate::{PlaylistError, PlaylistEvent, PlaylistItem};

/// Always present, cannot be deleted.
pub const DEFAULT_COLLECTION: &str = "default";
pub const PLAYLIST_EXTENSION: &str = "playlist";
const EVENT_CAPACITY: usize = 64;

/// Named, ordered collections of playable items, one `<name>.playlist` JSON
/// file per collection.
///
/// Memory is authoritative: every mutation is written through to disk, and a
/// failed write is logged without undoing the mutation. Mutations take
/// `&mut self`; callers sharing a store across tasks serialize access
/// themselves (e.g. `Arc<RwLock<PlaylistStore>>`).
pub struct PlaylistStore {
    dir: PathBuf,
    collections: BTreeMap<String, Vec<PlaylistItem>>,
    active: String,
    event_channel: broadcast::Sender<PlaylistEvent>,
}

impl PlaylistStore {
    /// Loads every collection file found in `dir`, creating the directory if
    /// needed. Unreadable files load as empty collections and are left on disk
    /// untouched until that collection is next mutated.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let (event_channel, _) = broadcast::channel(EVENT_CAPACITY);
        let mut store = Self {
            dir: dir.into(),
            collections: BTreeMap::from([(DEFAULT_COLLECTION.to_string(), Vec::new())]),
            active: DEFAULT_COLLECTION.to_string(),
            event_channel,
        };
        store.load_all();
        store
    }

    fn load_all(&mut self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Err(e) = std::fs::create_dir_all(&self.dir) {
                    log::error!("Failed to create playlist dir {}: {}", self.dir.display(), e);
                }
                return;
            }
            Err(e) => {
                log::error!("Failed to read playlist dir {}: {}", self.dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PLAYLIST_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                log::warn!("Skipping playlist file with non UTF-8 name: {}", path.display());
                continue;
            };
            if validate_name(name).is_err() {
                log::warn!("Skipping playlist file {}", path.display());
                continue;
            }

            let items = load_items(&path);
            log::debug!("Loaded playlist {} with {} items", name, items.len());
            self.collections.insert(name.to_string(), items);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{PLAYLIST_EXTENSION}"))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.event_channel.subscribe()
    }

    pub fn active_collection(&self) -> &str {
        &self.active
    }

    /// Collection names in sorted order.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn create_collection(&mut self, name: &str) -> Result<(), PlaylistError> {
        validate_name(name)?;
        if self.collections.contains_key(name) {
            return Err(PlaylistError::AlreadyExists {
                name: name.to_string(),
            });
        }

        self.collections.insert(name.to_string(), Vec::new());
        self.persist(name);
        self.emit(PlaylistEvent::CollectionChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn delete_collection(&mut self, name: &str) -> Result<(), PlaylistError> {
        if name == DEFAULT_COLLECTION {
            return Err(PlaylistError::Protected {
                name: name.to_string(),
            });
        }
        if !self.collections.contains_key(name) {
            return Err(PlaylistError::NotFound {
                name: name.to_string(),
            });
        }

        // A file left behind would bring the collection back on next load
        let path = self.path_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                log::error!("Failed to delete playlist file {}: {}", path.display(), source);
                return Err(PlaylistError::PersistenceFailed {
                    path: path.display().to_string(),
                    source,
                });
            }
        }

        self.collections.remove(name);
        if self.active == name {
            self.active = DEFAULT_COLLECTION.to_string();
        }

        self.emit(PlaylistEvent::CollectionChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Appends to `name` (or the active collection) and returns the new index.
    pub fn add_item(
        &mut self,
        name: Option<&str>,
        item: PlaylistItem,
    ) -> Result<usize, PlaylistError> {
        item.validate().map_err(PlaylistError::InvalidItem)?;
        let name = self.resolve(name);
        let items = self.items_mut(&name)?;
        items.push(item);
        let index = items.len() - 1;

        self.persist(&name);
        self.emit(PlaylistEvent::ItemAdded { name, index });
        Ok(index)
    }

    /// Returns `Ok(false)` without changes when `index` is out of range.
    pub fn remove_item(&mut self, name: Option<&str>, index: usize) -> Result<bool, PlaylistError> {
        let name = self.resolve(name);
        let items = self.items_mut(&name)?;
        if index >= items.len() {
            return Ok(false);
        }
        items.remove(index);

        self.persist(&name);
        self.emit(PlaylistEvent::ItemRemoved { name, index });
        Ok(true)
    }

    /// Removes the item at `old_index`, then inserts it at `new_index` of the
    /// shortened list. Both indices are checked against the current length;
    /// `Ok(false)` means nothing moved.
    pub fn move_item(
        &mut self,
        name: Option<&str>,
        old_index: usize,
        new_index: usize,
    ) -> Result<bool, PlaylistError> {
        let name = self.resolve(name);
        let items = self.items_mut(&name)?;
        if old_index >= items.len() || new_index >= items.len() {
            return Ok(false);
        }
        let item = items.remove(old_index);
        items.insert(new_index, item);

        self.persist(&name);
        self.emit(PlaylistEvent::ItemMoved {
            name,
            from: old_index,
            to: new_index,
        });
        Ok(true)
    }

    pub fn get_item(
        &self,
        name: Option<&str>,
        index: usize,
    ) -> Result<Option<PlaylistItem>, PlaylistError> {
        Ok(self.items(name)?.get(index).cloned())
    }

    /// A copy of the collection; changing it does not touch the store.
    pub fn get_items(&self, name: Option<&str>) -> Result<Vec<PlaylistItem>, PlaylistError> {
        Ok(self.items(name)?.to_vec())
    }

    pub fn len(&self, name: Option<&str>) -> Result<usize, PlaylistError> {
        Ok(self.items(name)?.len())
    }

    pub fn is_empty(&self, name: Option<&str>) -> Result<bool, PlaylistError> {
        Ok(self.items(name)?.is_empty())
    }

    pub fn set_active_collection(&mut self, name: &str) -> bool {
        if !self.collections.contains_key(name) {
            return false;
        }
        self.active = name.to_string();
        self.emit(PlaylistEvent::ActiveChanged {
            name: name.to_string(),
        });
        true
    }

    pub fn clear_collection(&mut self, name: Option<&str>) -> Result<(), PlaylistError> {
        let name = self.resolve(name);
        self.items_mut(&name)?.clear();

        self.persist(&name);
        self.emit(PlaylistEvent::CollectionChanged { name });
        Ok(())
    }

    pub fn set_played(
        &mut self,
        name: Option<&str>,
        index: usize,
        played: bool,
    ) -> Result<bool, PlaylistError> {
        self.update_item(name, index, |item| item.played = played)
    }

    pub fn set_favorite(
        &mut self,
        name: Option<&str>,
        index: usize,
        favorite: bool,
    ) -> Result<bool, PlaylistError> {
        self.update_item(name, index, |item| item.favorite = favorite)
    }

    fn update_item<F>(
        &mut self,
        name: Option<&str>,
        index: usize,
        update: F,
    ) -> Result<bool, PlaylistError>
    where
        F: FnOnce(&mut PlaylistItem),
    {
        let name = self.resolve(name);
        let Some(item) = self.items_mut(&name)?.get_mut(index) else {
            return Ok(false);
        };
        update(item);

        self.persist(&name);
        self.emit(PlaylistEvent::ItemUpdated { name, index });
        Ok(true)
    }

    /// Writes `name` to disk now and reports the outcome.
    pub fn flush(&self, name: &str) -> Result<(), PlaylistError> {
        let items = self
            .collections
            .get(name)
            .ok_or_else(|| PlaylistError::NotFound {
                name: name.to_string(),
            })?;

        let content = serde_json::to_string_pretty(items)?;
        let path = self.path_for(name);
        let persistence_failed = |source| PlaylistError::PersistenceFailed {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(persistence_failed)?;
        std::fs::write(&path, content).map_err(persistence_failed)?;
        Ok(())
    }

    fn persist(&self, name: &str) {
        if let Err(e) = self.flush(name) {
            log::error!("Failed to save playlist {}: {}", name, e);
        }
    }

    fn resolve(&self, name: Option<&str>) -> String {
        name.unwrap_or(&self.active).to_string()
    }

    fn items(&self, name: Option<&str>) -> Result<&Vec<PlaylistItem>, PlaylistError> {
        let name = name.unwrap_or(&self.active);
        self.collections
            .get(name)
            .ok_or_else(|| PlaylistError::NotFound {
                name: name.to_string(),
            })
    }

    fn items_mut(&mut self, name: &str) -> Result<&mut Vec<PlaylistItem>, PlaylistError> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| PlaylistError::NotFound {
                name: name.to_string(),
            })
    }

    fn emit(&self, event: PlaylistEvent) {
        // No subscribers is fine
        let _ = self.event_channel.send(event);
    }
}

fn load_items(path: &Path) -> Vec<PlaylistItem> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::error!("Failed to read playlist {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(items) => items,
        Err(e) => {
            log::error!("Failed to parse playlist {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Names become file names, so they cannot contain path components.
fn validate_name(name: &str) -> Result<(), PlaylistError> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(PlaylistError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
