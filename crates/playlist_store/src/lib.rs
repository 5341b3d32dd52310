pub mod events;
pub mod item;
pub mod store;

use thiserror::Error;

pub use events::PlaylistEvent;
pub use item::{Metadata, PlaylistItem};
pub use store::{PlaylistStore, DEFAULT_COLLECTION, PLAYLIST_EXTENSION};

#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Playlist not found: {name}")]
    NotFound { name: String },
    #[error("Playlist already exists: {name}")]
    AlreadyExists { name: String },
    #[error("Playlist is protected: {name}")]
    Protected { name: String },
    #[error("Invalid playlist name: {name:?}")]
    InvalidName { name: String },
    #[error("Invalid item: {0}")]
    InvalidItem(String),
    #[error("Persistence failed for {path}: {source}")]
    PersistenceFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
