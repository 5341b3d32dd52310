#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaylistEvent {
    CollectionChanged {
        name: String,
    },
    ItemAdded {
        name: String,
        index: usize,
    },
    ItemRemoved {
        name: String,
        index: usize,
    },
    ItemMoved {
        name: String,
        from: usize,
        to: usize,
    },
    ItemUpdated {
        name: String,
        index: usize,
    },
    ActiveChanged {
        name: String,
    },
}

impl PlaylistEvent {
    /// The collection this event is about.
    pub fn collection(&self) -> &str {
        match self {
            PlaylistEvent::CollectionChanged { name }
            | PlaylistEvent::ItemAdded { name, .. }
            | PlaylistEvent::ItemRemoved { name, .. }
            | PlaylistEvent::ItemMoved { name, .. }
            | PlaylistEvent::ItemUpdated { name, .. }
            | PlaylistEvent::ActiveChanged { name } => name,
        }
    }
}
