//! Track library - catalog of generative and sampled items
//!
//! The library owns every loadable item. Decks never hold items
//! directly: they keep a [`SourceDescriptor`] (an item id) and resolve
//! it on demand, falling back to the first catalog entry when the id
//! has gone missing. Sampled items are append-only except for beatgrid
//! patching via import.

mod beatgrid;

pub use beatgrid::{parse_beatgrid, BeatgridError, BeatgridUpdate};

use std::sync::Arc;

use crate::types::AudioClip;

/// Library item identifier
pub type ItemId = u32;

/// What a deck points at: an item id resolved against the library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub item_id: ItemId,
}

impl SourceDescriptor {
    /// Create a descriptor for the given item
    pub fn new(item_id: ItemId) -> Self {
        Self { item_id }
    }
}

/// A generative catalog entry: evaluated by the pattern backend
#[derive(Debug, Clone)]
pub struct GenerativeItem {
    pub id: ItemId,
    pub name: String,
    /// Native tempo the program was written at
    pub bpm: f64,
    /// Base pattern program, extended by the expression compiler
    pub program: String,
}

/// A sampled catalog entry: decoded audio plus optional beatgrid
#[derive(Debug, Clone)]
pub struct SampledItem {
    pub id: ItemId,
    pub name: String,
    /// Native tempo, if analyzed or imported
    pub bpm: Option<f64>,
    /// Offset of beat 1 of bar 1, if known
    pub downbeat_sec: Option<f64>,
    /// Decoded audio, shared with the deck chain
    pub clip: Arc<AudioClip>,
}

/// One entry in the library
#[derive(Debug, Clone)]
pub enum LibraryItem {
    Generative(GenerativeItem),
    Sampled(SampledItem),
}

impl LibraryItem {
    /// Item id
    pub fn id(&self) -> ItemId {
        match self {
            LibraryItem::Generative(item) => item.id,
            LibraryItem::Sampled(item) => item.id,
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        match self {
            LibraryItem::Generative(item) => &item.name,
            LibraryItem::Sampled(item) => &item.name,
        }
    }

    /// Native tempo, if known
    pub fn bpm(&self) -> Option<f64> {
        match self {
            LibraryItem::Generative(item) => Some(item.bpm),
            LibraryItem::Sampled(item) => item.bpm,
        }
    }

    /// Whether this item plays through the sample chain
    pub fn is_sampled(&self) -> bool {
        matches!(self, LibraryItem::Sampled(_))
    }
}

/// Ordered catalog of library items
#[derive(Debug, Default)]
pub struct Library {
    items: Vec<LibraryItem>,
    next_id: ItemId,
}

impl Library {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from generative catalog entries (name, bpm, program)
    pub fn from_catalog<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, f64, String)>,
    {
        let mut library = Self::new();
        for (name, bpm, program) in entries {
            let id = library.allocate_id();
            library.items.push(LibraryItem::Generative(GenerativeItem {
                id,
                name,
                bpm,
                program,
            }));
        }
        log::info!("library: catalog built with {} items", library.items.len());
        library
    }

    fn allocate_id(&mut self) -> ItemId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the library is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate items in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &LibraryItem> {
        self.items.iter()
    }

    /// Look up an item by id
    pub fn get(&self, id: ItemId) -> Option<&LibraryItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Look up an item by catalog position
    pub fn by_index(&self, index: usize) -> Option<&LibraryItem> {
        self.items.get(index)
    }

    /// The fallback item used when a descriptor no longer resolves
    pub fn default_item(&self) -> Option<&LibraryItem> {
        self.items.first()
    }

    /// Resolve a descriptor, falling back to the default item
    pub fn resolve(&self, descriptor: &SourceDescriptor) -> Option<&LibraryItem> {
        self.get(descriptor.item_id).or_else(|| {
            log::warn!(
                "library: item {} missing, falling back to default",
                descriptor.item_id
            );
            self.default_item()
        })
    }

    /// Append a newly imported sampled item and return its id
    pub fn add_sampled(&mut self, name: String, clip: Arc<AudioClip>) -> ItemId {
        let id = self.allocate_id();
        log::info!(
            "library: imported \"{}\" ({:.1}s) as item {}",
            name,
            clip.duration_sec(),
            id
        );
        self.items.push(LibraryItem::Sampled(SampledItem {
            id,
            name,
            bpm: None,
            downbeat_sec: None,
            clip,
        }));
        id
    }

    /// Patch an imported item's beatgrid metadata
    ///
    /// Only sampled items accept a patch; returns false when the id is
    /// missing or points at a generative item.
    pub fn apply_beatgrid(&mut self, id: ItemId, update: &BeatgridUpdate) -> bool {
        let Some(LibraryItem::Sampled(item)) =
            self.items.iter_mut().find(|item| item.id() == id)
        else {
            log::warn!("library: beatgrid patch rejected, item {} not sampled", id);
            return false;
        };

        if let Some(bpm) = update.bpm {
            item.bpm = Some(bpm);
        }
        if let Some(downbeat) = update.downbeat_sec {
            item.downbeat_sec = Some(downbeat);
        }
        log::info!(
            "library: item {} beatgrid now bpm={:?} downbeat={:?}",
            id,
            item.bpm,
            item.downbeat_sec
        );
        true
    }
}
