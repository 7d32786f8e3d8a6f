//! Drive metadata cache keyed by drivewsid.
//!
//! Entries are trusted until a validation round proves them stale; there is no
//! time-based eviction.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::drivewsid::{Drivewsid, DrivewsidKind};
use crate::error::{DriveError, Result};
use crate::models::{AppLibraryItem, Details, DriveItem, FileItem, FolderItem};
use crate::session::write_json;

/// One cached item: either full details or a bare reference from a parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheEntity {
    Root {
        details: Details,
        created: DateTime<Utc>,
    },
    TrashRoot {
        details: Details,
        created: DateTime<Utc>,
    },
    FolderDetails {
        details: Details,
        created: DateTime<Utc>,
    },
    FolderItem {
        item: FolderItem,
        created: DateTime<Utc>,
    },
    AppLibraryDetails {
        details: Details,
        created: DateTime<Utc>,
    },
    AppLibraryItem {
        item: AppLibraryItem,
        created: DateTime<Utc>,
    },
    FileItem {
        item: FileItem,
        created: DateTime<Utc>,
    },
}

impl CacheEntity {
    /// Entity for freshly retrieved details, tagged by the drivewsid type.
    pub fn from_details(details: Details) -> Result<Self> {
        let created = Utc::now();
        Ok(match details.kind() {
            DrivewsidKind::Root => CacheEntity::Root { details, created },
            DrivewsidKind::TrashRoot => CacheEntity::TrashRoot { details, created },
            DrivewsidKind::Folder => CacheEntity::FolderDetails { details, created },
            DrivewsidKind::AppLibrary => CacheEntity::AppLibraryDetails { details, created },
            DrivewsidKind::File => {
                return Err(DriveError::InvalidCacheEntity {
                    drivewsid: details.drivewsid.to_string(),
                    reason: "files have no details".to_string(),
                })
            }
        })
    }

    pub fn from_item(item: DriveItem) -> Self {
        let created = Utc::now();
        match item {
            DriveItem::Folder(item) => CacheEntity::FolderItem { item, created },
            DriveItem::AppLibrary(item) => CacheEntity::AppLibraryItem { item, created },
            DriveItem::File(item) => CacheEntity::FileItem { item, created },
        }
    }

    pub fn drivewsid(&self) -> &Drivewsid {
        match self {
            CacheEntity::Root { details, .. }
            | CacheEntity::TrashRoot { details, .. }
            | CacheEntity::FolderDetails { details, .. }
            | CacheEntity::AppLibraryDetails { details, .. } => &details.drivewsid,
            CacheEntity::FolderItem { item, .. } => &item.drivewsid,
            CacheEntity::AppLibraryItem { item, .. } => &item.drivewsid,
            CacheEntity::FileItem { item, .. } => &item.drivewsid,
        }
    }

    /// Kind implied by the entity tag.
    pub fn kind(&self) -> DrivewsidKind {
        match self {
            CacheEntity::Root { .. } => DrivewsidKind::Root,
            CacheEntity::TrashRoot { .. } => DrivewsidKind::TrashRoot,
            CacheEntity::FolderDetails { .. } | CacheEntity::FolderItem { .. } => {
                DrivewsidKind::Folder
            }
            CacheEntity::AppLibraryDetails { .. } | CacheEntity::AppLibraryItem { .. } => {
                DrivewsidKind::AppLibrary
            }
            CacheEntity::FileItem { .. } => DrivewsidKind::File,
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        match self {
            CacheEntity::Root { created, .. }
            | CacheEntity::TrashRoot { created, .. }
            | CacheEntity::FolderDetails { created, .. }
            | CacheEntity::FolderItem { created, .. }
            | CacheEntity::AppLibraryDetails { created, .. }
            | CacheEntity::AppLibraryItem { created, .. }
            | CacheEntity::FileItem { created, .. } => *created,
        }
    }

    pub fn details(&self) -> Option<&Details> {
        match self {
            CacheEntity::Root { details, .. }
            | CacheEntity::TrashRoot { details, .. }
            | CacheEntity::FolderDetails { details, .. }
            | CacheEntity::AppLibraryDetails { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn has_details(&self) -> bool {
        self.details().is_some()
    }

    fn check(&self) -> Result<()> {
        let id = self.drivewsid();
        if id.kind() != self.kind() {
            return Err(DriveError::InvalidCacheEntity {
                drivewsid: id.to_string(),
                reason: format!("tag {:?} does not match drivewsid type", self.kind()),
            });
        }
        Ok(())
    }
}

/// Result of walking a path through cached details only.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedWalk {
    /// Cached details from the root down; empty if the root is not cached.
    pub hierarchy: Vec<Details>,
    /// Terminal file, when the last segment named a cached file.
    pub file: Option<FileItem>,
    /// Segments the cache could not answer.
    pub rest: Vec<String>,
}

/// Persistent map of drive entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cache {
    entities: HashMap<Drivewsid, CacheEntity>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache snapshot. A missing or corrupt file gives an empty cache.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let loaded = fs::read_to_string(path)
            .map_err(DriveError::from)
            .and_then(|content| serde_json::from_str::<Cache>(&content).map_err(DriveError::from));
        match loaded {
            Ok(cache) => {
                debug!(path = %path.display(), entities = cache.len(), "cache loaded");
                cache
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "starting with an empty cache");
                Cache::new()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &Drivewsid) -> Option<&CacheEntity> {
        self.entities.get(id)
    }

    pub fn get_details(&self, id: &Drivewsid) -> Option<&Details> {
        self.entities.get(id).and_then(CacheEntity::details)
    }

    pub fn remove(&mut self, id: &Drivewsid) -> Option<CacheEntity> {
        self.entities.remove(id)
    }

    /// Insert an entity after checking its tag against its drivewsid.
    pub fn put(&mut self, entity: CacheEntity) -> Result<()> {
        entity.check()?;
        self.entities.insert(entity.drivewsid().clone(), entity);
        Ok(())
    }

    /// Store details and remember every child as a reference entity, without
    /// shadowing children whose details are already cached.
    ///
    /// A child whose type tag disagrees with its drivewsid is skipped; the
    /// parent's details still list it.
    pub fn put_details(&mut self, details: Details) -> Result<()> {
        let children = details.items.clone();
        let parent = details.drivewsid.clone();
        self.put(CacheEntity::from_details(details)?)?;
        for child in children {
            if let Err(e) = self.put_item(child) {
                warn!(parent = %parent, error = %e, "skipping child entity");
            }
        }
        Ok(())
    }

    /// Store a child reference unless full details are already cached.
    pub fn put_item(&mut self, item: DriveItem) -> Result<()> {
        if self.get_details(item.drivewsid()).is_some() {
            return Ok(());
        }
        self.put(CacheEntity::from_item(item))
    }

    /// Store a batch of details; nothing is written if any entry is invalid.
    pub fn put_all(&mut self, batch: Vec<Details>) -> Result<()> {
        let mut staged = self.clone();
        for details in batch {
            staged.put_details(details)?;
        }
        *self = staged;
        Ok(())
    }

    /// Follow `segments` from `root` through cached children only.
    pub fn walk(&self, root: &Drivewsid, segments: &[String]) -> CachedWalk {
        let Some(mut current) = self.get_details(root) else {
            return CachedWalk {
                hierarchy: Vec::new(),
                file: None,
                rest: segments.to_vec(),
            };
        };

        let mut hierarchy = vec![current.clone()];
        for (index, segment) in segments.iter().enumerate() {
            let last = index + 1 == segments.len();
            match current.find_child(segment) {
                Some(DriveItem::File(file)) if last => {
                    return CachedWalk {
                        hierarchy,
                        file: Some(file.clone()),
                        rest: Vec::new(),
                    };
                }
                Some(child) if child.is_folder_like() => match self.get_details(child.drivewsid()) {
                    Some(details) => {
                        hierarchy.push(details.clone());
                        current = details;
                    }
                    None => return partial(hierarchy, &segments[index..]),
                },
                _ => return partial(hierarchy, &segments[index..]),
            }
        }

        CachedWalk {
            hierarchy,
            file: None,
            rest: Vec::new(),
        }
    }
}

fn partial(hierarchy: Vec<Details>, rest: &[String]) -> CachedWalk {
    CachedWalk {
        hierarchy,
        file: None,
        rest: rest.to_vec(),
    }
}
