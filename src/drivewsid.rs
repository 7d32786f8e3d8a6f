//! Parser for drive item identifiers (`TYPE::ZONE::DOCWSID`).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DriveError, Result};

/// Drivewsid of the drive root folder.
pub const ROOT_DRIVEWSID: &str = "FOLDER::com.apple.CloudDocs::root";

/// Drivewsid of the trash root.
pub const TRASH_DRIVEWSID: &str = "TRASH_ROOT";

/// Zone holding the user's own documents.
pub const DEFAULT_ZONE: &str = "com.apple.CloudDocs";

static DRIVEWSID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(FOLDER|FILE|APP_LIBRARY)::([^:]+)::(.+)$").expect("Invalid drivewsid regex")
});

/// Item kind encoded in the type segment of a drivewsid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrivewsidKind {
    Folder,
    File,
    AppLibrary,
    Root,
    TrashRoot,
}

impl DrivewsidKind {
    pub fn is_root(self) -> bool {
        matches!(self, DrivewsidKind::Root | DrivewsidKind::TrashRoot)
    }
}

/// Structured item identifier, unique within a zone.
///
/// Two identifiers are equal iff type, zone and docwsid all match, which for
/// the canonical string form is plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Drivewsid(String);

impl Drivewsid {
    /// Parse and validate a drivewsid string.
    ///
    /// # Examples
    ///
    /// ```
    /// use icloud_drive::drivewsid::{Drivewsid, DrivewsidKind};
    ///
    /// let id = Drivewsid::parse("FOLDER::com.apple.CloudDocs::ABC-123").unwrap();
    /// assert_eq!(id.kind(), DrivewsidKind::Folder);
    /// assert_eq!(id.zone(), "com.apple.CloudDocs");
    /// assert_eq!(id.docwsid(), "ABC-123");
    /// ```
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed == TRASH_DRIVEWSID || DRIVEWSID_REGEX.is_match(trimmed) {
            return Ok(Drivewsid(trimmed.to_string()));
        }
        Err(DriveError::InvalidDrivewsid(value.to_string()))
    }

    pub fn root() -> Self {
        Drivewsid(ROOT_DRIVEWSID.to_string())
    }

    pub fn trash_root() -> Self {
        Drivewsid(TRASH_DRIVEWSID.to_string())
    }

    /// Build an identifier from its components.
    pub fn from_parts(kind: DrivewsidKind, zone: &str, docwsid: &str) -> Self {
        match kind {
            DrivewsidKind::TrashRoot => Self::trash_root(),
            DrivewsidKind::Root => Drivewsid(format!("FOLDER::{}::root", zone)),
            DrivewsidKind::Folder => Drivewsid(format!("FOLDER::{}::{}", zone, docwsid)),
            DrivewsidKind::File => Drivewsid(format!("FILE::{}::{}", zone, docwsid)),
            DrivewsidKind::AppLibrary => {
                Drivewsid(format!("APP_LIBRARY::{}::{}", zone, docwsid))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Option<(&str, &str, &str)> {
        let captures = DRIVEWSID_REGEX.captures(&self.0)?;
        Some((
            captures.get(1)?.as_str(),
            captures.get(2)?.as_str(),
            captures.get(3)?.as_str(),
        ))
    }

    pub fn kind(&self) -> DrivewsidKind {
        match self.segments() {
            Some((_, _, "root")) => DrivewsidKind::Root,
            Some(("FOLDER", _, _)) => DrivewsidKind::Folder,
            Some(("FILE", _, _)) => DrivewsidKind::File,
            Some(("APP_LIBRARY", _, _)) => DrivewsidKind::AppLibrary,
            _ => DrivewsidKind::TrashRoot,
        }
    }

    /// Zone segment; empty for the trash root.
    pub fn zone(&self) -> &str {
        self.segments().map(|(_, zone, _)| zone).unwrap_or("")
    }

    /// Docwsid segment; empty for the trash root.
    pub fn docwsid(&self) -> &str {
        self.segments().map(|(_, _, doc)| doc).unwrap_or("")
    }

    /// Folders, app libraries and both roots have details with children.
    pub fn is_folder_like(&self) -> bool {
        self.kind() != DrivewsidKind::File
    }
}

impl fmt::Display for Drivewsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Drivewsid {
    /// Unchecked conversion for identifiers that came from the server.
    fn from(value: &str) -> Self {
        Drivewsid(value.to_string())
    }
}
