//! Data models for account and drive web-service payloads.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::drivewsid::{Drivewsid, DrivewsidKind};
use crate::error::{DriveError, Result};
use crate::session::write_json;

/// Account-level identity returned by account login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub dsid: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub apple_id: Option<String>,
}

/// One service endpoint, e.g. `drivews`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webservice {
    pub url: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Server-issued account metadata; required by every drive call.
///
/// Only `appsOrder` is checked structurally. Unknown fields are kept so the
/// persisted snapshot round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    pub apps_order: Vec<String>,
    #[serde(default)]
    pub ds_info: Option<DsInfo>,
    #[serde(default)]
    pub webservices: HashMap<String, Webservice>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AccountData {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Base URL of a named service.
    pub fn webservice(&self, name: &str) -> Result<&str> {
        self.webservices
            .get(name)
            .map(|ws| ws.url.as_str())
            .ok_or_else(|| DriveError::MissingWebservice(name.to_string()))
    }

    pub fn dsid(&self) -> Result<&str> {
        self.ds_info
            .as_ref()
            .map(|info| info.dsid.as_str())
            .ok_or_else(|| DriveError::Decode {
                description: "account data has no dsInfo.dsid".to_string(),
            })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Folder reference inside a parent's `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderItem {
    pub drivewsid: Drivewsid,
    pub docwsid: String,
    pub zone: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Drivewsid>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub file_count: Option<u64>,
    #[serde(default)]
    pub direct_children_count: Option<u64>,
    #[serde(default)]
    pub restore_path: Option<String>,
}

/// File reference inside a parent's `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub drivewsid: Drivewsid,
    pub docwsid: String,
    pub zone: String,
    pub name: String,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Drivewsid>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_modified: Option<String>,
    #[serde(default)]
    pub date_changed: Option<String>,
    #[serde(default)]
    pub last_open_time: Option<String>,
    #[serde(default)]
    pub restore_path: Option<String>,
}

/// App container reference (e.g. Pages, Numbers) inside the root's `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppLibraryItem {
    pub drivewsid: Drivewsid,
    pub docwsid: String,
    pub zone: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Drivewsid>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub supported_extensions: Vec<String>,
    #[serde(default)]
    pub supported_types: Vec<String>,
}

/// A child entry of a folder, tagged by the JSON `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DriveItem {
    #[serde(rename = "FOLDER")]
    Folder(FolderItem),
    #[serde(rename = "APP_LIBRARY")]
    AppLibrary(AppLibraryItem),
    #[serde(rename = "FILE")]
    File(FileItem),
}

impl DriveItem {
    pub fn drivewsid(&self) -> &Drivewsid {
        match self {
            DriveItem::Folder(item) => &item.drivewsid,
            DriveItem::AppLibrary(item) => &item.drivewsid,
            DriveItem::File(item) => &item.drivewsid,
        }
    }

    pub fn etag(&self) -> Option<&str> {
        match self {
            DriveItem::Folder(item) => item.etag.as_deref(),
            DriveItem::AppLibrary(item) => item.etag.as_deref(),
            DriveItem::File(item) => item.etag.as_deref(),
        }
    }

    /// Name as it appears in a path; files carry their extension.
    pub fn file_name(&self) -> String {
        match self {
            DriveItem::Folder(item) => item.name.clone(),
            DriveItem::AppLibrary(item) => item.name.clone(),
            DriveItem::File(item) => join_extension(&item.name, item.extension.as_deref()),
        }
    }

    pub fn is_folder_like(&self) -> bool {
        !matches!(self, DriveItem::File(_))
    }
}

impl FileItem {
    pub fn file_name(&self) -> String {
        join_extension(&self.name, self.extension.as_deref())
    }
}

fn join_extension(name: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", name, ext),
        _ => name.to_string(),
    }
}

/// Details of a folder-like item: root, trash root, folder or app library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Details {
    pub drivewsid: Drivewsid,
    #[serde(default)]
    pub docwsid: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Drivewsid>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub number_of_items: Option<u64>,
    #[serde(default)]
    pub items: Vec<DriveItem>,
    #[serde(default)]
    pub supported_extensions: Vec<String>,
    #[serde(default)]
    pub supported_types: Vec<String>,
}

impl Details {
    pub fn kind(&self) -> DrivewsidKind {
        self.drivewsid.kind()
    }

    /// Child with the given path name.
    pub fn find_child(&self, name: &str) -> Option<&DriveItem> {
        self.items.iter().find(|item| item.file_name() == name)
    }

    /// Same drivewsid and the same set of children (identity and name).
    pub fn same_as(&self, other: &Details) -> bool {
        if self.drivewsid != other.drivewsid || self.items.len() != other.items.len() {
            return false;
        }
        let children = |details: &Details| {
            let mut list: Vec<(Drivewsid, String)> = details
                .items
                .iter()
                .map(|item| (item.drivewsid().clone(), item.file_name()))
                .collect();
            list.sort();
            list
        };
        children(self) == children(other)
    }

    /// Reference entry for this folder as it would appear in its parent.
    pub fn as_item(&self) -> Option<DriveItem> {
        let docwsid = self.docwsid.clone().unwrap_or_default();
        let zone = self.zone.clone().unwrap_or_default();
        match self.kind() {
            DrivewsidKind::Folder => Some(DriveItem::Folder(FolderItem {
                drivewsid: self.drivewsid.clone(),
                docwsid,
                zone,
                name: self.name.clone(),
                parent_id: self.parent_id.clone(),
                etag: self.etag.clone(),
                date_created: self.date_created.clone(),
                file_count: None,
                direct_children_count: self.number_of_items,
                restore_path: None,
            })),
            DrivewsidKind::AppLibrary => Some(DriveItem::AppLibrary(AppLibraryItem {
                drivewsid: self.drivewsid.clone(),
                docwsid,
                zone,
                name: self.name.clone(),
                parent_id: self.parent_id.clone(),
                etag: self.etag.clone(),
                date_created: self.date_created.clone(),
                supported_extensions: self.supported_extensions.clone(),
                supported_types: self.supported_types.clone(),
            })),
            _ => None,
        }
    }
}

/// One row of a retrieve-details response.
#[derive(Debug, Clone, PartialEq)]
pub enum DetailsResult {
    Found(Details),
    /// Server answered with a non-OK status, e.g. `ID_INVALID`.
    Invalid { drivewsid: Drivewsid, status: String },
}

impl DetailsResult {
    pub fn found(self) -> Option<Details> {
        match self {
            DetailsResult::Found(details) => Some(details),
            DetailsResult::Invalid { .. } => None,
        }
    }
}

impl<'de> Deserialize<'de> for DetailsResult {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("OK");
        if status != "OK" {
            let drivewsid = value
                .get("drivewsid")
                .and_then(|s| s.as_str())
                .unwrap_or_default();
            return Ok(DetailsResult::Invalid {
                drivewsid: Drivewsid::from(drivewsid),
                status: status.to_string(),
            });
        }
        serde_json::from_value(value)
            .map(DetailsResult::Found)
            .map_err(serde::de::Error::custom)
    }
}

/// Ancestor entry of the hierarchy-annotated details variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyEntry {
    pub drivewsid: Drivewsid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
}

/// Second object of a `includeHierarchy` pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyDetails {
    pub drivewsid: Drivewsid,
    #[serde(default)]
    pub hierarchy: Vec<HierarchyEntry>,
}

/// Entry of the retrieve-details request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetailsQuery {
    pub drivewsid: Drivewsid,
    pub partial_data: bool,
    pub include_hierarchy: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFolder {
    pub client_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFoldersRequest {
    #[serde(rename = "destinationDrivewsId")]
    pub destination_drivews_id: Drivewsid,
    pub folders: Vec<NewFolder>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFoldersResponse {
    #[serde(rename = "destinationDrivewsId")]
    pub destination_drivews_id: Drivewsid,
    #[serde(default)]
    pub folders: Vec<FolderItem>,
}

/// Item reference used by rename, move, trash, recover and delete.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRef {
    pub drivewsid: Drivewsid,
    pub etag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ItemRef {
    pub fn from_item(item: &DriveItem) -> Self {
        Self {
            drivewsid: item.drivewsid().clone(),
            etag: item.etag().unwrap_or_default().to_string(),
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameItem {
    pub drivewsid: Drivewsid,
    pub etag: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsRequest<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItemsRequest {
    #[serde(rename = "destinationDrivewsId")]
    pub destination_drivews_id: Drivewsid,
    pub items: Vec<ItemRef>,
}

/// Per-item outcome of a write operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    #[serde(default)]
    pub drivewsid: Option<Drivewsid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<ItemStatus>,
}

/// Body of the upload-URL request.
#[derive(Debug, Clone, Serialize)]
pub struct UploadRequest {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content_type: String,
    pub size: u64,
}

/// Upload target handed out by the document service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadTarget {
    pub document_id: String,
    pub url: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Receipt returned by the content store after the bytes are uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleFileData {
    pub receipt: String,
    pub reference_signature: String,
    pub signature: String,
    pub size: u64,
    #[serde(default)]
    pub wrapping_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentPath {
    pub starting_document_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFlags {
    pub is_writable: bool,
    pub is_executable: bool,
    pub is_hidden: bool,
}

impl Default for FileFlags {
    fn default() -> Self {
        Self {
            is_writable: true,
            is_executable: false,
            is_hidden: false,
        }
    }
}

/// Body of the document update call that registers an uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateDocumentsRequest {
    pub data: SingleFileData,
    pub command: String,
    pub create_short_guid: bool,
    pub document_id: String,
    pub path: DocumentPath,
    pub allow_conflict: bool,
    pub file_flags: FileFlags,
    pub mtime: i64,
    pub btime: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatus {
    pub status_code: i64,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDocumentsResponse {
    pub status: UpdateStatus,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}
