//! Path resolution over the drive tree.
//!
//! Resolution is batched across every requested path:
//!
//! 1. walk each path through the cache without network access;
//! 2. re-fetch the root and every cached ancestor in one call and keep the
//!    leading run of ancestors whose children did not change;
//! 3. resolve the remaining segments level by level, one call per depth for
//!    all paths together;
//! 4. write every fetched entity into the cache once all calls succeeded.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::cache::Cache;
use crate::drive::{DriveApi, DriveState};
use crate::drivewsid::Drivewsid;
use crate::error::{DriveError, Result};
use crate::models::{Details, DetailsResult, DriveItem, FileItem};

/// Why a path did not resolve. Each variant names the offending segment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("'{name}' was not found")]
    NotFound { name: String },

    #[error("'{name}' is a file, not a folder")]
    NotAFolder { name: String },

    #[error("'{name}' is a folder, not a file")]
    NotAFile { name: String },

    #[error("'{name}' is no longer where the cache had it")]
    HierarchyChanged { name: String },
}

/// Which tree a path is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootKind {
    #[default]
    Drive,
    Trash,
}

impl RootKind {
    pub fn drivewsid(self) -> Drivewsid {
        match self {
            RootKind::Drive => Drivewsid::root(),
            RootKind::Trash => Drivewsid::trash_root(),
        }
    }
}

/// Ancestor chain from a root entity down; never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy(Vec<Details>);

impl Hierarchy {
    pub fn new(root: Details) -> Self {
        Self(vec![root])
    }

    /// Append a child of the deepest element.
    pub fn push(&mut self, details: Details) {
        debug_assert!(
            is_child_of(&details, self.last()),
            "{} is not a child of {}",
            details.drivewsid,
            self.last().drivewsid
        );
        self.0.push(details);
    }

    /// Each element's parent id, when the server sent one, names the element
    /// before it.
    pub fn is_linked(&self) -> bool {
        self.0.windows(2).all(|pair| is_child_of(&pair[1], &pair[0]))
    }

    pub fn root(&self) -> &Details {
        &self.0[0]
    }

    /// Deepest element.
    pub fn last(&self) -> &Details {
        &self.0[self.0.len() - 1]
    }

    pub fn details(&self) -> &[Details] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Display path of the deepest element, `/` for the root.
    pub fn path(&self) -> String {
        if self.0.len() == 1 {
            return "/".to_string();
        }
        self.0[1..]
            .iter()
            .map(|details| format!("/{}", details.name))
            .collect()
    }
}

fn is_child_of(child: &Details, parent: &Details) -> bool {
    child
        .parent_id
        .as_ref()
        .map_or(true, |id| *id == parent.drivewsid)
}

/// Outcome for one requested path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathValidation {
    /// Fully resolved. `file` is set when the target is a file; otherwise the
    /// target is the hierarchy's last element.
    Valid {
        hierarchy: Hierarchy,
        file: Option<FileItem>,
    },
    /// Resolution stopped at `hierarchy.last()` with `rest` unresolved.
    Invalid {
        hierarchy: Hierarchy,
        rest: Vec<String>,
        reason: ResolveError,
    },
}

impl PathValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, PathValidation::Valid { .. })
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        match self {
            PathValidation::Valid { hierarchy, .. } | PathValidation::Invalid { hierarchy, .. } => {
                hierarchy
            }
        }
    }

    /// Drivewsid of the resolved target.
    pub fn target(&self) -> Option<&Drivewsid> {
        match self {
            PathValidation::Valid {
                file: Some(file), ..
            } => Some(&file.drivewsid),
            PathValidation::Valid { hierarchy, .. } => Some(&hierarchy.last().drivewsid),
            PathValidation::Invalid { .. } => None,
        }
    }

    pub fn into_result(self) -> std::result::Result<(Hierarchy, Option<FileItem>), ResolveError> {
        match self {
            PathValidation::Valid { hierarchy, file } => Ok((hierarchy, file)),
            PathValidation::Invalid { reason, .. } => Err(reason),
        }
    }
}

/// Split a slash-separated path into name segments, dropping empty and `.`
/// segments.
pub fn normalize_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_string)
        .collect()
}

/// A path still being resolved.
struct Pending {
    index: usize,
    hierarchy: Hierarchy,
    rest: Vec<String>,
    /// Cached ancestors past `hierarchy` were discarded by validation.
    changed: bool,
    /// The cache had resolved the final segment to a file.
    cached_file: bool,
}

impl Pending {
    fn fail(self, reason: ResolveError) -> (usize, PathValidation) {
        (
            self.index,
            PathValidation::Invalid {
                hierarchy: self.hierarchy,
                rest: self.rest,
                reason,
            },
        )
    }

    fn missing(self, name: String) -> (usize, PathValidation) {
        let reason = if self.changed {
            ResolveError::HierarchyChanged { name }
        } else {
            ResolveError::NotFound { name }
        };
        self.fail(reason)
    }
}

/// Details fetched during one resolution call, in retrieval order.
#[derive(Default)]
struct Fetched {
    by_id: HashMap<Drivewsid, Details>,
    order: Vec<Drivewsid>,
    invalid: Vec<Drivewsid>,
}

impl Fetched {
    fn absorb(&mut self, rows: Vec<DetailsResult>) {
        for row in rows {
            match row {
                DetailsResult::Found(details) => {
                    let id = details.drivewsid.clone();
                    if self.by_id.insert(id.clone(), details).is_none() {
                        self.order.push(id);
                    }
                }
                DetailsResult::Invalid { drivewsid, status } => {
                    debug!(%drivewsid, %status, "item no longer exists");
                    self.invalid.push(drivewsid);
                }
            }
        }
    }

    fn get(&self, id: &Drivewsid) -> Option<&Details> {
        self.by_id.get(id)
    }

    fn write_through(mut self, cache: &mut Cache) -> Result<()> {
        for id in &self.invalid {
            cache.remove(id);
        }
        let batch = self
            .order
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .collect();
        cache.put_all(batch)
    }
}

/// Resolves paths through a [`DriveApi`], reading and refreshing a [`Cache`].
pub struct PathResolver<'a> {
    api: &'a DriveApi,
}

impl<'a> PathResolver<'a> {
    pub fn new(api: &'a DriveApi) -> Self {
        Self { api }
    }

    /// Resolve every path under `root`. One result per path, in order.
    ///
    /// The cache is updated only when every network call succeeded.
    #[instrument(skip_all, fields(root = ?root, paths = paths.len()))]
    pub async fn resolve_paths<P: AsRef<str>>(
        &self,
        state: DriveState,
        cache: &mut Cache,
        root: RootKind,
        paths: &[P],
    ) -> Result<(DriveState, Vec<PathValidation>)> {
        let root_id = root.drivewsid();
        let segments: Vec<Vec<String>> = paths.iter().map(|p| normalize_path(p.as_ref())).collect();
        let walks: Vec<_> = segments
            .iter()
            .map(|segments| cache.walk(&root_id, segments))
            .collect();

        let mut validation_ids = vec![root_id.clone()];
        let mut seen: HashSet<Drivewsid> = HashSet::from([root_id.clone()]);
        for walk in &walks {
            for details in &walk.hierarchy {
                if seen.insert(details.drivewsid.clone()) {
                    validation_ids.push(details.drivewsid.clone());
                }
            }
        }

        let mut fetched = Fetched::default();
        let (mut state, rows) = self
            .api
            .retrieve_item_details_in_folders(state, &validation_ids)
            .await?;
        fetched.absorb(rows);
        let fresh_root = fetched
            .get(&root_id)
            .cloned()
            .ok_or_else(|| DriveError::Decode {
                description: format!("no details returned for {}", root_id),
            })?;

        let mut pending = Vec::with_capacity(walks.len());
        for (index, (walk, segments)) in walks.into_iter().zip(segments).enumerate() {
            let mut hierarchy = Hierarchy::new(fresh_root.clone());
            let mut matched = walk
                .hierarchy
                .first()
                .is_some_and(|cached| cached.same_as(&fresh_root));
            for cached in walk.hierarchy.iter().skip(1) {
                if !matched {
                    break;
                }
                match fetched.get(&cached.drivewsid) {
                    Some(fresh) => {
                        matched = cached.same_as(fresh);
                        hierarchy.push(fresh.clone());
                    }
                    None => matched = false,
                }
            }

            let discarded =
                hierarchy.len() < walk.hierarchy.len() || (walk.file.is_some() && !matched);
            let rest = segments[hierarchy.len() - 1..].to_vec();
            pending.push(Pending {
                index,
                cached_file: walk.file.is_some() && rest.len() == 1,
                changed: !walk.hierarchy.is_empty() && discarded,
                hierarchy,
                rest,
            });
        }

        let mut results: Vec<Option<PathValidation>> = vec![None; pending.len()];
        let mut depth = 0usize;
        while !pending.is_empty() {
            let mut wanted: Vec<Drivewsid> = Vec::new();
            let mut descending: Vec<(Pending, Drivewsid)> = Vec::new();

            for p in pending.drain(..) {
                let Some(name) = p.rest.first().cloned() else {
                    results[p.index] = Some(PathValidation::Valid {
                        hierarchy: p.hierarchy,
                        file: None,
                    });
                    continue;
                };
                let last = p.rest.len() == 1;
                let concluded = match p.hierarchy.last().find_child(&name).cloned() {
                    None => p.missing(name),
                    Some(DriveItem::File(file)) if last => (
                        p.index,
                        PathValidation::Valid {
                            hierarchy: p.hierarchy,
                            file: Some(file),
                        },
                    ),
                    Some(DriveItem::File(_)) => p.fail(ResolveError::NotAFolder { name }),
                    Some(_) if p.cached_file => p.fail(ResolveError::NotFound { name }),
                    Some(child) => {
                        let id = child.drivewsid().clone();
                        if fetched.get(&id).is_none() && !wanted.contains(&id) {
                            wanted.push(id.clone());
                        }
                        descending.push((p, id));
                        continue;
                    }
                };
                results[concluded.0] = Some(concluded.1);
            }

            if !wanted.is_empty() {
                depth += 1;
                debug!(depth, count = wanted.len(), "retrieving next level");
                let (next_state, rows) = self
                    .api
                    .retrieve_item_details_in_folders(state, &wanted)
                    .await?;
                state = next_state;
                fetched.absorb(rows);
            }

            for (mut p, id) in descending {
                match fetched.get(&id) {
                    Some(details) => {
                        p.hierarchy.push(details.clone());
                        p.rest.remove(0);
                        p.changed = false;
                        pending.push(p);
                    }
                    None => {
                        let name = p.rest[0].clone();
                        let (index, result) = p.fail(ResolveError::NotFound { name });
                        results[index] = Some(result);
                    }
                }
            }
        }

        fetched.write_through(cache)?;
        let results = results.into_iter().flatten().collect();
        Ok((state, results))
    }

    /// Like [`resolve_paths`](Self::resolve_paths), but the first invalid path
    /// fails the whole call.
    pub async fn resolve_strict<P: AsRef<str>>(
        &self,
        state: DriveState,
        cache: &mut Cache,
        root: RootKind,
        paths: &[P],
    ) -> Result<(DriveState, Vec<(Hierarchy, Option<FileItem>)>)> {
        let (state, results) = self.resolve_paths(state, cache, root, paths).await?;
        let resolved = results
            .into_iter()
            .map(|result| result.into_result().map_err(DriveError::from))
            .collect::<Result<Vec<_>>>()?;
        Ok((state, resolved))
    }

    /// Resolve a path that must name a folder-like item.
    pub async fn resolve_folder(
        &self,
        state: DriveState,
        cache: &mut Cache,
        root: RootKind,
        path: &str,
    ) -> Result<(DriveState, Details)> {
        let (state, mut resolved) = self.resolve_strict(state, cache, root, &[path]).await?;
        let (hierarchy, file) = resolved.remove(0);
        match file {
            Some(file) => Err(ResolveError::NotAFolder {
                name: file.file_name(),
            }
            .into()),
            None => Ok((state, hierarchy.last().clone())),
        }
    }

    /// Resolve a path that must name a file.
    pub async fn resolve_file(
        &self,
        state: DriveState,
        cache: &mut Cache,
        root: RootKind,
        path: &str,
    ) -> Result<(DriveState, FileItem)> {
        let (state, mut resolved) = self.resolve_strict(state, cache, root, &[path]).await?;
        let (hierarchy, file) = resolved.remove(0);
        match file {
            Some(file) => Ok((state, file)),
            None => Err(ResolveError::NotAFile {
                name: hierarchy.last().name.clone(),
            }
            .into()),
        }
    }

    /// Display path of a folder-like item, or `None` if it no longer exists.
    pub async fn path_by_id(
        &self,
        state: DriveState,
        id: &Drivewsid,
    ) -> Result<(DriveState, Option<String>)> {
        let (state, mut rows) = self
            .api
            .retrieve_item_details_in_folders_hierarchy(state, std::slice::from_ref(id))
            .await?;
        let path = rows.pop().flatten().map(|(details, hierarchy)| {
            let mut path: String = hierarchy
                .iter()
                .filter(|entry| !entry.drivewsid.kind().is_root())
                .filter_map(|entry| entry.name.as_deref())
                .map(|name| format!("/{}", name))
                .collect();
            if !details.kind().is_root() {
                path.push('/');
                path.push_str(&details.name);
            }
            if path.is_empty() {
                path.push('/');
            }
            path
        });
        Ok((state, path))
    }
}
