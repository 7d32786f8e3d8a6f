//! Drive web-service methods.
//!
//! Every method takes the [`DriveState`] by value and returns the updated one.
//! Requests are rebuilt from the state on each attempt, so a retry after
//! reauthorization uses the fresh account endpoints.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::{ClientConfig, RetryPolicy};
use crate::drivewsid::Drivewsid;
use crate::error::{DriveError, Result};
use crate::http::HttpTransport;
use crate::middleware::{operation, Middleware, MiddlewareStack};
use crate::models::{
    AccountData, CreateFoldersRequest, CreateFoldersResponse, Details, DetailsResult,
    HierarchyDetails, HierarchyEntry, ItemDetailsQuery, ItemRef, ItemsRequest, ItemsResponse,
    MoveItemsRequest, NewFolder, RenameItem, UpdateDocumentsRequest, UpdateDocumentsResponse,
    UploadRequest, UploadTarget,
};
use crate::request::{send, ApiRequest};
use crate::response::validate;
use crate::session::Session;

/// Build identifiers sent with every drive request.
const CLIENT_BUILD_NUMBER: &str = "2206Hotfix12";
const CLIENT_MASTERING_NUMBER: &str = "2206Hotfix12";

/// Session and account data owned by the operation in flight.
#[derive(Debug, Clone)]
pub struct DriveState {
    pub session: Session,
    pub account: AccountData,
}

impl DriveState {
    pub fn new(session: Session, account: AccountData) -> Self {
        Self { session, account }
    }
}

/// Typed client for the drive (`drivews`) and document (`docws`) services.
pub struct DriveApi {
    transport: Arc<dyn HttpTransport>,
    stack: MiddlewareStack,
    conflict_retry: RetryPolicy,
    origin: String,
}

impl DriveApi {
    /// Client with the standard middleware stack.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        authenticator: Arc<Authenticator>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            stack: MiddlewareStack::standard(authenticator, config.transport_retry),
            conflict_retry: config.conflict_retry,
            origin: config.endpoints.origin.clone(),
        }
    }

    /// Client with an explicit middleware stack.
    pub fn with_stack(
        transport: Arc<dyn HttpTransport>,
        stack: MiddlewareStack,
        conflict_retry: RetryPolicy,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            stack,
            conflict_retry,
            origin: origin.into(),
        }
    }

    fn drivews_url(account: &AccountData, path: &str) -> Result<String> {
        Ok(format!(
            "{}{}?dsid={}&appIdentifier=iclouddrive&clientBuildNumber={}&clientMasteringNumber={}",
            account.webservice("drivews")?.trim_end_matches('/'),
            path,
            account.dsid()?,
            CLIENT_BUILD_NUMBER,
            CLIENT_MASTERING_NUMBER,
        ))
    }

    fn docws_url(account: &AccountData, path: &str, query: &str) -> Result<String> {
        Ok(format!(
            "{}{}?{}dsid={}&clientBuildNumber={}&clientMasteringNumber={}",
            account.webservice("docws")?.trim_end_matches('/'),
            path,
            query,
            account.dsid()?,
            CLIENT_BUILD_NUMBER,
            CLIENT_MASTERING_NUMBER,
        ))
    }

    /// Send one request and decode its body.
    async fn call<T: DeserializeOwned>(
        &self,
        state: DriveState,
        request: &ApiRequest,
        accepted: &[u16],
    ) -> Result<(DriveState, T)> {
        let DriveState { session, account } = state;
        let (session, raw) = send(self.transport.as_ref(), session, request).await?;
        let value = validate(raw, accepted)?.decode_json::<T>()?.into_inner();
        Ok((DriveState { session, account }, value))
    }

    /// Run a request built from the current state through `stack`.
    async fn run<'a, T, B>(
        &'a self,
        stack: &MiddlewareStack,
        state: DriveState,
        build: B,
    ) -> Result<(DriveState, T)>
    where
        T: DeserializeOwned + Send + 'a,
        B: Fn(&AccountData) -> Result<ApiRequest> + Send + Sync + 'a,
    {
        let op = operation(move |state: DriveState| {
            let request = build(&state.account);
            async move {
                let request = request?;
                self.call(state, &request, &[200]).await
            }
        });
        stack.apply(op)(state).await
    }

    fn post(&self, url: String) -> ApiRequest {
        ApiRequest::post(url).header("Origin", self.origin.as_str())
    }

    /// Fetch details for folder-like items; one row per requested id.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn retrieve_item_details_in_folders(
        &self,
        state: DriveState,
        ids: &[Drivewsid],
    ) -> Result<(DriveState, Vec<DetailsResult>)> {
        let body = detail_queries(ids, false);
        debug!("retrieving details");
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/retrieveItemDetailsInFolders")?)
                .json(&body)
        })
        .await
    }

    /// Fetch details together with each item's ancestor chain.
    ///
    /// The server answers with two objects per id (bare details, then the
    /// hierarchy-annotated copy) which are paired positionally.
    #[instrument(skip_all, fields(count = ids.len()))]
    pub async fn retrieve_item_details_in_folders_hierarchy(
        &self,
        state: DriveState,
        ids: &[Drivewsid],
    ) -> Result<(DriveState, Vec<Option<(Details, Vec<HierarchyEntry>)>>)> {
        let body = detail_queries(ids, true);
        let (state, rows): (DriveState, Vec<serde_json::Value>) = self
            .run(&self.stack, state, move |account| {
                self.post(Self::drivews_url(account, "/retrieveItemDetailsInFolders")?)
                    .json(&body)
            })
            .await?;
        let paired = pair_hierarchy(rows, ids.len())?;
        Ok((state, paired))
    }

    pub async fn create_folders(
        &self,
        state: DriveState,
        destination: &Drivewsid,
        names: &[String],
    ) -> Result<(DriveState, CreateFoldersResponse)> {
        let body = CreateFoldersRequest {
            destination_drivews_id: destination.clone(),
            folders: names
                .iter()
                .map(|name| NewFolder {
                    client_id: temp_client_id(),
                    name: name.clone(),
                })
                .collect(),
        };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/createFolders")?)
                .json(&body)
        })
        .await
    }

    pub async fn rename_items(
        &self,
        state: DriveState,
        items: Vec<RenameItem>,
    ) -> Result<(DriveState, ItemsResponse)> {
        let body = ItemsRequest { items };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/renameItems")?)
                .json(&body)
        })
        .await
    }

    pub async fn move_items(
        &self,
        state: DriveState,
        destination: &Drivewsid,
        items: Vec<ItemRef>,
    ) -> Result<(DriveState, ItemsResponse)> {
        let body = MoveItemsRequest {
            destination_drivews_id: destination.clone(),
            items: with_client_ids(items),
        };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/moveItems")?)
                .json(&body)
        })
        .await
    }

    pub async fn move_items_to_trash(
        &self,
        state: DriveState,
        items: Vec<ItemRef>,
    ) -> Result<(DriveState, ItemsResponse)> {
        let body = ItemsRequest {
            items: with_client_ids(items),
        };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/moveItemsToTrash")?)
                .json(&body)
        })
        .await
    }

    /// Recover trashed items to their original location.
    pub async fn put_back_items_from_trash(
        &self,
        state: DriveState,
        items: Vec<ItemRef>,
    ) -> Result<(DriveState, ItemsResponse)> {
        let body = ItemsRequest { items };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/putBackItemsFromTrash")?)
                .json(&body)
        })
        .await
    }

    /// Permanently delete items that are already in the trash.
    pub async fn delete_items(
        &self,
        state: DriveState,
        items: Vec<ItemRef>,
    ) -> Result<(DriveState, ItemsResponse)> {
        let body = ItemsRequest {
            items: with_client_ids(items),
        };
        self.run(&self.stack, state, move |account| {
            self.post(Self::drivews_url(account, "/deleteItems")?)
                .json(&body)
        })
        .await
    }

    /// Ask the document service where to upload a file's bytes.
    pub async fn upload_request(
        &self,
        state: DriveState,
        zone: &str,
        filename: &str,
        content_type: &str,
        size: u64,
    ) -> Result<(DriveState, UploadTarget)> {
        let path = format!("/ws/{}/upload/web", zone);
        let body = UploadRequest {
            filename: filename.to_string(),
            kind: "FILE".to_string(),
            content_type: content_type.to_string(),
            size,
        };
        let (state, targets): (DriveState, Vec<UploadTarget>) = self
            .run(&self.stack, state, move |account| {
                self.post(Self::docws_url(account, &path, "token=NONE&")?)
                    .json(&body)
            })
            .await?;
        let target = targets.into_iter().next().ok_or_else(|| DriveError::Decode {
            description: "upload response contains no target".to_string(),
        })?;
        Ok((state, target))
    }

    /// Register uploaded content as a document. A 409 here is a transient
    /// write conflict and is retried with its own budget.
    pub async fn update_documents(
        &self,
        state: DriveState,
        zone: &str,
        request: UpdateDocumentsRequest,
    ) -> Result<(DriveState, UpdateDocumentsResponse)> {
        let path = format!("/ws/{}/update/documents", zone);
        let stack = self
            .stack
            .clone()
            .with(Middleware::RetryConflict(self.conflict_retry));
        self.run(&stack, state, move |account| {
            self.post(Self::docws_url(account, &path, "errorBreakdown=true&")?)
                .json(&request)
        })
        .await
    }
}

fn detail_queries(ids: &[Drivewsid], include_hierarchy: bool) -> Vec<ItemDetailsQuery> {
    ids.iter()
        .map(|id| ItemDetailsQuery {
            drivewsid: id.clone(),
            partial_data: false,
            include_hierarchy,
        })
        .collect()
}

fn temp_client_id() -> String {
    format!("TempId-{}", Uuid::new_v4())
}

fn with_client_ids(items: Vec<ItemRef>) -> Vec<ItemRef> {
    items
        .into_iter()
        .map(|item| match item.client_id {
            Some(_) => item,
            None => item.with_client_id(temp_client_id()),
        })
        .collect()
}

/// Pair `[details, hierarchy, details, hierarchy, ...]` rows per requested id.
pub(crate) fn pair_hierarchy(
    rows: Vec<serde_json::Value>,
    requested: usize,
) -> Result<Vec<Option<(Details, Vec<HierarchyEntry>)>>> {
    if rows.len() != requested * 2 {
        return Err(DriveError::Decode {
            description: format!(
                "expected {} objects for {} ids with hierarchy, got {}",
                requested * 2,
                requested,
                rows.len()
            ),
        });
    }

    let mut paired = Vec::with_capacity(requested);
    let mut rows = rows.into_iter();
    while let (Some(details), Some(hierarchy)) = (rows.next(), rows.next()) {
        let details: DetailsResult = serde_json::from_value(details).map_err(|e| {
            DriveError::Decode {
                description: format!("details row: {}", e),
            }
        })?;
        let entry = match details {
            DetailsResult::Found(details) => {
                let hierarchy: HierarchyDetails =
                    serde_json::from_value(hierarchy).map_err(|e| DriveError::Decode {
                        description: format!("hierarchy row: {}", e),
                    })?;
                if hierarchy.drivewsid != details.drivewsid {
                    return Err(DriveError::Decode {
                        description: format!(
                            "hierarchy row {} does not follow details row {}",
                            hierarchy.drivewsid, details.drivewsid
                        ),
                    });
                }
                Some((details, hierarchy.hierarchy))
            }
            DetailsResult::Invalid { .. } => None,
        };
        paired.push(entry);
    }
    Ok(paired)
}
