//! icloud_drive - A client engine for the iCloud Drive web services.
//!
//! This library provides:
//! - Login through the identity service, including two-factor trust
//! - Drive web-service calls with transport retry and reauthorization on 421
//! - A persistent metadata cache and batched path resolution on top of it
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use icloud_drive::{
//!     Authenticator, Cache, ClientConfig, DriveApi, DriveState, PathResolver,
//!     ReqwestTransport, RootKind, Session, StdinCodePrompt,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::default();
//!     let transport = Arc::new(ReqwestTransport::new());
//!     let auth = Arc::new(Authenticator::new(
//!         transport.clone(),
//!         Arc::new(StdinCodePrompt),
//!         config.endpoints.clone(),
//!     ));
//!
//!     let (session, account) = auth.authenticate(Session::new("me@example.com", "secret")).await?;
//!     let api = DriveApi::new(transport, auth, &config);
//!     let mut cache = Cache::load(&config.cache_file);
//!
//!     let (_state, results) = PathResolver::new(&api)
//!         .resolve_paths(DriveState::new(session, account), &mut cache, RootKind::Drive, &["/Documents"])
//!         .await?;
//!     println!("{:?}", results[0].target());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod drive;
pub mod drivewsid;
pub mod error;
pub mod http;
pub mod middleware;
pub mod models;
pub mod request;
pub mod resolve;
pub mod response;
pub mod session;

// Re-exports for convenience
pub use auth::{Authenticator, CodePrompt, StdinCodePrompt};
pub use cache::Cache;
pub use config::{ClientConfig, Endpoints, RetryPolicy};
pub use drive::{DriveApi, DriveState};
pub use drivewsid::Drivewsid;
pub use error::{DriveError, Result};
pub use http::{HttpTransport, ReqwestTransport};
pub use models::AccountData;
pub use resolve::{PathResolver, PathValidation, ResolveError, RootKind};
pub use session::Session;
