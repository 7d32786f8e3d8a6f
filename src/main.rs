//! icloud_drive CLI - Resolve paths and list folders in iCloud Drive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use icloud_drive::models::DriveItem;
use icloud_drive::{
    Authenticator, Cache, ClientConfig, DriveApi, DriveState, PathResolver,
    PathValidation, ReqwestTransport, RootKind, Session, StdinCodePrompt,
};

/// CLI for the iCloud Drive web services.
#[derive(Parser)]
#[command(name = "icloud_drive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session snapshot file.
    #[arg(long, env = "ICLOUD_SESSION_FILE", default_value = "data/last-session.json")]
    session_file: PathBuf,

    /// Account data snapshot file.
    #[arg(long, env = "ICLOUD_ACCOUNT_FILE", default_value = "data/account-data.json")]
    account_file: PathBuf,

    /// Drive cache snapshot file.
    #[arg(long, env = "ICLOUD_CACHE_FILE", default_value = "data/drive-cache.json")]
    cache_file: PathBuf,

    /// Apple ID, needed when no session snapshot exists.
    #[arg(long, env = "ICLOUD_USERNAME")]
    username: Option<String>,

    /// Apple ID password.
    #[arg(long, env = "ICLOUD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session.
    Login,

    /// Resolve paths to drivewsids.
    Resolve {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Resolve inside the trash instead of the drive.
        #[arg(long)]
        trash: bool,
    },

    /// List the children of a folder.
    Ls {
        #[arg(default_value = "/")]
        path: String,

        #[arg(long)]
        trash: bool,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = ClientConfig {
        session_file: cli.session_file.clone(),
        account_file: cli.account_file.clone(),
        cache_file: cli.cache_file.clone(),
        ..ClientConfig::default()
    };

    let transport = Arc::new(ReqwestTransport::new());
    let auth = Arc::new(Authenticator::new(
        transport.clone(),
        Arc::new(StdinCodePrompt),
        config.endpoints.clone(),
    ));

    match cli.command {
        Commands::Login => {
            let session = initial_session(&config.session_file, cli.username, cli.password)?;
            let (session, account) = auth.authenticate(session).await.context("Login failed")?;
            persist(&config, &DriveState::new(session, account), None)?;
            println!("Logged in.");
        }

        Commands::Resolve { paths, trash } => {
            let state = restore_state(&config, &auth, cli.username, cli.password).await?;
            let api = DriveApi::new(transport, auth, &config);
            let mut cache = Cache::load(&config.cache_file);

            let (state, results) = PathResolver::new(&api)
                .resolve_paths(state, &mut cache, root_kind(trash), &paths)
                .await
                .context("Failed to resolve paths")?;
            persist(&config, &state, Some(&cache))?;

            let mut failed = false;
            for (path, result) in paths.iter().zip(&results) {
                match result {
                    PathValidation::Valid { .. } => {
                        let id = result.target().map(|id| id.to_string()).unwrap_or_default();
                        println!("{}\t{}", path, id);
                    }
                    PathValidation::Invalid {
                        hierarchy,
                        rest,
                        reason,
                    } => {
                        failed = true;
                        println!(
                            "{}\tinvalid at {} ({}), unresolved: {}",
                            path,
                            hierarchy.path(),
                            reason,
                            rest.join("/")
                        );
                    }
                }
            }
            if failed {
                bail!("Some paths did not resolve");
            }
        }

        Commands::Ls { path, trash } => {
            let state = restore_state(&config, &auth, cli.username, cli.password).await?;
            let api = DriveApi::new(transport, auth, &config);
            let mut cache = Cache::load(&config.cache_file);

            let (state, folder) = PathResolver::new(&api)
                .resolve_folder(state, &mut cache, root_kind(trash), &path)
                .await
                .with_context(|| format!("Failed to list {}", path))?;
            persist(&config, &state, Some(&cache))?;

            if folder.items.is_empty() {
                println!("No items found.");
            }
            for item in &folder.items {
                match item {
                    DriveItem::File(file) => {
                        println!("{:>12}  {}", file.size.unwrap_or_default(), item.file_name())
                    }
                    _ => println!("{:>12}  {}/", "-", item.file_name()),
                }
            }
        }
    }

    Ok(())
}

fn root_kind(trash: bool) -> RootKind {
    if trash {
        RootKind::Trash
    } else {
        RootKind::Drive
    }
}

/// Stored session with credentials from the command line taking precedence.
fn initial_session(
    session_file: &Path,
    username: Option<String>,
    password: Option<String>,
) -> Result<Session> {
    let mut session = match Session::load(session_file) {
        Ok(session) => session,
        Err(e) => {
            info!(error = %e, "no usable session snapshot");
            Session::default()
        }
    };
    if let Some(username) = username {
        session.username = username;
    }
    if let Some(password) = password {
        session.password = password;
    }
    if session.username.is_empty() || session.password.is_empty() {
        bail!("No stored session; pass --username and --password");
    }
    Ok(session)
}

/// Reuse the stored session and account data, logging in when either is
/// missing or the session no longer validates.
async fn restore_state(
    config: &ClientConfig,
    auth: &Authenticator,
    username: Option<String>,
    password: Option<String>,
) -> Result<DriveState> {
    let session = initial_session(&config.session_file, username, password)?;

    if has_stored_account(&config.account_file) {
        match auth.validate_session(session.clone()).await {
            Ok((session, account)) => return Ok(DriveState::new(session, account)),
            Err(e) => warn!(error = %e, "stored session rejected, logging in again"),
        }
    }

    let (session, account) = auth.authenticate(session).await.context("Login failed")?;
    Ok(DriveState::new(session, account))
}

/// Account data is only a marker of a previous login; validation returns a
/// fresh copy.
fn has_stored_account(path: &Path) -> bool {
    path.is_file()
}

fn persist(config: &ClientConfig, state: &DriveState, cache: Option<&Cache>) -> Result<()> {
    state
        .session
        .save(&config.session_file)
        .with_context(|| format!("Failed to save session to {:?}", config.session_file))?;
    state
        .account
        .save(&config.account_file)
        .with_context(|| format!("Failed to save account data to {:?}", config.account_file))?;
    if let Some(cache) = cache {
        cache
            .save(&config.cache_file)
            .with_context(|| format!("Failed to save cache to {:?}", config.cache_file))?;
    }
    Ok(())
}
