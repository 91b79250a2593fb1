//! Google Drive sync for Linux
//!
//! Uploads a local directory tree to Google Drive, once or on a recurring
//! interval, authorizing through the browser on first use.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use drive_sync::auth::google_auth::{AuthOptions, GoogleAuth};
use drive_sync::auth::oauth_client::{ClientSecret, OAuthClient};
use drive_sync::auth::token_store::TokenStore;
use drive_sync::config::ProjectConfig;
use drive_sync::drive_service::drive_client::DriveClient;
use drive_sync::error::{AuthError, SyncError};
use drive_sync::log_appender::setup_logging;
use drive_sync::scheduler::{run_with_timeout, SimpleTaskManager};
use drive_sync::sync::SyncService;

#[derive(Parser)]
#[command(name = "drive-sync", version, about = "Upload a local directory tree to Google Drive")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize access to Google Drive and store the credential
    Auth,
    /// Upload a directory tree
    Sync {
        /// Directory to upload (defaults to `sync_root` from the settings)
        path: Option<PathBuf>,

        /// Run a single pass and exit
        #[arg(long)]
        once: bool,

        /// Seconds between passes (overrides the settings)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_config = match &cli.config {
        Some(path) => ProjectConfig::with_settings_file(path),
        None => ProjectConfig::new(),
    }
    .context("Failed to load configuration")?;

    let level = if cli.verbose {
        "debug"
    } else {
        project_config.settings.log_level.as_str()
    };
    setup_logging(&project_config.data_dir, level).context("Failed to setup logging")?;
    if project_config.settings_created {
        warn!(
            "Settings file {} not found - created default config",
            project_config.settings_path.display()
        );
    }

    let auth = Arc::new(build_auth(&project_config)?);

    match cli.command {
        Commands::Auth => {
            if let Err(e) = auth.authorize().await {
                print_reauthorization_hint(&auth, &e);
                return Err(e).context("Failed to authorize");
            }
            println!("Authorization complete.");
            Ok(())
        }
        Commands::Sync {
            path,
            once,
            interval,
        } => {
            let root = path
                .or_else(|| project_config.settings.sync_root.clone())
                .ok_or_else(|| anyhow!("No directory given and no sync_root configured"))?;
            let every = interval
                .map(Duration::from_secs)
                .unwrap_or(project_config.settings.sync_config.sync_interval);
            let run_timeout = project_config.settings.sync_config.run_timeout;

            if let Err(e) = auth.ensure_authenticated().await {
                print_reauthorization_hint(&auth, &e);
                return Err(e).context("Failed to authorize");
            }
            info!("Credential ready");

            run_sync(auth, root, once, every, run_timeout).await
        }
    }
}

fn build_auth(project_config: &ProjectConfig) -> Result<GoogleAuth> {
    let secret_path = project_config.client_secret_path();
    let secret = ClientSecret::from_file(&secret_path).with_context(|| {
        format!(
            "Unable to load the OAuth client secret from {}",
            secret_path.display()
        )
    })?;

    let options = AuthOptions {
        callback_port: project_config.settings.callback_port,
        open_browser: project_config.settings.open_browser,
    };

    Ok(GoogleAuth::new(
        Arc::new(OAuthClient::new(secret)),
        TokenStore::new(project_config.token_path()),
        options,
    ))
}

async fn run_sync(
    auth: Arc<GoogleAuth>,
    root: PathBuf,
    once: bool,
    every: Duration,
    run_timeout: Option<Duration>,
) -> Result<()> {
    let client = Arc::new(DriveClient::new(auth.clone()));
    let service = Arc::new(SyncService::new(client));
    let root = Arc::new(root);

    let job = move || {
        let auth = auth.clone();
        let service = service.clone();
        let root = root.clone();
        async move { sync_pass(&auth, &service, &root).await }
    };

    if once {
        return run_with_timeout(&job, run_timeout).await;
    }

    let mut manager = SimpleTaskManager::new();
    manager.start_sync_task(every, run_timeout, job);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, stopping");
    manager.shutdown().await;
    Ok(())
}

async fn sync_pass(
    auth: &GoogleAuth,
    service: &SyncService<DriveClient>,
    root: &Path,
) -> Result<()> {
    if let Err(e) = auth.ensure_authenticated().await {
        print_reauthorization_hint(auth, &e);
        return Err(e).context("Credential is not usable");
    }

    match service.sync(root).await {
        Ok(report) => {
            info!(
                "Synced {} folders and {} files from {}",
                report.folders,
                report.files,
                root.display()
            );
            Ok(())
        }
        Err(e) => {
            if let Some(auth_error) = auth_error_of(&e) {
                print_reauthorization_hint(auth, auth_error);
            }
            Err(e).with_context(|| format!("Sync of {} failed", root.display()))
        }
    }
}

fn auth_error_of(e: &SyncError) -> Option<&AuthError> {
    match e {
        SyncError::Remote { source, .. } => source.as_auth_error(),
        _ => None,
    }
}

fn print_reauthorization_hint(auth: &GoogleAuth, e: &AuthError) {
    error!("Authorization error: {}", e);
    eprintln!("{}", auth.reauthorization_hint(e));
}
