use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use stac_sync::cache::CachedCatalog;
use stac_sync::download::Downloader;
use stac_sync::progress::TerminalProgress;
use stac_sync::search::{Catalog, SearchClient};
use stac_sync::sync::Synchronizer;
use stac_sync::Settings;
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "stac-sync.toml";
const DEFAULT_HOST: &str = "default";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Print the resolved settings for the selected host.
    ShowSettings,
    /// Print the id and title of every collection in the catalogue.
    ShowCollectionIds,
    /// Download every asset in the selected collections.
    DownloadFiles,
}

#[derive(Parser, Debug)]
#[command(about = "Mirror the assets of a STAC-like catalogue to local storage")]
struct Cli {
    action: Action,

    /// Path to the TOML settings file.
    #[arg(long, alias = "config", default_value = DEFAULT_CONFIG_PATH)]
    config_path: PathBuf,

    /// Settings profile to use.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Restrict downloads to these collections. All collections when omitted.
    #[arg(long, num_args = 0..)]
    collection_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let settings = Settings::load(&cli.config_path, &cli.host)
        .with_context(|| format!("Loading settings for host '{}'", cli.host))?;

    let client = reqwest::Client::new();
    let search = SearchClient::new(client.clone(), settings.auth_token(), settings.catalogue_url());

    match settings.cache_duration_mins() {
        Some(mins) if mins > 0 => {
            let cached = CachedCatalog::in_data_dir(
                search,
                settings.catalogue_url(),
                settings.data_dir(),
                mins,
            );
            run(cli, &settings, &cached, client).await
        }
        _ => run(cli, &settings, &search, client).await,
    }
}

async fn run<C: Catalog>(
    cli: Cli,
    settings: &Settings,
    catalog: &C,
    client: reqwest::Client,
) -> Result<()> {
    match cli.action {
        Action::ShowSettings => {
            print!("{settings}");
        }
        Action::ShowCollectionIds => {
            for collection in catalog.list_collections().await? {
                println!("{collection}");
            }
        }
        Action::DownloadFiles => {
            if settings.add_to_active_map() {
                warn!("add_to_active_map has no effect outside a host application");
            }

            let mut sync = Synchronizer::new(settings, catalog, Downloader::new(client))
                .with_progress(TerminalProgress::new());
            let report = sync.run(&cli.collection_ids).await?;
            info!(files = report.downloaded.len(), "Sync complete");

            if !report.unresolved.is_empty() {
                println!("Collections with downloads that could not be completed:");
                for collection_id in &report.unresolved {
                    println!("{collection_id}");
                }
            }
        }
    }
    Ok(())
}
