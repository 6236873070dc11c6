use clap::{Parser, Subcommand};
use galleria_core::GallerySort;
use galleria_server::{Config, build_engine, run_server};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "galleria")]
#[command(about = "Image catalog kept consistent across an object store and a metadata store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Report objects without records and records without objects, then exit
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "galleria=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config } => {
            tracing::info!("Starting Galleria server with config: {}", config);
            let cfg = load_config(&config);

            tracing::info!(
                "Bind: {}, object store: {}, metadata: {}",
                cfg.server.bind_addr,
                cfg.object_store.backend,
                cfg.metadata.sqlite_path.display()
            );

            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Check { config } => {
            let cfg = load_config(&config);
            if let Err(e) = run_check(&cfg).await {
                tracing::error!("Check failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_config(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_check(config: &Config) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let result = engine.list_gallery(GallerySort::default(), true).await?;
    let report = result.orphans.unwrap_or_default();

    println!("catalogued images: {}", result.images.len());
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_clean() {
        tracing::info!("Object store and metadata store agree");
    } else {
        tracing::warn!(
            "{} objects without records, {} records without objects",
            report.objects_without_metadata.len(),
            report.metadata_without_objects.len()
        );
    }
    Ok(())
}
