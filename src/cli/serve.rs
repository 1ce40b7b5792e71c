use crate::cli::ServeArgs;
use crate::config::Config;
use crate::generate::{create_generator, Generator};
use crate::store::{Archive, SqliteArchive};
use crate::{build_router, AppState};
use std::sync::Arc;
use tracing::info;

pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    info!("Loading config from {:?}", args.config);
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database = database;
    }

    config.validate()?;

    info!("Database: {}", config.database.display());
    let archive = SqliteArchive::connect(&config.database).await?;
    archive.ensure_schema().await?;

    let config = Arc::new(config);
    let generator = create_generator(&config);
    info!(
        "Generation service: {} ({})",
        config.generation.base_url,
        generator.name()
    );

    let archive: Arc<dyn Archive> = Arc::new(archive);
    let state = AppState::new(config.clone(), generator, archive);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
