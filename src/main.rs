use clap::Parser;
use crowdwork::cli::{Cli, Commands};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing - only show logs with --verbose
    let filter = if cli.verbose {
        EnvFilter::new("crowdwork=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crowdwork=info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Serve(args) => crowdwork::cli::serve::execute(args).await,
        Commands::Init(args) => crowdwork::cli::init::execute(args),
        Commands::Schema => crowdwork::cli::schema::execute(),
    }
}
