use crate::cli::InitArgs;
use crate::config::Config;
use crate::error::ConfigError;

pub fn execute(args: InitArgs) -> anyhow::Result<()> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.config.display()
        );
    }

    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).map_err(ConfigError::Parse)?;

    std::fs::write(&args.config, yaml).map_err(|e| ConfigError::WriteFile {
        path: args.config.clone(),
        source: e,
    })?;

    println!("Wrote default config to {}", args.config.display());
    Ok(())
}
