//! Gatehouse - a static file server behind HTTP Basic authentication
//!
//! This is the main entry point for the Gatehouse CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gatehouse_core::config::{ConfigLoader, GatehouseConfig};
use gatehouse_server::shutdown;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Gatehouse - serve a directory behind HTTP Basic authentication
#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (the default when no subcommand is given)
    Run(RunArgs),

    /// Validate a configuration file
    Validate {
        /// Path to a JSON or TOML config file
        config: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Args, Default)]
struct RunArgs {
    /// JSON or TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. `:4444` or `127.0.0.1:8080`
    #[arg(long)]
    listen: Option<String>,

    /// Directory to serve
    #[arg(long)]
    root: Option<PathBuf>,

    /// Realm sent in the authentication challenge
    #[arg(long)]
    realm: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        None => run(cli.run),
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Validate { config }) => {
            validate(&config);
            Ok(())
        }
        Some(Commands::Version) => {
            println!("Gatehouse v{}", gatehouse_core::VERSION);
            Ok(())
        }
    }
}

/// Defaults, then config file, then `GATEHOUSE_*` variables, then flags
fn load_config(args: &RunArgs) -> anyhow::Result<GatehouseConfig> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("📄 Loading configuration from {}", path.display());
            ConfigLoader::load(path)?
        }
        None => GatehouseConfig::default(),
    };

    ConfigLoader::apply_env(&mut config)?;

    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(root) = &args.root {
        config.root = root.clone();
    }
    if let Some(realm) = &args.realm {
        config.auth.realm = realm.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args).context("Invalid configuration")?;

    tracing::info!("🚀 Starting Gatehouse v{}", gatehouse_core::VERSION);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    let result = runtime.block_on(async {
        let (handle, signal) = shutdown::channel();
        tokio::spawn(shutdown::trigger_on_interrupt(handle));

        gatehouse_server::run_server(&config, signal).await
    });

    // Connections past their grace period are abandoned here
    runtime.shutdown_timeout(Duration::from_millis(100));

    result?;
    tracing::info!("👋 Gatehouse stopped");
    Ok(())
}

fn validate(path: &Path) {
    tracing::info!("Validating config: {}", path.display());

    match ConfigLoader::load(path).and_then(|c| c.validate()) {
        Ok(()) => {
            println!("✅ Configuration '{}' is valid!", path.display());
        }
        Err(e) => {
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_runs_with_defaults() {
        let cli = Cli::try_parse_from(["gatehouse"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.run.config.is_none());
        assert!(cli.run.listen.is_none());
    }

    #[test]
    fn test_flags_without_subcommand() {
        let cli = Cli::try_parse_from(["gatehouse", "--listen", ":8080", "--root", "/srv"]).unwrap();
        assert_eq!(cli.run.listen.as_deref(), Some(":8080"));
        assert_eq!(cli.run.root, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn test_flags_override_config() {
        let tmp = tempfile::tempdir().unwrap();
        let args = RunArgs {
            listen: Some("127.0.0.1:9999".to_string()),
            root: Some(tmp.path().to_path_buf()),
            realm: Some("vault".to_string()),
            ..Default::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.root, tmp.path());
        assert_eq!(config.auth.realm, "vault");
    }

    #[test]
    fn test_password_is_not_a_flag() {
        assert!(Cli::try_parse_from(["gatehouse", "--password", "x"]).is_err());
    }
}
