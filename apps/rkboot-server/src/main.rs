use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;

use rkboot::{Boot, BootConfigSource, BootOptions, EmbeddedFs, Entry, StaticFs};
use rkboot_bootstrap::{
    default_logging_config, flush_all, init_logging_unified, AppConfig, CliArgs, LoadedConfig, DEFAULT_BOOT_FILE,
};

mod greeter;
mod registered_entries;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Boot file compiled into the binary; used when no `--config` is given.
static EMBEDDED: StaticFs = StaticFs::new(&[(DEFAULT_BOOT_FILE, include_bytes!("../boot.yaml"))]);

/// Name of the http entry the demo routes are attached to.
const GREETER_ENTRY: &str = "greeter";

/// rkboot demo server - entries wired from a boot file
#[derive(Parser)]
#[command(name = "rkboot-server")]
#[command(about = "rkboot demo server - entries wired from a boot file")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the boot file (defaults to the embedded boot.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective app/logging configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate the boot file and registered entries, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let loaded = boot_source(cli.config.clone()).resolve()?;

    // Layered config:
    // 1) defaults -> 2) boot file -> 3) env (RKBOOT__*) -> 4) CLI overrides
    let mut config = AppConfig::from_raw(&loaded.raw)?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_else(default_logging_config);
    init_logging_unified(&logging_config, &loaded.dir);

    tracing::info!(app = %config.app.name, origin = %loaded.origin, "rkboot server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(loaded).await,
        Commands::Check => check_config(loaded, &config),
    };

    if let Err(e) = &result {
        tracing::error!(error = ?e, "rkboot server failed");
    }
    flush_all();
    result
}

fn boot_source(config: Option<PathBuf>) -> BootConfigSource {
    match config {
        Some(path) => BootConfigSource::path(path),
        None => {
            let embedded: Arc<dyn EmbeddedFs> = Arc::new(EMBEDDED);
            BootConfigSource::embedded(embedded, DEFAULT_BOOT_FILE)
        }
    }
}

async fn run_server(loaded: LoadedConfig) -> Result<()> {
    let boot = Boot::from_loaded(loaded, BootOptions::default())?;

    match http_entry::get_http_entry(boot.registry(), GREETER_ENTRY) {
        Some(http) => http.add_routes(greeter::routes(boot.registry()))?,
        None => tracing::warn!(entry = GREETER_ENTRY, "no http entry for the greeter routes"),
    }

    boot.add_shutdown_hook("goodbye", || tracing::info!("shutdown hooks running"));

    if let Err(e) = boot.bootstrap().await {
        // release whatever did start before reporting
        boot.interrupt().await?;
        return Err(e.into());
    }
    let sig = boot.wait_for_shutdown_sig().await?;
    tracing::info!(signal = %sig, "rkboot server stopped");
    Ok(())
}

fn check_config(loaded: LoadedConfig, config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let boot = Boot::from_loaded(loaded, BootOptions::default())?;

    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);

    let mut keys = boot.registry().keys();
    keys.sort();
    for key in keys {
        let desc = boot
            .registry()
            .get(&key.entry_type, &key.name)
            .map(|e| e.description().to_string())
            .unwrap_or_default();
        println!("entry {key}: {desc}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkboot::ConfigOrigin;

    #[test]
    fn embedded_boot_file_is_the_default_source() {
        let loaded = boot_source(None).resolve().unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::Embedded(PathBuf::from(DEFAULT_BOOT_FILE)));

        let config = AppConfig::from_raw(&loaded.raw).unwrap();
        assert_eq!(config.app.name, "rkboot-demo");
    }

    #[tokio::test]
    async fn embedded_boot_file_wires_metrics_into_greeter() {
        let loaded = boot_source(None).resolve().unwrap();
        let boot = Boot::from_loaded(loaded, BootOptions::default()).unwrap();

        let greeter = http_entry::get_http_entry(boot.registry(), GREETER_ENTRY).unwrap();
        let prom = greeter.prom().expect("prom entry attached");
        assert_eq!(prom.config().path, "/metrics");
    }

    #[test]
    fn config_flag_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.yaml");
        std::fs::write(&file, "app:\n  name: from-disk\n").unwrap();

        let loaded = boot_source(Some(file.clone())).resolve().unwrap();
        assert_eq!(loaded.origin, ConfigOrigin::File(file));
        assert_eq!(AppConfig::from_raw(&loaded.raw).unwrap().app.name, "from-disk");
    }
}
