//! Mercury setup deployer CLI
//!
//! Entry point for the `mercury-deploy` command-line tool.

use clap::{Parser, Subcommand};
use mercury_deployer::bundle::MtimePolicy;
use mercury_deployer::{ConfigLayer, Deployer, EffectiveConfig};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mercury-deploy")]
#[command(about = "Package a staging directory into a content-addressed setup artifact", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (default: ./deploy.toml when present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    pack: PackArgs,
}

#[derive(clap::Args)]
struct PackArgs {
    /// Staging directory to package
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Setup directory to publish into
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Product name (launcher defaults to <name>Launcher.exe)
    #[arg(long)]
    name: Option<String>,

    /// Launcher file name override
    #[arg(long)]
    launcher: Option<String>,

    /// Skip publishing the launcher copy
    #[arg(long)]
    no_launcher: bool,

    /// Digest length in bytes
    #[arg(long)]
    digest_len: Option<usize>,

    /// Record every archived entry at the Unix epoch
    #[arg(long)]
    epoch_mtime: bool,
}

impl PackArgs {
    fn into_layer(self) -> ConfigLayer {
        ConfigLayer {
            name: self.name,
            input: self.input,
            output: self.output,
            launcher_name: self.launcher,
            digest_len: self.digest_len,
            mtime: self.epoch_mtime.then_some(MtimePolicy::Epoch),
            copy_launcher: self.no_launcher.then_some(false),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identifier currently named by the version marker
    Current {
        /// Setup directory to inspect
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration and its sources
    Config,
}

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config_path = EffectiveConfig::discover(cli.config.as_deref(), Path::new("."));

    match cli.command {
        None => run_pack(config_path, cli.pack.into_layer(), cli.json),
        Some(Commands::Current { output }) => {
            let layer = ConfigLayer {
                output,
                ..Default::default()
            };
            run_current(config_path, layer, cli.json);
        }
        Some(Commands::Config) => run_config(config_path, cli.pack.into_layer()),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "info,mercury_deployer=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_path: Option<PathBuf>, layer: ConfigLayer) -> EffectiveConfig {
    match EffectiveConfig::build(config_path.as_deref(), layer) {
        Ok(effective) => effective,
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    }
}

fn run_pack(config_path: Option<PathBuf>, layer: ConfigLayer, json: bool) {
    let effective = load_config(config_path, layer);

    tracing::info!("{} setup deployer v{}", effective.config.name, env!("CARGO_PKG_VERSION"));

    let deployer = Deployer::new(effective.config);
    match deployer.run() {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        tracing::error!("failed to serialize report: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                println!("{}", report.id);
            }
            tracing::info!("setup deployer completed successfully");
        }
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_current(config_path: Option<PathBuf>, layer: ConfigLayer, json: bool) {
    let effective = load_config(config_path, layer);
    let deployer = Deployer::new(effective.config);

    match deployer.current_version() {
        Ok(Some(id)) => {
            if json {
                let out = serde_json::json!({
                    "id": id.as_str(),
                    "timestamp_millis": id.timestamp_millis(),
                });
                println!("{}", out);
            } else {
                println!("{}", id);
            }
        }
        Ok(None) => {
            tracing::error!(
                "no version marker in {}",
                deployer.config().output.display()
            );
            process::exit(1);
        }
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_config(config_path: Option<PathBuf>, layer: ConfigLayer) {
    let effective = load_config(config_path, layer);
    match effective.to_json() {
        Ok(out) => println!("{}", out),
        Err(e) => {
            tracing::error!("failed to serialize config: {}", e);
            process::exit(1);
        }
    }
}
