//! runjs CLI
//!
//! Serves the execution API, runs single files locally and maintains the
//! package workspaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runjs::{AppState, Config, EXAMPLE_CONFIG, ExecutionRequest, ModuleFlavor, Runner, janitor};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runjs")]
#[command(about = "Run JavaScript snippets with on-demand npm dependencies")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Run a source file through the full pipeline
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Module system of the source (esm, commonjs)
        #[arg(short, long, default_value = "esm")]
        module_type: ModuleFlavor,
    },

    /// List packages installed across workspaces
    Packages,

    /// Uninstall every package the workspaces have accumulated
    Cleanup {
        /// Run a single pass instead of repeating every interval
        #[arg(long)]
        once: bool,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path (default: runjs.toml)
        #[arg(short, long, default_value = "runjs.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Serve => serve(load_config(config_path)?).await,
        Commands::Run {
            source,
            module_type,
        } => run_file(&load_config(config_path)?, &source, module_type).await,
        Commands::Packages => {
            list_packages(&load_config(config_path)?).await;
            Ok(())
        }
        Commands::Cleanup { once } => cleanup(&load_config(config_path)?, once).await,
        Commands::ShowConfig => {
            show_config(&load_config(config_path)?);
            Ok(())
        }
    }
}

/// Embedded defaults, then the file if given, then `RUNJS_*` overrides
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        info!(?path, "loading configuration");
    } else {
        debug!("using default configuration");
    }
    Config::load(path).context("failed to load configuration")
}

async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(&config);

    if config.janitor.enabled {
        let runner = Arc::clone(&state.runner);
        let interval = config.janitor.interval();
        info!(?interval, "starting in-process janitor");
        tokio::spawn(async move {
            janitor::run_periodic(runner.store(), runner.package_manager(), interval).await;
        });
    }

    runjs::run_server(&config, state)
        .await
        .context("server failed")
}

async fn run_file(config: &Config, source: &Path, flavor: ModuleFlavor) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    info!(%flavor, "running program");

    let runner = Runner::new(config);
    let result = runner
        .execute(&ExecutionRequest::new(code, flavor))
        .await
        .context("execution failed")?;

    print!("{}", result.output);
    if !result.output.ends_with('\n') {
        println!();
    }

    for package in &result.installed_packages {
        debug!(name = %package.name, version = %package.version, "installed package");
    }

    if let Some(kind) = result.error_kind {
        warn!(%kind, "program failed");
        std::process::exit(1);
    }
    Ok(())
}

async fn list_packages(config: &Config) {
    let runner = Runner::new(config);
    let packages = runner.installed_packages().await;

    if packages.is_empty() {
        println!("No packages installed");
        return;
    }

    for package in packages {
        println!("  {:<30} {}", package.name, package.version);
    }
}

async fn cleanup(config: &Config, once: bool) -> Result<()> {
    let runner = Runner::new(config);

    if !once {
        janitor::run_periodic(runner.store(), runner.package_manager(), config.janitor.interval())
            .await;
        return Ok(());
    }

    let reports = janitor::run_once(runner.store(), runner.package_manager()).await;
    let mut failed = false;
    for report in &reports {
        match &report.error {
            Some(e) => {
                eprintln!("{}: {e}", report.flavor);
                failed = true;
            }
            None => println!("{}: removed {} package(s)", report.flavor, report.removed.len()),
        }
    }

    if failed {
        anyhow::bail!("cleanup failed for at least one workspace");
    }
    Ok(())
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root.display());
    for flavor in ModuleFlavor::ALL {
        println!("  {flavor}: {}", config.workspace_dir(flavor).display());
    }
    println!();
    println!("Node binary: {}", config.node_binary().display());
    println!("npm binary: {}", config.npm_binary().display());
    println!();
    println!("Limits:");
    println!("  Run timeout: {:?}", config.limits.run_timeout());
    println!("  Install timeout: {:?}", config.limits.install_timeout());
    println!("  Max output: {:?} bytes", config.limits.max_output);
    println!();
    println!("Rate limit:");
    println!("  Window: {:?}", config.rate_limit.window());
    println!("  Per client: {}", config.rate_limit.max_per_client);
    println!("  Global: {}", config.rate_limit.max_global);
    println!("  Client headers: {}", config.rate_limit.client_headers.join(", "));
    println!();
    println!("Bind address: {}", config.server.bind_address);
    println!(
        "Janitor: {} (every {:?})",
        if config.janitor.enabled { "enabled" } else { "disabled" },
        config.janitor.interval()
    );
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
