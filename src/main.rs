//! ccache-sync CLI
//!
//! Entry point for the `ccache-sync` command-line tool used by build drivers.

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use ccache_sync::{
    plan_cache_dir, CCacheConfig, CCacheManager, CancelFlag, SyncError, SyncOptions,
    EXIT_CODE_CANCELLED,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ccache-sync")]
#[command(about = "Share ccache directories between build workers by package group", version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which cache group a package belongs to
    Resolve {
        /// Path to the ccache configuration (JSON or .toml)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Package name
        #[arg(long, short = 'p')]
        package: String,

        /// Target architecture, used with --root to print the cache directory
        #[arg(long, short = 'a')]
        arch: Option<String>,

        /// Local cache root
        #[arg(long, short = 'r')]
        root: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and report suspicious entries
    Verify {
        /// Path to the ccache configuration (JSON or .toml)
        #[arg(long, short = 'c')]
        config: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Download and unpack a package's group cache before building it
    Download(PackageArgs),

    /// Archive and upload a package's group cache after building it
    Upload(PackageArgs),

    /// Upload every shared group cache found under the cache root
    UploadAll {
        #[command(flatten)]
        common: CommonArgs,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the ccache configuration (JSON or .toml)
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Local cache root
    #[arg(long, short = 'r')]
    root: PathBuf,

    /// Seconds to wait for a group lock held by another build
    #[arg(long, default_value_t = 600)]
    lock_timeout_secs: u64,
}

#[derive(Args)]
struct PackageArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Target architecture
    #[arg(long, short = 'a')]
    arch: String,

    /// Package name
    #[arg(long, short = 'p')]
    package: String,

    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Resolve {
            config,
            package,
            arch,
            root,
            json,
        } => run_resolve(&config, &package, arch.as_deref(), root.as_deref(), json),
        Commands::Verify { config, json } => run_verify(&config, json),
        Commands::Download(args) => run_download(args),
        Commands::Upload(args) => run_upload(args),
        Commands::UploadAll { common, json } => run_upload_all(common, json),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run_resolve(
    config_path: &Path,
    package: &str,
    arch: Option<&str>,
    root: Option<&Path>,
    json: bool,
) {
    let config = load_config(config_path);
    let group = config.find_group(package);

    let cache_dir = match (root, arch) {
        (Some(root), Some(arch)) => match plan_cache_dir(root, arch, group.name()) {
            Ok(dir) => Some(dir),
            Err(e) => fail(e),
        },
        _ => None,
    };

    if json {
        #[derive(Serialize)]
        struct Resolution<'a> {
            package: &'a str,
            group: &'a ccache_sync::GroupIdentity,
            #[serde(skip_serializing_if = "Option::is_none")]
            cache_dir: Option<&'a PathBuf>,
        }
        print_json(&Resolution {
            package,
            group: &group,
            cache_dir: cache_dir.as_ref(),
        });
    } else {
        println!("{}: {}", package, group);
        if let Some(dir) = cache_dir {
            println!("  cache dir: {}", dir.display());
        }
    }
}

fn run_verify(config_path: &Path, json: bool) {
    let config = load_config(config_path);
    let warnings = config.lint();

    if json {
        print_json(&serde_json::json!({
            "config": config_path,
            "groups": config.groups.len(),
            "remote_store": config.remote_store.redacted(),
            "warnings": warnings,
        }));
        return;
    }

    println!("Configuration valid: {}", config_path.display());
    println!();
    println!("  Store type: {}", config.remote_store.kind);
    println!("  Groups: {}", config.groups.len());
    println!(
        "  Download: {} (folder {})",
        config.remote_store.download_enabled, config.remote_store.download_folder
    );
    println!(
        "  Upload: {} (folder {}, update latest {})",
        config.remote_store.upload_enabled,
        config.remote_store.upload_folder,
        config.remote_store.update_latest
    );
    if !warnings.is_empty() {
        println!();
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
}

fn run_download(args: PackageArgs) {
    let mut manager = build_manager(&args.common);
    if let Err(e) = manager.set_package(&args.package, &args.arch) {
        fail(e);
    }
    match manager.download_pkg_group_ccache() {
        Ok(outcome) if args.json => print_json(&outcome),
        Ok(outcome) => match outcome.report() {
            Some(report) => println!(
                "Downloaded {} ({} bytes) into {}",
                report.remote_archive,
                report.archive_bytes,
                report.cache_dir.display()
            ),
            None => println!("Nothing downloaded"),
        },
        Err(e) => fail(e),
    }
}

fn run_upload(args: PackageArgs) {
    let mut manager = build_manager(&args.common);
    if let Err(e) = manager.set_package(&args.package, &args.arch) {
        fail(e);
    }
    match manager.upload_pkg_group_ccache() {
        Ok(outcome) if args.json => print_json(&outcome),
        Ok(outcome) => match outcome.report() {
            Some(report) => println!(
                "Uploaded {} ({} bytes, sha256 {})",
                report.remote_archive, report.archive_bytes, report.archive_sha256
            ),
            None => println!("Nothing uploaded"),
        },
        Err(e) => fail(e),
    }
}

fn run_upload_all(common: CommonArgs, json: bool) {
    let mut manager = build_manager(&common);
    let report = manager.sweep();

    if json {
        print_json(&report);
    } else {
        println!(
            "Swept {}: {} uploaded, {} failed, {} entries",
            report.root.display(),
            report.uploaded(),
            report.failed(),
            report.entries.len()
        );
    }

    if manager.cancel_flag().is_cancelled() {
        fail(SyncError::Cancelled);
    }
    if let Err(e) = report.into_result() {
        fail(e);
    }
}

fn build_manager(args: &CommonArgs) -> CCacheManager {
    let cancel = CancelFlag::new();
    if let Err(e) = cancel.install_signal_handler() {
        eprintln!("Warning: could not install signal handler: {}", e);
    }

    let options = SyncOptions {
        lock_timeout: Duration::from_secs(args.lock_timeout_secs),
    };
    debug!(lock_timeout_secs = args.lock_timeout_secs, "sync options");

    match CCacheManager::initialize(&args.config, &args.root) {
        Ok(manager) => manager.with_options(options).with_cancel_flag(cancel),
        Err(e) => fail(e),
    }
}

fn load_config(path: &Path) -> CCacheConfig {
    match CCacheConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn fail(err: SyncError) -> ! {
    eprintln!("Error: {}", err);
    match err {
        SyncError::Cancelled => process::exit(EXIT_CODE_CANCELLED),
        _ => process::exit(1),
    }
}
