use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use kindling::boot::BootSequencer;
use kindling::config::BootConfig;
use kindling::error::NativeLoaderError;
use kindling::manifest::{NativeManifest, RuntimeInit};
use kindling::registry::NativeLibraryRegistry;

/// Kindling - boots a multimedia application's native libraries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the boot configuration file
    #[arg(short, long, default_value = "boot.json")]
    config: PathBuf,

    /// Path to the native resource manifest
    #[arg(short, long, default_value = "natives.json")]
    manifest: PathBuf,

    /// Path to a packaged native archive to unpack during staging
    #[arg(short = 'a', long)]
    natives_archive: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Skip checksum verification of staged payloads (development only)
    #[arg(long)]
    skip_checksums: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Log to stderr so diagnostics survive stdout redirection.
    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    let mut config = BootConfig::load_or_create(&args.config)?;
    if args.skip_checksums {
        config.skip_checksum_verification = true;
    }

    let manifest = NativeManifest::load_from_file(&args.manifest)?;

    let mut sequencer = BootSequencer::new(config.clone(), manifest.clone());
    if let Some(archive_path) = &args.natives_archive {
        let bytes = std::fs::read(archive_path).with_context(|| {
            format!("Failed to read native archive at {}", archive_path.display())
        })?;
        sequencer = sequencer.with_embedded_archive(bytes);
    }

    info!("Please wait, booting...");

    let outcome = sequencer.run(|registry| match &manifest.runtime_init {
        Some(init) => initialize_runtime(registry, init, config.enable_extended_debugging),
        None => Ok(()),
    });

    match outcome {
        Ok(_registry) => {
            info!("Ready.");
            Ok(())
        }
        Err(e) => {
            // Distinguished exit code for any Failed transition, after the
            // diagnostic has gone to stderr.
            tracing::error!("Boot failed: {e}");
            eprintln!("kindling: boot failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Post-load runtime initialization, named by the manifest.
///
/// This is the consumer boundary: the only place a resolved symbol is cast to
/// a concrete call signature.
fn initialize_runtime(
    registry: &NativeLibraryRegistry,
    init: &RuntimeInit,
    extended_debugging: bool,
) -> Result<(), NativeLoaderError> {
    let library = registry.retrieve(&init.library)?;

    let entry = library.symbol(&init.symbol)?;
    info!("Initializing runtime via '{}'", init.symbol);

    // Safety: the manifest promises `symbol` is `extern "C" fn() -> i32`.
    // A wrong manifest is undefined behavior; that contract belongs to the
    // packaging tooling that generates the manifest.
    let init_fn: unsafe extern "C" fn() -> i32 = unsafe { std::mem::transmute(entry.as_ptr()) };
    let code = unsafe { init_fn() };

    if code != 0 {
        return Err(NativeLoaderError::RuntimeInit(format!(
            "'{}' returned {code}",
            init.symbol
        )));
    }

    if extended_debugging {
        match init.debug_symbol.as_deref() {
            Some(symbol) => match library.optional_symbol(symbol) {
                Some(pointer) => {
                    info!("Enabling extended runtime debugging via '{symbol}'");
                    // Safety: same manifest contract, `extern "C" fn()`.
                    let debug_fn: unsafe extern "C" fn() =
                        unsafe { std::mem::transmute(pointer.as_ptr()) };
                    unsafe { debug_fn() };
                }
                None => warn!("Extended debugging requested but '{symbol}' is not exported"),
            },
            None => warn!("Extended debugging requested but the manifest names no debug symbol"),
        }
    }

    Ok(())
}
