//! vabridge - Format the va_list requests a native library sends back
//!
//! This tool loads a native library, calls one of its entry points with a
//! format callback, and prints every string the library asks to format.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, Level};
use tracing_subscriber::EnvFilter;
use vabridge_core::{Dispatch, Platform};

/// Stem of the demo library built from `native/library.c`
const DEFAULT_LIBRARY_STEM: &str = "nativeLibrary";

/// Directory the demo library is built into
const DEFAULT_LIBRARY_DIR: &str = "native/build";

/// Format va_list requests issued by a native library
#[derive(Parser, Debug)]
#[command(name = "vabridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Native library to load (default: native/build/lib<stem>.<arch>.<ext>)
    #[arg(short, long, env = "VABRIDGE_LIBRARY")]
    library: Option<PathBuf>,

    /// Exported entry point that issues format requests
    #[arg(short, long, env = "VABRIDGE_ENTRY", default_value = "triggerCallback")]
    entry: String,

    /// Largest accepted formatted output in bytes (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_output: usize,

    /// Print the resolved dispatch and exit
    #[arg(long)]
    show_dispatch: bool,

    /// Operating system to resolve the dispatch for (default: this host)
    #[arg(long, requires = "show_dispatch")]
    os: Option<String>,

    /// Architecture to resolve the dispatch for (default: this host)
    #[arg(long, requires = "show_dispatch")]
    arch: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn platform(&self) -> Platform {
        let host = Platform::host();
        Platform::new(
            self.os.clone().unwrap_or(host.os),
            self.arch.clone().unwrap_or(host.arch),
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    // Unsupported platforms stop here, before any request
    let platform = cli.platform();
    let dispatch = Dispatch::resolve(&platform)
        .with_context(|| format!("No va_list wiring for {}", platform))?;

    if cli.show_dispatch {
        println!("{}", dispatch);
        return Ok(());
    }

    run(&cli, &dispatch)
}

/// Resolve the library path from the flag or the platform default
#[cfg_attr(not(unix), allow(dead_code))]
fn library_path(cli: &Cli, dispatch: &Dispatch) -> PathBuf {
    cli.library.clone().unwrap_or_else(|| {
        PathBuf::from(DEFAULT_LIBRARY_DIR).join(dispatch.library_file_name(DEFAULT_LIBRARY_STEM))
    })
}

#[cfg(unix)]
fn run(cli: &Cli, dispatch: &Dispatch) -> Result<()> {
    use tracing::{debug, info};
    use vabridge_core::loader::resolve_entry;
    use vabridge_core::{DynamicLibrary, Formatter, FormatterConfig, NativePrimitives, Session};

    println!("{}", dispatch.arch().label());

    let primitives = NativePrimitives::for_dispatch(dispatch)?;
    let config = FormatterConfig::new().max_output_len(cli.max_output);
    let formatter = Formatter::with_config(dispatch, primitives, config);

    let path = library_path(cli, dispatch);
    info!("Loading {}", path.display());
    let library = DynamicLibrary::open(&path)
        .with_context(|| format!("Failed to load native library: {}", path.display()))?;

    // SAFETY: the entry point is declared as `void f(callback cb)` and
    // builds its va_lists with the host calling convention.
    let entry = unsafe { resolve_entry(&library, &cli.entry) }
        .with_context(|| format!("Failed to locate the {} function", cli.entry))?;
    let outputs = unsafe { Session::new(formatter).trigger(entry) }?;
    debug!("{} returned {} request(s)", cli.entry, outputs.len());

    report(outputs)
}

#[cfg(not(unix))]
fn run(_cli: &Cli, dispatch: &Dispatch) -> Result<()> {
    bail!("Loading native libraries is not supported on {}", dispatch.os().as_str())
}

/// Print each formatted request, failing if any of them failed
fn report(outputs: Vec<vabridge_core::Result<String>>) -> Result<()> {
    let mut failed = 0;
    for output in outputs {
        match output {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} format request(s) failed", failed);
    }
    Ok(())
}
