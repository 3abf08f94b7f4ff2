//! Relocatable source synthesis CLI.
//!
//! Provides the `resynth` binary. It reads a JSON manifest describing a
//! value heap, the scopes names resolve through and what to render, then
//! prints the synthesized source on stdout.
//!
//! Uses the same `resynth_emit` entry points a host embedding the library
//! would call, so both produce identical text.

mod manifest;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use resynth_core::SynthError;
use resynth_emit::{render_context, render_expression, render_source, DebugEntry, RenderOptions};
use resynth_source::SourceCache;

use manifest::{Manifest, ManifestError, Mode};

/// Environment variable supplying the debug path root when neither the
/// manifest nor the command line sets one.
const ROOT_ENV: &str = "RESYNTH_ROOT";

/// Synthesize relocatable source from a value manifest.
#[derive(Parser)]
#[command(name = "resynth", about = "Synthesize relocatable source from a value manifest")]
struct Cli {
    /// Path to the JSON manifest.
    manifest: PathBuf,

    /// Module whose objects are copied by value instead of imported.
    /// May be repeated.
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Copy the requested values themselves by value.
    #[arg(long)]
    force: bool,

    /// Rebind every relocated function through this decorator.
    #[arg(long)]
    decorator: Option<String>,

    /// Report debug file paths relative to this directory.
    #[arg(long)]
    relative_root: Option<PathBuf>,

    /// Write debug entries and existence-only names here as JSON.
    #[arg(long)]
    debug_info: Option<PathBuf>,
}

/// Side output written with `--debug-info`.
#[derive(Debug, Default, Serialize)]
struct DebugInfo {
    existence_only: BTreeSet<String>,
    debug_entries: Vec<DebugEntry>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli));
}

/// Returns exit code: 0 = success, 1 = synthesis error, 3 = I/O or
/// manifest error.
fn run(cli: Cli) -> i32 {
    let manifest = match Manifest::load(&cli.manifest) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let heap = match manifest.build_heap() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    let options = merge_options(
        manifest.options.clone(),
        &cli,
        std::env::var_os(ROOT_ENV).map(PathBuf::from),
    );
    tracing::debug!(?options, objects = heap.len(), "manifest loaded");

    let cache = SourceCache::new();
    let rendered = match &manifest.mode {
        Mode::Source => render_source(&heap, &cache, &manifest.items, &manifest.scopes, &options)
            .map(|out| {
                (
                    out.source,
                    DebugInfo {
                        existence_only: out.existence_only,
                        debug_entries: out.debug_entries,
                    },
                )
            }),
        Mode::Expression { value, invoke } => {
            render_expression(&heap, &cache, *value, &manifest.scopes, &options, *invoke).map(|out| {
                (
                    format!("{}{}\n", out.context, out.expression),
                    DebugInfo {
                        existence_only: out.existence_only,
                        ..DebugInfo::default()
                    },
                )
            })
        }
        Mode::Context { routines } => {
            render_context(&heap, &cache, routines, &manifest.scopes, &options).map(|out| {
                (
                    out.source,
                    DebugInfo {
                        existence_only: out.existence_only,
                        ..DebugInfo::default()
                    },
                )
            })
        }
    };

    let (source, debug) = match rendered {
        Ok(r) => r,
        Err(SynthError::Io { path, source }) => {
            eprintln!("I/O error reading {}: {}", path.display(), source);
            return 3;
        }
        Err(e) => {
            eprintln!("Synthesis error: {}", e);
            return 1;
        }
    };

    if let Some(path) = &cli.debug_info {
        if let Err(e) = write_debug_info(path, &debug) {
            eprintln!("Error: {}", e);
            return 3;
        }
    }
    print!("{}", source);
    0
}

/// Command line flags override the manifest; the environment only fills a
/// missing root.
fn merge_options(mut options: RenderOptions, cli: &Cli, env_root: Option<PathBuf>) -> RenderOptions {
    options.excluded_modules.extend(cli.exclude.iter().cloned());
    options.force_by_value |= cli.force;
    if cli.decorator.is_some() {
        options.decorator = cli.decorator.clone();
    }
    options.relative_root = cli
        .relative_root
        .clone()
        .or(options.relative_root)
        .or(env_root);
    options
}

fn write_debug_info(path: &Path, debug: &DebugInfo) -> Result<(), ManifestError> {
    let json = serde_json::to_string_pretty(debug)?;
    std::fs::write(path, json).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}
