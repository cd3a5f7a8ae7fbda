//! # medidup CLI
//!
//! Command-line front end for the media identity and equivalence engine:
//! `dedup` prints equivalence classes within one or more trees as a
//! commented removal script; `tidy` consolidates survivors into an output
//! tree laid out by shooting date.
//!
//! This binary is an external collaborator of the core library: it owns
//! argument parsing, configuration merging, logging, and JSON/human output
//! selection. The equivalence engine itself lives in `medidup-core`.

mod config;

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;

use config::{CliOverrides, ResolvedConfig};
use medidup_core::{
    find_duplicates, fsops, persist_exif_cache, plan_placement, write_index_snapshot_for_root,
    CancellationToken, FinderOptions, Index, MedidupError, OperationResponse, PlacementOutcome,
    PlanOptions, ProgressEvent, Result,
};

// ============================================================================
// Output format
// ============================================================================

#[derive(Clone, Copy, Debug)]
enum OutputFormat {
    Human,
    Json,
}

/// `--json` always wins; otherwise auto-detect: human output to a terminal,
/// JSON when stdout is piped, matching how other dual-mode CLIs in this
/// ecosystem behave.
fn determine_output_format(json_flag: bool) -> OutputFormat {
    if json_flag {
        OutputFormat::Json
    } else if atty::is(atty::Stream::Stdout) {
        OutputFormat::Human
    } else {
        OutputFormat::Json
    }
}

// ============================================================================
// CLI surface
// ============================================================================

#[derive(Parser)]
#[command(
    name = "medidup",
    version,
    about = "Find and consolidate duplicate photos, videos, and audio",
    long_about = "medidup walks one or more directory trees of media captured by cameras\n\
                  and phones, detects duplicate and near-duplicate items through a tiered\n\
                  cascade of fingerprints, and can consolidate survivors into an output tree\n\
                  laid out by shooting date.",
    after_help = "EXAMPLES:\n  \
                  medidup dedup ~/Photos ~/Backup\n  \
                  medidup dedup ~/Photos --prefer-remove trash --json\n  \
                  medidup tidy -o ~/Archive -n ~/Photos\n  \
                  medidup tidy -o ~/Archive -m ~/Photos ~/Backup"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print equivalence classes within one or more trees
    Dedup(DedupArgs),
    /// Place media from input trees into an output tree by shooting date
    Tidy(TidyArgs),
}

#[derive(Args)]
#[command(
    about = "Print equivalence classes within one or more trees",
    after_help = "EXAMPLES:\n  \
                  medidup dedup ~/Photos\n  \
                  medidup dedup ~/Photos ~/Backup --prefer-remove Backup\n  \
                  medidup dedup ~/Photos --ignore .thumbnails --json"
)]
struct DedupArgs {
    /// One or more directory trees to scan
    #[arg(required = true, num_args = 1.., value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Path component that marks a file as preferred-for-removal (repeatable)
    #[arg(long, value_name = "COMPONENT")]
    prefer_remove: Vec<String>,

    /// Path component to skip during the walk (repeatable)
    #[arg(long, value_name = "COMPONENT")]
    ignore: Vec<String>,

    /// Emit structured JSON instead of the removal script
    #[arg(long)]
    json: bool,

    /// Override the worker-pool size (default: hardware parallelism)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Path to a `.medidup.toml` config file (default: discovered in cwd)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write an advisory `.index.json` snapshot into each input directory
    #[arg(long)]
    snapshot: bool,

    /// Write the merged metadata back to `.exif.json` in each input directory
    #[arg(long = "cache-exif")]
    cache_exif: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
#[command(
    about = "Place media from input trees into an output tree by shooting date",
    after_help = "EXAMPLES:\n  \
                  medidup tidy -o ~/Archive ~/Photos\n  \
                  medidup tidy -o ~/Archive -n ~/Photos      # dry run\n  \
                  medidup tidy -o ~/Archive -m ~/Photos      # move instead of copy"
)]
struct TidyArgs {
    /// One or more directory trees to draw media from
    #[arg(required = true, num_args = 1.., value_name = "DIR")]
    dirs: Vec<PathBuf>,

    /// Output root directory, laid out as <root>/<year>/<month>/<basename>
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,

    /// Plan only; perform no file operations
    #[arg(short = 'n', long = "dry-run")]
    dry_run: bool,

    /// Move media into the output tree instead of copying
    #[arg(short = 'm', long = "move")]
    move_files: bool,

    /// Path component to skip during the walk (repeatable)
    #[arg(long, value_name = "COMPONENT")]
    ignore: Vec<String>,

    /// Emit structured JSON instead of a line per placement
    #[arg(long)]
    json: bool,

    /// Override the worker-pool size (default: hardware parallelism)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Path to a `.medidup.toml` config file (default: discovered in cwd)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write an advisory `.index.json` snapshot into each input directory
    #[arg(long)]
    snapshot: bool,

    /// Write the merged metadata back to `.exif.json` in each input directory
    #[arg(long = "cache-exif")]
    cache_exif: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ============================================================================
// Logging
// ============================================================================

/// Initializes `tracing-subscriber` with `RUST_LOG` taking precedence over
/// `-v`/`-vv`/`-vvv`; always writes to stderr so stdout stays clean for
/// piping JSON (§6 ambient logging).
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

fn log_progress_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::WalkStarted { root } => tracing::debug!(root = %root, "walk started"),
        ProgressEvent::BucketStarted { size, count } => {
            tracing::trace!(size, count, "size bucket started")
        }
        ProgressEvent::BucketFinished { size, classes } => {
            tracing::trace!(size, classes, "size bucket finished")
        }
        ProgressEvent::Warning { path, message } => {
            tracing::warn!(path = %path, message = %message, "non-fatal error")
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Canonicalizes every input directory, rejecting anything that isn't an
/// existing directory up front (§7 category 1, fatal to the operation).
fn canonicalize_roots(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    dirs.iter()
        .map(|d| {
            if !d.is_dir() {
                return Err(MedidupError::UserError {
                    message: format!("{} is not a directory", d.display()),
                });
            }
            d.canonicalize().map_err(MedidupError::from)
        })
        .collect()
}

/// Writes the advisory, per-directory snapshot and/or metadata cache for
/// each root (§6 persisted state), behind the `--snapshot`/`--cache-exif`
/// flags. A write failure is logged and otherwise ignored: both files are
/// advisory, so a permissions error here must never fail the operation.
fn persist_advisory_state(index: &Index, roots: &[PathBuf], snapshot: bool, cache_exif: bool) {
    for root in roots {
        if snapshot {
            if let Err(e) = write_index_snapshot_for_root(root, index) {
                tracing::warn!(root = %root.display(), error = %e, "failed to write .index.json snapshot");
            }
        }
        if cache_exif {
            let records: Vec<_> = index
                .iter()
                .filter(|m| m.path().starts_with(root))
                .filter_map(|m| m.meta().cloned())
                .collect();
            if let Err(e) = persist_exif_cache(root, &records) {
                tracing::warn!(root = %root.display(), error = %e, "failed to write .exif.json cache");
            }
        }
    }
}

/// Resolves the output root to an absolute path without requiring it to
/// exist yet (`tidy -n` never creates it).
fn resolve_output_root(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path.canonicalize().map_err(MedidupError::from);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(MedidupError::from)?;
    Ok(cwd.join(path))
}

// ============================================================================
// dedup
// ============================================================================

#[derive(Serialize)]
struct DedupResult {
    roots: Vec<String>,
    total_indexed: usize,
    classes: Vec<ClassOutput>,
}

#[derive(Serialize)]
struct ClassOutput {
    members: Vec<String>,
    keeper: String,
    removable: Vec<String>,
}

fn handle_dedup(args: DedupArgs) -> Result<()> {
    init_logging(args.verbose);
    let start = OffsetDateTime::now_utc();

    let overrides = CliOverrides {
        prefer_remove: args.prefer_remove.clone(),
        ignore: args.ignore.clone(),
        threads: args.threads,
        config_path: args.config.clone(),
        extractor_path: None,
    };
    let settings = ResolvedConfig::resolve(&overrides)?;
    let roots = canonicalize_roots(&args.dirs)?;
    let output_format = determine_output_format(args.json);

    let index = Index::build(&roots, &settings.extractor_path, &settings.ignore, |event| {
        log_progress_event(&event)
    })?;
    let total_indexed = index.len();

    if args.snapshot || args.cache_exif {
        persist_advisory_state(&index, &roots, args.snapshot, args.cache_exif);
    }

    let finder_options = FinderOptions {
        prefer_remove: settings.prefer_remove.clone(),
    };
    let cancel = CancellationToken::new();
    let classes = find_duplicates(index, &finder_options, settings.threads, &cancel, |event| {
        log_progress_event(&event)
    });

    let end = OffsetDateTime::now_utc();

    match output_format {
        OutputFormat::Human => {
            if classes.is_empty() {
                eprintln!("# no duplicates found across {total_indexed} indexed file(s)");
            }
            for class in &classes {
                for line in class.script_lines() {
                    println!("{line}");
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let data = DedupResult {
                roots: roots.iter().map(|r| r.display().to_string()).collect(),
                total_indexed,
                classes: classes
                    .iter()
                    .map(|c| ClassOutput {
                        members: c.members.iter().map(|p| p.display().to_string()).collect(),
                        keeper: c.keeper.display().to_string(),
                        removable: c.removable.iter().map(|p| p.display().to_string()).collect(),
                    })
                    .collect(),
            };
            let response = OperationResponse::new(data, start, end)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

// ============================================================================
// tidy
// ============================================================================

#[derive(Serialize)]
struct TidyResult {
    roots: Vec<String>,
    output_root: String,
    dry_run: bool,
    moved: bool,
    total_considered: usize,
    placed: usize,
    already_present: usize,
    skipped: usize,
    failed: usize,
    operations: Vec<TidyOperation>,
}

#[derive(Serialize)]
struct TidyOperation {
    source: String,
    outcome: &'static str,
    target: Option<String>,
    reason: Option<String>,
}

fn handle_tidy(args: TidyArgs) -> Result<()> {
    init_logging(args.verbose);
    let start = OffsetDateTime::now_utc();

    let overrides = CliOverrides {
        prefer_remove: Vec::new(),
        ignore: args.ignore.clone(),
        threads: args.threads,
        config_path: args.config.clone(),
        extractor_path: None,
    };
    let settings = ResolvedConfig::resolve(&overrides)?;
    let roots = canonicalize_roots(&args.dirs)?;
    let output_root = resolve_output_root(&args.output)?;

    if roots.iter().any(|r| *r == output_root) {
        return Err(MedidupError::UserError {
            message: "output directory must differ from every input directory".to_string(),
        });
    }

    if !args.dry_run {
        std::fs::create_dir_all(&output_root).map_err(|e| MedidupError::UserError {
            message: format!("cannot create output directory {}: {e}", output_root.display()),
        })?;
    }

    let output_format = determine_output_format(args.json);

    let index = Index::build(&roots, &settings.extractor_path, &settings.ignore, |event| {
        log_progress_event(&event)
    })?;

    if args.snapshot || args.cache_exif {
        persist_advisory_state(&index, &roots, args.snapshot, args.cache_exif);
    }

    let mut media: Vec<_> = index.into_media().into_iter().filter(|m| m.valid()).collect();

    let plan_options = PlanOptions {
        output_root: output_root.clone(),
    };

    let mut operations = Vec::with_capacity(media.len());
    let mut placed = 0usize;
    let mut already_present = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for medium in media.iter_mut() {
        let source = medium.path().display().to_string();
        let outcome = plan_placement(medium, &plan_options);

        let op = match outcome {
            PlacementOutcome::Placed { target } => {
                if !args.dry_run {
                    let result = if args.move_files {
                        fsops::move_or_copy_remove(medium.path(), &target)
                    } else {
                        fsops::copy_preserving_mtime(medium.path(), &target)
                    };
                    if let Err(e) = result {
                        failed += 1;
                        tracing::warn!(source = %source, target = %target.display(), error = %e, "placement failed");
                        operations.push(TidyOperation {
                            source,
                            outcome: "failed",
                            target: Some(target.display().to_string()),
                            reason: Some(e.to_string()),
                        });
                        continue;
                    }
                }
                placed += 1;
                TidyOperation {
                    source,
                    outcome: "placed",
                    target: Some(target.display().to_string()),
                    reason: None,
                }
            }
            PlacementOutcome::AlreadyPresent { existing } => {
                already_present += 1;
                TidyOperation {
                    source,
                    outcome: "already_present",
                    target: Some(existing.display().to_string()),
                    reason: None,
                }
            }
            PlacementOutcome::Skipped { reason } => {
                skipped += 1;
                tracing::warn!(source = %source, reason = %reason, "placement skipped");
                TidyOperation {
                    source,
                    outcome: "skipped",
                    target: None,
                    reason: Some(reason),
                }
            }
            PlacementOutcome::Failed { reason } => {
                failed += 1;
                tracing::warn!(source = %source, reason = %reason, "placement failed");
                TidyOperation {
                    source,
                    outcome: "failed",
                    target: None,
                    reason: Some(reason),
                }
            }
        };
        operations.push(op);
    }

    let end = OffsetDateTime::now_utc();
    let total_considered = operations.len();

    match output_format {
        OutputFormat::Human => {
            for op in &operations {
                match (op.outcome, &op.target, &op.reason) {
                    ("placed", Some(target), _) => println!("{} -> {}", op.source, target),
                    ("already_present", Some(existing), _) => {
                        println!("{} already present at {}", op.source, existing)
                    }
                    (outcome, _, Some(reason)) => println!("{} {outcome}: {reason}", op.source),
                    (outcome, _, None) => println!("{} {outcome}", op.source),
                }
            }
            let verb = if args.move_files { "moved" } else { "copied" };
            let prefix = if args.dry_run { "would have " } else { "" };
            println!(
                "\n{prefix}{verb} {placed}, already present {already_present}, skipped {skipped}, failed {failed} (of {total_considered} valid media considered)"
            );
        }
        OutputFormat::Json => {
            let data = TidyResult {
                roots: roots.iter().map(|r| r.display().to_string()).collect(),
                output_root: output_root.display().to_string(),
                dry_run: args.dry_run,
                moved: args.move_files,
                total_considered,
                placed,
                already_present,
                skipped,
                failed,
                operations,
            };
            let response = OperationResponse::new(data, start, end)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

// ============================================================================
// Entry point
// ============================================================================

fn run(cmd: Cmd) -> Result<()> {
    match cmd {
        Cmd::Dedup(args) => handle_dedup(args),
        Cmd::Tidy(args) => handle_tidy(args),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli.cmd) {
        eprintln!("{e}");
        exit(e.exit_code());
    }
}
