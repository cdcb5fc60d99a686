//! TreeSync: mirror a directory into a reconciled tree and print it.
//!
//! Thin binary entry point. All logic lives in the `treesync-core` and
//! `treesync-sources` crates.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use treesync_core::{EngineContext, Filter, RowContent, TreeConfig, TreeView};
use treesync_sources::FsSource;

#[derive(Parser)]
#[command(name = "treesync")]
#[command(about = "Print a directory as a filtered, sorted tree")]
struct Args {
    /// Directory to mirror
    root: PathBuf,

    /// Only show files with these extensions (comma-separated)
    #[arg(long, value_delimiter = ',')]
    ext: Vec<String>,

    /// Hide files, show directories only
    #[arg(long)]
    dirs_only: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Expand every directory instead of the root only
    #[arg(long)]
    expand_all: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// How long to wait for the initial population.
const LOAD_TIMEOUT: Duration = Duration::from_secs(300);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let mut config = match &args.config {
        Some(path) => TreeConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => TreeConfig::default(),
    };
    if !args.ext.is_empty() {
        config.filter = Filter::with_extensions(&args.ext);
    }
    if args.dirs_only {
        config.filter.containers_only = true;
    }

    let root = std::fs::canonicalize(&args.root)
        .with_context(|| format!("resolving {}", args.root.display()))?;
    tracing::info!(root = %root.display(), "TreeSync starting");

    let source = Arc::new(FsSource::new(root));
    let ctx = EngineContext::new(Arc::clone(&source), config).context("starting worker pool")?;
    let mut view = TreeView::new(ctx);
    view.fill(Arc::clone(&source));

    if !view.pump_until_idle(LOAD_TIMEOUT) {
        bail!("population did not finish within {LOAD_TIMEOUT:?}");
    }
    if let Some(outcome) = view.last_outcome() {
        if let Some(err) = &outcome.error {
            bail!("{}: {err}", source.root_path().display());
        }
    }
    if args.expand_all {
        view.expand_all();
    }

    let model = view.model();
    for row in view.visible_rows() {
        let indent = "  ".repeat(usize::from(row.depth));
        match row.content {
            RowContent::Loading => println!("{indent}Loading..."),
            RowContent::Node(idx) => {
                let Some(node) = model.node(idx) else {
                    continue;
                };
                let marker = if node.is_container() { "/" } else { "" };
                println!("{indent}{}{marker}", node.name);
            }
        }
    }
    Ok(())
}
