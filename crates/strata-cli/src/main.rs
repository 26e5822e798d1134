//! strata - inspect a layered virtual file namespace.
//!
//! Usage:
//!   # Sources from ~/.config/strata/vfs.ron
//!   strata tree
//!
//!   # Explicit sources, registered in order after the configured ones
//!   strata --source base.pkg --source ./overrides cat conf/app.conf
//!   strata --source ./data files conf --recursive --filter .conf
//!
//!   # Generate a .vfs manifest for a directory
//!   strata manifest ./data > ./data/.vfs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use strata_vfs::{Content, Node, ResourceVersion, Vfs, VfsConfig};

/// Inspect a virtual file namespace layered from directories and packages.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Inspect a layered virtual file namespace")]
struct Args {
    /// Config file (default: ~/.config/strata/vfs.ron, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Additional source directory or package, may be repeated
    #[arg(short, long = "source", global = true)]
    sources: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the namespace tree
    Tree,

    /// Print the content of a file node
    Cat {
        key: String,

        /// Version to print (default: newest)
        #[arg(long)]
        version: Option<i64>,
    },

    /// List file nodes under a directory
    Files {
        key: String,

        #[arg(short, long)]
        recursive: bool,

        /// Only names containing this substring
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Walk a real directory and print its .vfs manifest
    Manifest { dir: PathBuf },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Manifest { dir } => print_manifest(dir),
        Command::Tree => {
            let vfs = build_vfs(&args)?;
            print_tree(vfs.root(), 0);
            Ok(())
        }
        Command::Cat { key, version } => {
            let vfs = build_vfs(&args)?;
            let version = version.map(ResourceVersion::new).transpose()?;
            cat(&vfs, key, version)
        }
        Command::Files {
            key,
            recursive,
            filter,
        } => {
            let vfs = build_vfs(&args)?;
            if !vfs.has_node(key) {
                bail!("no such node: {key}");
            }
            for file in vfs.get_all_files(key, *recursive, filter.as_deref()) {
                let versions: Vec<String> = file
                    .resources()
                    .iter()
                    .map(|r| r.version().to_string())
                    .collect();
                println!("{}\t{}", file.name(), versions.join(","));
            }
            Ok(())
        }
    }
}

fn build_vfs(args: &Args) -> Result<Vfs> {
    let mut config = match &args.config {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => match VfsConfig::default_path().filter(|p| p.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using default config");
                VfsConfig::load(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            }
            None => VfsConfig::default(),
        },
    };
    for source in &args.sources {
        config.push_source(source);
    }
    if config.sources.is_empty() {
        tracing::warn!("no sources configured, the namespace is empty");
    }

    let vfs = Vfs::from_config(&config).context("failed to register sources")?;
    tracing::info!(
        sources = config.sources.len(),
        packages = vfs.packages().len(),
        "namespace ready"
    );
    Ok(vfs)
}

fn print_tree(node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    for dir in node.subdirectories() {
        println!("{indent}{}/", dir.name());
        print_tree(dir, depth + 1);
    }
    for file in node.files() {
        let versions: Vec<String> = file
            .resources()
            .iter()
            .map(|r| r.version().to_string())
            .collect();
        println!("{indent}{} [{}]", file.name(), versions.join(", "));
    }
}

fn cat(vfs: &Vfs, key: &str, version: Option<ResourceVersion>) -> Result<()> {
    match vfs.get_node(key) {
        None => bail!("no such node: {key}"),
        Some(node) if node.is_dir() => bail!("{key} is a directory"),
        Some(_) => {}
    }

    let Some(content) = vfs.get_content(key, version)? else {
        match version {
            Some(v) => bail!("{key} has no content at version {v}"),
            None => bail!("{key} has no content"),
        }
    };

    match content {
        Content::Structured(value) => println!("{}", serde_json::to_string_pretty(value)?),
        Content::Text(text) => print!("{text}"),
        Content::Binary(bytes) => println!("<binary, {} bytes>", bytes.len()),
    }
    Ok(())
}

fn print_manifest(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    let mut root = Node::root();
    root.populate_from_directory(dir)
        .with_context(|| format!("failed to walk {}", dir.display()))?;
    println!("{}", serde_json::to_string_pretty(&root.serialize())?);
    Ok(())
}
