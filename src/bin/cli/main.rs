//! cek: inspect container image filesystems without running them.
//!
//! Images are read from OCI image layout directories. An image argument has
//! the form `<layout-dir>[:<tag>|@<digest>]`; the tag or digest may be omitted
//! when the layout holds a single image.
//!
//! # Logging
//!
//! Diagnostics go to stderr. The filter is taken from, in order:
//! `--debug`, `$CEK_LOG`, the `[log] filter` config key, then `warn`.

mod output;

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cek_rs::{
    compare_images, extract, query, Config, FileInfo, FileTree, Image, Layer, OciImage, OciLayout,
    View,
};
use output::{LayerInfo, OutputFormat, TreeFormat};

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "CEK_LOG";

#[derive(Parser)]
#[command(name = "cek")]
#[command(about = "Explore the filesystem of container images", long_about = None)]
struct Cli {
    /// Configuration file (default: $CEK_CONFIG or ~/.config/cek/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files in an image or a single layer
    ///
    /// By default the merged filesystem (all layers combined) is shown.
    /// Filter patterns without `*`, `?` or `[` match anywhere in the path;
    /// `*.conf` matches basenames at any depth; patterns containing `/`
    /// match the whole path.
    Ls {
        /// Image (`<layout-dir>[:<tag>|@<digest>]`)
        image: String,
        /// Only list entries at or below this path
        path: Option<String>,
        /// Show files from a specific layer (1-indexed)
        #[arg(long)]
        layer: Option<usize>,
        /// Filter file paths by pattern
        #[arg(long)]
        filter: Option<String>,
        /// Output format (table or json)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Display the filesystem as a tree
    Tree {
        /// Image (`<layout-dir>[:<tag>|@<digest>]`)
        image: String,
        /// Root of the tree
        path: Option<String>,
        /// Show files from a specific layer (1-indexed)
        #[arg(long)]
        layer: Option<usize>,
        /// Descend at most this many levels (0 = unlimited)
        #[arg(short = 'L', long = "level")]
        level: Option<usize>,
        /// Show hidden files
        #[arg(short = 'a', long = "all")]
        all: bool,
        /// List directories only
        #[arg(short = 'd', long = "dirs-only")]
        dirs_only: bool,
        /// Exclude entries matching this pattern
        #[arg(short = 'I', long = "exclude")]
        exclude: Option<String>,
        /// Print sizes in human-readable form
        #[arg(long)]
        human: bool,
        /// List directories before files
        #[arg(long = "dirsfirst")]
        dirs_first: bool,
        /// Output format (text or json)
        #[arg(long, value_enum)]
        format: Option<TreeFormat>,
    },

    /// Print the contents of a file
    Cat {
        /// Image (`<layout-dir>[:<tag>|@<digest>]`)
        image: String,
        /// Absolute path of the file
        path: String,
        /// Read from a specific layer (1-indexed)
        #[arg(long)]
        layer: Option<usize>,
    },

    /// Compare the files of two images from the same repository
    Compare {
        /// First image
        image1: String,
        /// Second image
        image2: String,
        /// Output format (table or json)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// List the layers of an image
    Layers {
        /// Image (`<layout-dir>[:<tag>|@<digest>]`)
        image: String,
        /// Output format (table or json)
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::discover(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(cli.debug, &config);

    match cli.command {
        Commands::Ls {
            image,
            path,
            layer,
            filter,
            format,
        } => {
            let format = format.unwrap_or_else(|| config.output.format.into());
            list_files(&image, path.as_deref(), layer, filter.as_deref(), format)?
        }
        Commands::Tree {
            image,
            path,
            layer,
            level,
            all,
            dirs_only,
            exclude,
            human,
            dirs_first,
            format,
        } => {
            let mut opts = config.tree.options();
            if let Some(level) = level {
                opts.max_depth = (level > 0).then_some(level);
            }
            opts.show_hidden |= all;
            opts.dirs_first |= dirs_first;
            opts.dirs_only = dirs_only;
            opts.exclude = exclude;
            let format = format.unwrap_or_else(|| config.output.format.into());
            show_tree(&image, path.as_deref(), layer, &opts, human, format)?
        }
        Commands::Cat { image, path, layer } => cat_file(&image, &path, layer)?,
        Commands::Compare {
            image1,
            image2,
            format,
        } => {
            let format = format.unwrap_or_else(|| config.output.format.into());
            compare(&image1, &image2, format)?
        }
        Commands::Layers { image, format } => {
            let format = format.unwrap_or_else(|| config.output.format.into());
            list_layers(&image, format)?
        }
    }

    Ok(())
}

fn init_logging(debug: bool, config: &Config) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        filter
    } else {
        EnvFilter::new(config.log.filter.as_deref().unwrap_or("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn open_image(reference: &str) -> Result<OciImage> {
    OciLayout::open_reference(reference).with_context(|| format!("Failed to open image {}", reference))
}

fn list_files(
    image: &str,
    path: Option<&str>,
    layer: Option<usize>,
    filter: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let image = open_image(image)?;
    tracing::debug!("found {} layers", image.layers().len());

    let mut entries = extract::entries_for_view(image.layers(), View::from_layer_number(layer))?;
    if let Some(path) = path {
        entries = query::filter_by_path(entries, path);
    }
    if let Some(filter) = filter {
        entries = query::filter_by_pattern(entries, filter)?;
    }

    if entries.is_empty() {
        println!("{}", output::empty_listing_message(path, filter));
        return Ok(());
    }

    let files: Vec<FileInfo> = entries.iter().map(FileInfo::from).collect();
    println!(
        "{}",
        output::render_files(&files, format).context("Failed to output files")?
    );
    Ok(())
}

fn show_tree(
    image: &str,
    path: Option<&str>,
    layer: Option<usize>,
    opts: &cek_rs::TreeOptions,
    human: bool,
    format: TreeFormat,
) -> Result<()> {
    let image = open_image(image)?;
    let entries = extract::entries_for_view(image.layers(), View::from_layer_number(layer))?;
    let tree = FileTree::build(&entries, path.unwrap_or("/"), opts)?;
    print!(
        "{}",
        output::render_tree(&tree, format, human).context("Failed to output tree")?
    );
    Ok(())
}

fn cat_file(image: &str, path: &str, layer: Option<usize>) -> Result<()> {
    let image = open_image(image)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    extract::copy_view_file(image.layers(), View::from_layer_number(layer), path, &mut out)?;
    out.flush()?;
    Ok(())
}

fn compare(image1: &str, image2: &str, format: OutputFormat) -> Result<()> {
    let a = open_image(image1)?;
    let b = open_image(image2)?;
    let diff = compare_images(&a, &b)?;
    print!(
        "{}",
        output::render_diff(&diff, format).context("Failed to output comparison")?
    );
    if matches!(format, OutputFormat::Json) {
        println!();
    }
    Ok(())
}

fn list_layers(image: &str, format: OutputFormat) -> Result<()> {
    let image = open_image(image)?;
    let layers: Vec<LayerInfo> = image
        .layers()
        .iter()
        .enumerate()
        .map(|(i, layer)| LayerInfo {
            index: i + 1,
            digest: layer.digest().to_string(),
            size: layer.size(),
        })
        .collect();
    println!(
        "{}",
        output::render_layers(&layers, format).context("Failed to output layers")?
    );
    Ok(())
}
