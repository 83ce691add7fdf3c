//! Output formatting utilities for the CLI.
//!
//! Every listing command supports a human-readable table and machine-parseable
//! JSON. Tree output renders as indented text or nested JSON.

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use cek_rs::config::OutputStyle;
use cek_rs::{DiffResult, FileInfo, FileTree};

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// Machine-parseable JSON format.
    Json,
}

impl From<OutputStyle> for OutputFormat {
    fn from(style: OutputStyle) -> Self {
        match style {
            OutputStyle::Table => OutputFormat::Table,
            OutputStyle::Json => OutputFormat::Json,
        }
    }
}

/// Output format for the tree command.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum TreeFormat {
    /// Indented text with box-drawing connectors.
    #[default]
    Text,
    /// Nested JSON.
    Json,
}

impl From<OutputStyle> for TreeFormat {
    fn from(style: OutputStyle) -> Self {
        match style {
            OutputStyle::Table => TreeFormat::Text,
            OutputStyle::Json => TreeFormat::Json,
        }
    }
}

/// Layer information for CLI output.
#[derive(Debug, Serialize)]
pub struct LayerInfo {
    /// Layer number (1-based, from bottom).
    pub index: usize,
    /// Layer digest.
    pub digest: String,
    /// Blob size in bytes.
    pub size: u64,
}

/// Format a byte count as human-readable size.
///
/// Uses binary units (GB, MB, KB) with one decimal place.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1024), "1.0 KB");
/// assert_eq!(format_size(1_500_000), "1.4 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Create a styled table with consistent formatting.
pub fn create_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Render a file listing.
pub fn render_files(files: &[FileInfo], format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(files),
        OutputFormat::Table => {
            let mut table = create_styled_table();
            table.set_header(vec!["Mode", "Size", "Path"]);
            for file in files {
                table.add_row(vec![
                    Cell::new(&file.mode),
                    right(format_size(file.size)),
                    Cell::new(&file.path),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render the layers of an image.
pub fn render_layers(layers: &[LayerInfo], format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(layers),
        OutputFormat::Table => {
            let mut table = create_styled_table();
            table.set_header(vec!["Layer", "Digest", "Size"]);
            for layer in layers {
                table.add_row(vec![
                    right(layer.index.to_string()),
                    Cell::new(&layer.digest),
                    right(format_size(layer.size)),
                ]);
            }
            Ok(table.to_string())
        }
    }
}

/// Render an image comparison.
pub fn render_diff(diff: &DiffResult, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(diff),
        OutputFormat::Table => Ok(render_diff_table(diff)),
    }
}

fn render_diff_table(diff: &DiffResult) -> String {
    if diff.identical {
        return "Images are identical\n".to_string();
    }

    let mut summary = create_styled_table();
    summary.set_header(vec!["", "Image", "Layers", "Size"]);
    for (label, image) in [("1", &diff.left), ("2", &diff.right)] {
        summary.add_row(vec![
            Cell::new(label),
            Cell::new(&image.reference),
            right(image.layers.to_string()),
            right(format_size(image.size)),
        ]);
    }
    let mut out = format!("{}\n", summary);

    if diff.is_empty() {
        out.push_str("No file changes detected\n");
        return out;
    }

    let mut changes = create_styled_table();
    changes.set_header(vec!["Change", "Path"]);
    for (label, paths) in [
        ("added", &diff.added),
        ("removed", &diff.removed),
        ("modified", &diff.modified),
    ] {
        for path in paths {
            changes.add_row(vec![label, path.as_str()]);
        }
    }
    out.push_str(&format!("{}\n", changes));
    out
}

/// Render a tree as text (optionally with sizes) or nested JSON.
pub fn render_tree(
    tree: &FileTree,
    format: TreeFormat,
    human: bool,
) -> Result<String, serde_json::Error> {
    match format {
        TreeFormat::Json => serde_json::to_string(&tree.to_nested()),
        TreeFormat::Text => {
            let size_fmt: &dyn Fn(u64) -> String = &format_size;
            let mut out = tree.render(human.then_some(size_fmt));
            let (dirs, files) = tree.counts();
            out.push_str(&format!(
                "\n{} {}, {} {}\n",
                dirs,
                if dirs == 1 { "directory" } else { "directories" },
                files,
                if files == 1 { "file" } else { "files" }
            ));
            Ok(out)
        }
    }
}

/// Message printed when a listing comes back empty.
pub fn empty_listing_message(path: Option<&str>, pattern: Option<&str>) -> String {
    match (path, pattern) {
        (Some(path), Some(pattern)) => {
            format!("No files matching pattern '{}' in path '{}'", pattern, path)
        }
        (Some(path), None) => format!("No files found in path '{}'", path),
        (None, Some(pattern)) => format!("No files matching pattern '{}'", pattern),
        (None, None) => "No files found".to_string(),
    }
}
