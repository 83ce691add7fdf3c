//! Directory tree assembly for presentation.
//!
//! [`FileTree::build`] groups a flat entry collection by parent directory
//! below a chosen root, applying the display filters (depth, hidden files,
//! directories only, exclusion glob). Directories that are implied by an
//! entry's path but missing from the collection are synthesized, so every
//! kept entry is reachable from the root.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::Result;
use crate::path;
use crate::query;
use crate::scan::ArchiveEntry;

/// Display filters for tree assembly.
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Maximum depth below the root; `None` is unlimited.
    pub max_depth: Option<usize>,
    /// Include names starting with `.`.
    pub show_hidden: bool,
    /// Keep directories only.
    pub dirs_only: bool,
    /// Sort directories before files within each directory.
    pub dirs_first: bool,
    /// Glob matched against each entry's basename and full path.
    pub exclude: Option<String>,
}

/// One node of a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Final path segment.
    pub name: String,
    /// True for real and synthesized directories.
    pub is_dir: bool,
    /// Normalized absolute path.
    pub path: String,
    /// Content size; 0 for directories.
    pub size: u64,
}

/// A nested, serializable form of a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedNode {
    /// Final path segment, or the root's display name.
    pub name: String,
    /// `directory` or `file`, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Content size; 0 for directories.
    pub size: u64,
    /// Child nodes in display order; omitted from JSON when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedNode>,
}

/// Entries grouped by parent directory below a root.
#[derive(Debug, Clone)]
pub struct FileTree {
    root: String,
    children: BTreeMap<String, Vec<TreeNode>>,
}

impl FileTree {
    /// Assemble a tree of `entries` below `root`.
    ///
    /// Fails only if the exclusion glob does not compile.
    pub fn build(entries: &[ArchiveEntry], root: &str, opts: &TreeOptions) -> Result<Self> {
        let root = path::normalize_query_path(root);
        let exclude = opts
            .exclude
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(query::compile_glob)
            .transpose()?;

        let hidden = |p: &str| -> bool {
            if opts.show_hidden {
                return false;
            }
            let rel = if root == "/" { &p[1..] } else { &p[root.len() + 1..] };
            rel.split('/').any(|seg| seg.starts_with('.'))
        };
        let excluded = |p: &str| -> bool {
            let Some(pattern) = &exclude else {
                return false;
            };
            // An excluded directory hides everything below it.
            let mut cur = p;
            while cur != root.as_str() && cur != "/" {
                if query::glob_matches_name_or_path(pattern, cur) {
                    return true;
                }
                cur = path::parent(cur);
            }
            false
        };

        let mut nodes: BTreeMap<String, TreeNode> = BTreeMap::new();
        for entry in entries {
            // Entries that are filtered out by kind or depth still imply
            // their visible ancestor directories.
            let mut node_path = entry.path.as_str();
            let mut real = true;
            if opts.dirs_only && !entry.is_dir() {
                node_path = path::parent(node_path);
                real = false;
            }
            if let Some(max) = opts.max_depth {
                while path::depth_below(node_path, &root) > max {
                    node_path = path::parent(node_path);
                    real = false;
                }
            }
            if !path::is_descendant(node_path, &root) {
                continue;
            }
            if hidden(node_path) || excluded(node_path) {
                continue;
            }

            let mut dir = if real {
                nodes.insert(
                    entry.path.clone(),
                    TreeNode {
                        name: path::base_name(&entry.path).to_string(),
                        is_dir: entry.is_dir(),
                        path: entry.path.clone(),
                        size: entry.size,
                    },
                );
                path::parent(node_path)
            } else {
                node_path
            };
            while path::is_descendant(dir, &root) && !nodes.contains_key(dir) {
                nodes.insert(
                    dir.to_string(),
                    TreeNode {
                        name: path::base_name(dir).to_string(),
                        is_dir: true,
                        path: dir.to_string(),
                        size: 0,
                    },
                );
                dir = path::parent(dir);
            }
        }

        let mut children: BTreeMap<String, Vec<TreeNode>> = BTreeMap::new();
        for (p, node) in nodes {
            children
                .entry(path::parent(&p).to_string())
                .or_default()
                .push(node);
        }
        for group in children.values_mut() {
            group.sort_by(|a, b| {
                let dirs = if opts.dirs_first {
                    b.is_dir.cmp(&a.is_dir)
                } else {
                    std::cmp::Ordering::Equal
                };
                dirs.then_with(|| a.name.cmp(&b.name))
            });
        }

        Ok(Self { root, children })
    }

    /// The normalized root path.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Ordered children of a directory (empty if it has none).
    pub fn children(&self, dir: &str) -> &[TreeNode] {
        self.children.get(dir).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Display name of the root: `.` for `/`, else its basename.
    pub fn root_name(&self) -> &str {
        if self.root == "/" {
            "."
        } else {
            path::base_name(&self.root)
        }
    }

    /// Count (directories, files) in the tree.
    pub fn counts(&self) -> (usize, usize) {
        self.children
            .values()
            .flatten()
            .fold((0, 0), |(d, f), n| if n.is_dir { (d + 1, f) } else { (d, f + 1) })
    }

    /// Convert into a nested structure rooted at the tree root.
    pub fn to_nested(&self) -> NestedNode {
        NestedNode {
            name: self.root_name().to_string(),
            kind: "directory",
            size: 0,
            children: self.nest(&self.root),
        }
    }

    fn nest(&self, dir: &str) -> Vec<NestedNode> {
        self.children(dir)
            .iter()
            .map(|n| NestedNode {
                name: n.name.clone(),
                kind: if n.is_dir { "directory" } else { "file" },
                size: n.size,
                children: if n.is_dir { self.nest(&n.path) } else { Vec::new() },
            })
            .collect()
    }

    /// Render the tree with `├──` / `└──` connectors.
    ///
    /// Directories get a trailing `/`. With `size`, each line carries a
    /// bracketed size column produced by that formatter.
    pub fn render(&self, size: Option<&dyn Fn(u64) -> String>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.root_name());
        self.render_dir(&mut out, &self.root, "", size);
        out
    }

    fn render_dir(
        &self,
        out: &mut String,
        dir: &str,
        prefix: &str,
        size: Option<&dyn Fn(u64) -> String>,
    ) {
        let nodes = self.children(dir);
        for (i, node) in nodes.iter().enumerate() {
            let last = i + 1 == nodes.len();
            let connector = if last { "└── " } else { "├── " };
            let suffix = if node.is_dir { "/" } else { "" };
            match size {
                Some(fmt) => {
                    let _ = writeln!(
                        out,
                        "{}{}[{:>8}]  {}{}",
                        prefix,
                        connector,
                        fmt(node.size),
                        node.name,
                        suffix
                    );
                }
                None => {
                    let _ = writeln!(out, "{}{}{}{}", prefix, connector, node.name, suffix);
                }
            }
            if node.is_dir {
                let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
                self.render_dir(out, &node.path, &child_prefix, size);
            }
        }
    }
}
