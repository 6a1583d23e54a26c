//! Node naming, extension resolution and tree persistence
//!
//! Two passes run over the discovered tree:
//!
//! - [`normalize_node`] (pass A) runs on each node as discovery builds it.
//!   It sanitizes the name, retypes uploaded files from their extension and
//!   decides whether the node yields a local file.
//! - [`assign_paths`] (pass B) runs once the whole tree is known. It names
//!   untitled nodes, resolves duplicate siblings and fills in `file_path`.

use crate::error::Result;
use crate::fs::FileSystem;
use crate::types::{DocType, DocumentNode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// File written next to the downloads describing the discovered tree
pub const TREE_FILE_NAME: &str = "document-tree.json";

/// Prefix of generated names for untitled nodes
const UNTITLED_PREFIX: &str = "未命名";

/// Replace characters that are not allowed in file names with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Split `name` into stem and extension when the extension maps to a known kind
fn split_known_extension(name: &str) -> Option<(&str, &str, DocType)> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    DocType::from_extension(ext).map(|kind| (stem, ext, kind))
}

/// Pass A: sanitize, retype and flag a freshly discovered node
///
/// `overrides` maps a document kind to the artifact extension the user asked
/// for; it only applies to nodes that go through an export job.
pub fn normalize_node(node: &mut DocumentNode, overrides: &HashMap<DocType, String>) {
    node.name = sanitize_name(node.name.trim());

    if node.doc_type == DocType::Folder {
        node.file_extension.clear();
        node.can_download = false;
        node.download_directly = false;
        return;
    }

    let mut raw_extension = None;
    if node.doc_type == DocType::File {
        node.download_directly = true;
        if let Some((stem, ext, kind)) = split_known_extension(&node.name) {
            raw_extension = Some(ext.to_ascii_lowercase());
            node.doc_type = kind;
            node.name = stem.to_string();
        }
    }

    node.can_download = node.doc_type.is_exportable();
    node.file_extension = match raw_extension {
        Some(ext) if node.download_directly => ext,
        _ => overrides
            .get(&node.doc_type)
            .filter(|_| !node.download_directly)
            .cloned()
            .unwrap_or_else(|| node.doc_type.default_extension()),
    };
}

/// Pass B over several roots, which are treated as siblings under `save_dir`
pub fn assign_paths(roots: &mut [DocumentNode], save_dir: &Path) {
    resolve_siblings(roots, save_dir, 0);
}

fn resolve_siblings(nodes: &mut [DocumentNode], dir: &Path, depth: usize) {
    let mut untitled: HashMap<&'static str, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();

    for node in nodes.iter_mut() {
        if node.name.is_empty() {
            let label = node.doc_type.untitled_label();
            let n = untitled.entry(label).or_insert(0);
            *n += 1;
            node.name = format!("{UNTITLED_PREFIX}{label}{n}");
        }

        let base = node.name.clone();
        let mut suffix = 0;
        while !reserve(&mut taken, node) {
            suffix += 1;
            node.name = format!("{base}{suffix}");
        }

        node.file_path = dir.join(path_component(node));
        info!(
            "{}{} [{}]",
            "  ".repeat(depth),
            node.name,
            node.doc_type
        );

        if !node.children.is_empty() {
            let child_dir = dir.join(&node.name);
            resolve_siblings(&mut node.children, &child_dir, depth + 1);
        }
    }
}

/// Claim every entry `node` occupies in its directory; false if one is taken
///
/// A node with children also owns the directory named after it, so a
/// document with sub-pages and a sibling folder cannot share children.
fn reserve(taken: &mut HashSet<String>, node: &DocumentNode) -> bool {
    let file = path_component(node);
    let dir = (!node.children.is_empty()).then(|| node.name.clone());
    if taken.contains(&file) || dir.as_ref().is_some_and(|d| taken.contains(d)) {
        return false;
    }
    taken.insert(file);
    taken.extend(dir);
    true
}

/// Last path component a node occupies on disk
///
/// Uploads of an unknown kind keep their original name, extension included.
fn path_component(node: &DocumentNode) -> String {
    if node.is_folder() || node.doc_type == DocType::File || node.file_extension.is_empty() {
        node.name.clone()
    } else {
        format!("{}.{}", node.name, node.file_extension)
    }
}

/// Downloadable nodes of every root, in pre-order
pub fn flatten(roots: &[DocumentNode]) -> Vec<DocumentNode> {
    roots.iter().flat_map(DocumentNode::downloadable).collect()
}

/// Write the tree as pretty-printed JSON to `<save_dir>/document-tree.json`
///
/// A single root is written as an object, several roots as an array.
pub async fn write_tree(
    fs: &dyn FileSystem,
    save_dir: &Path,
    roots: &[DocumentNode],
) -> Result<PathBuf> {
    let json = match roots {
        [single] => serde_json::to_vec_pretty(single)?,
        many => serde_json::to_vec_pretty(many)?,
    };

    fs.create_dir_all(save_dir).await?;
    let path = save_dir.join(TREE_FILE_NAME);
    let mut file = fs.create(&path).await?;
    file.write_all(&json).await?;
    file.shutdown().await?;

    info!(path = %path.display(), "Wrote document tree");
    Ok(path)
}
