//! Core types for feishu-export

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of a remote document or container
///
/// Serialized as the lowercase string the Open API uses (`"docx"`,
/// `"bitable"`, ...). Unknown kinds survive a round trip through
/// [`DocType::Other`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocType {
    /// Drive folder (or a synthesized container such as a wiki space root)
    #[default]
    Folder,
    /// Uploaded binary file
    File,
    /// Legacy document
    Doc,
    /// New-style document
    Docx,
    /// Spreadsheet
    Sheet,
    /// Multi-dimensional table
    Bitable,
    /// Mind map
    Mindnote,
    /// Presentation
    Slides,
    /// PDF (only reachable through an uploaded `.pdf` file)
    Pdf,
    /// Drive shortcut pointing at another document
    Shortcut,
    /// Wiki node wrapper
    Wiki,
    /// Any kind this tool does not know about
    Other(String),
}

impl DocType {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            DocType::Folder => "folder",
            DocType::File => "file",
            DocType::Doc => "doc",
            DocType::Docx => "docx",
            DocType::Sheet => "sheet",
            DocType::Bitable => "bitable",
            DocType::Mindnote => "mindnote",
            DocType::Slides => "slides",
            DocType::Pdf => "pdf",
            DocType::Shortcut => "shortcut",
            DocType::Wiki => "wiki",
            DocType::Other(s) => s,
        }
    }

    /// Kind implied by an uploaded file's extension, if it maps to a known kind
    ///
    /// `xlsx`/`xls` become [`DocType::Sheet`]; `doc`, `docx` and `pdf` map to
    /// their namesakes. Everything else is `None` (the node stays a `file`).
    pub fn from_extension(ext: &str) -> Option<DocType> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" | "xls" => Some(DocType::Sheet),
            "docx" => Some(DocType::Docx),
            "doc" => Some(DocType::Doc),
            "pdf" => Some(DocType::Pdf),
            _ => None,
        }
    }

    /// Kinds the remote side can render into a downloadable artifact
    pub fn is_exportable(&self) -> bool {
        matches!(
            self,
            DocType::Doc | DocType::Docx | DocType::Sheet | DocType::Bitable
        )
    }

    /// Artifact extension used when the user did not override it
    ///
    /// Non-exportable kinds fall back to their own name.
    pub fn default_extension(&self) -> String {
        match self {
            DocType::Doc | DocType::Docx => "docx".to_string(),
            DocType::Sheet | DocType::Bitable => "xlsx".to_string(),
            other => other.as_str().to_string(),
        }
    }

    /// Label used when naming untitled nodes
    pub fn untitled_label(&self) -> &'static str {
        match self {
            DocType::Folder => "文件夹",
            DocType::File => "文件",
            DocType::Doc => "文档",
            DocType::Docx => "新版文档",
            DocType::Sheet => "电子表格",
            DocType::Bitable => "多维表格",
            DocType::Mindnote => "思维笔记",
            DocType::Slides => "幻灯片",
            DocType::Pdf => "PDF",
            DocType::Shortcut => "快捷方式",
            DocType::Wiki => "知识库",
            DocType::Other(_) => "文件",
        }
    }
}

impl From<&str> for DocType {
    fn from(s: &str) -> Self {
        match s {
            "folder" => DocType::Folder,
            "file" => DocType::File,
            "doc" => DocType::Doc,
            "docx" => DocType::Docx,
            "sheet" => DocType::Sheet,
            "bitable" => DocType::Bitable,
            "mindnote" => DocType::Mindnote,
            "slides" => DocType::Slides,
            "pdf" => DocType::Pdf,
            "shortcut" => DocType::Shortcut,
            "wiki" => DocType::Wiki,
            other => DocType::Other(other.to_string()),
        }
    }
}

impl From<String> for DocType {
    fn from(s: String) -> Self {
        DocType::from(s.as_str())
    }
}

impl From<DocType> for String {
    fn from(t: DocType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DocType::from(s))
    }
}

/// One element of the discovered document tree
///
/// The JSON shape is what lands in `document-tree.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    /// Display name; non-empty after the naming pass
    #[serde(default)]
    pub name: String,
    /// Document kind
    #[serde(rename = "type", default)]
    pub doc_type: DocType,
    /// Remote identifier of the document itself
    #[serde(default)]
    pub token: String,
    /// Extension of the artifact written to disk (empty for folders)
    #[serde(default)]
    pub file_extension: String,
    /// Whether this node produces a local file
    #[serde(default)]
    pub can_download: bool,
    /// Skip the export phase and stream the raw file
    #[serde(default)]
    pub download_directly: bool,
    /// Browser URL of the node
    #[serde(default)]
    pub url: String,
    /// Wiki node token (wiki sources only)
    #[serde(default)]
    pub node_token: String,
    /// Wiki space id (wiki sources only)
    #[serde(default)]
    pub space_id: String,
    /// Local path, populated by the naming pass
    #[serde(default)]
    pub file_path: PathBuf,
    /// Ordered children
    #[serde(default)]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    /// Synthesized folder node, used for wiki space roots
    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc_type: DocType::Folder,
            ..Default::default()
        }
    }

    /// True for folder-typed nodes
    pub fn is_folder(&self) -> bool {
        self.doc_type == DocType::Folder
    }

    /// Depth-first, pre-order iteration over this node and its descendants
    pub fn walk(&self) -> Vec<&DocumentNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Downloadable nodes in pre-order, cloned without their children
    pub fn downloadable(&self) -> Vec<DocumentNode> {
        self.walk()
            .into_iter()
            .filter(|n| n.can_download)
            .map(|n| DocumentNode {
                children: Vec::new(),
                ..n.clone()
            })
            .collect()
    }
}

/// Remote artifact produced by a finished export job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFile {
    /// Token used with the export download endpoint
    pub file_token: String,
    /// Size announced by the export job
    pub file_size: u64,
}

/// Work item handed from exporters to downloaders
#[derive(Clone, Debug, PartialEq)]
pub struct ExportResult {
    /// The document being fetched
    pub node: DocumentNode,
    /// Present for exported documents, absent for direct downloads
    pub exported: Option<ExportedFile>,
}

/// Per-row status shown by the progress program
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Registered, nothing happened yet
    Added,
    /// Export job created, polling
    Exporting,
    /// Export job finished
    Exported,
    /// Queued for a downloader
    Waiting,
    /// Bytes are streaming to disk
    Downloading,
    /// File written
    Completed,
    /// Export or download failed
    Failed,
    /// Run was cancelled before this row finished
    Interrupted,
}

impl Status {
    /// Completed, Failed and Interrupted are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::Interrupted
        )
    }

    /// Short label for the UI
    pub fn label(&self) -> &'static str {
        match self {
            Status::Added => "added",
            Status::Exporting => "exporting",
            Status::Exported => "exported",
            Status::Waiting => "waiting",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DocumentNode {
        DocumentNode {
            name: "root".into(),
            doc_type: DocType::Folder,
            token: "fld1".into(),
            children: vec![
                DocumentNode {
                    name: "a".into(),
                    doc_type: DocType::Docx,
                    token: "dox1".into(),
                    file_extension: "docx".into(),
                    can_download: true,
                    ..Default::default()
                },
                DocumentNode {
                    name: "sub".into(),
                    doc_type: DocType::Folder,
                    children: vec![DocumentNode {
                        name: "b".into(),
                        doc_type: DocType::Sheet,
                        token: "sht1".into(),
                        file_extension: "xlsx".into(),
                        can_download: true,
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn doc_type_round_trips_known_and_unknown_kinds() {
        for raw in ["folder", "docx", "bitable", "shortcut", "whiteboard"] {
            let parsed = DocType::from(raw);
            assert_eq!(parsed.as_str(), raw);
        }
        assert_eq!(
            DocType::from("whiteboard"),
            DocType::Other("whiteboard".into())
        );
    }

    #[test]
    fn doc_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&DocType::Mindnote).unwrap();
        assert_eq!(json, "\"mindnote\"");
        let back: DocType = serde_json::from_str("\"sheet\"").unwrap();
        assert_eq!(back, DocType::Sheet);
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(DocType::from_extension("XLSX"), Some(DocType::Sheet));
        assert_eq!(DocType::from_extension("xls"), Some(DocType::Sheet));
        assert_eq!(DocType::from_extension("pdf"), Some(DocType::Pdf));
        assert_eq!(DocType::from_extension("zip"), None);
    }

    #[test]
    fn default_extensions() {
        assert_eq!(DocType::Doc.default_extension(), "docx");
        assert_eq!(DocType::Bitable.default_extension(), "xlsx");
        assert_eq!(DocType::Mindnote.default_extension(), "mindnote");
    }

    #[test]
    fn walk_is_preorder() {
        let tree = sample_tree();
        let names: Vec<&str> = tree.walk().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["root", "a", "sub", "b"]);
    }

    #[test]
    fn downloadable_strips_children() {
        let tree = sample_tree();
        let items = tree.downloadable();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|n| n.children.is_empty()));
        assert_eq!(items[1].token, "sht1");
    }

    #[test]
    fn tree_json_round_trip() {
        let tree = sample_tree();
        let json = serde_json::to_string_pretty(&tree).unwrap();
        assert!(json.contains("\"canDownload\": true"));
        assert!(json.contains("\"type\": \"sheet\""));
        let back: DocumentNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Interrupted.is_terminal());
        assert!(!Status::Waiting.is_terminal());
    }
}
