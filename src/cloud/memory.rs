//! In-memory [`CloudClient`] back-end
//!
//! Serves a fixed set of documents, folders and wiki nodes without any
//! network access. Used by the `--demo` mode of the binary and by tests;
//! it can also inject rate limits, failed exports, latency and missing
//! `Content-Length` headers.

use super::{
    ApiResponse, BatchQueryMetaData, CloudClient, CreateExportData, CreateExportRequest,
    DocMeta, DownloadBody, DownloadResponse, DriveFile, ExportTask, FailedMeta, GetExportData,
    GetNodeData, GetSpaceData, ListFilesData, ListFilesRequest, ListNodesData, ListNodesRequest,
    RequestDoc, ShortcutInfo, WikiNode, WikiSpace,
};
use crate::config::DEFAULT_RETRYABLE_CODES;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

/// Code returned for unknown tokens
pub const NOT_FOUND_CODE: i64 = 1061003;

/// Operation names accepted by [`MemoryCloud::rate_limit`] and [`MemoryCloud::calls`]
pub mod ops {
    /// `DriveBatchQueryMeta`
    pub const BATCH_QUERY_META: &str = "drive_batch_query_meta";
    /// `DriveListChildren`
    pub const LIST_CHILDREN: &str = "drive_list_children";
    /// `DriveDownload`
    pub const DRIVE_DOWNLOAD: &str = "drive_download";
    /// `WikiGetNode`
    pub const WIKI_GET_NODE: &str = "wiki_get_node";
    /// `WikiGetSpace`
    pub const WIKI_GET_SPACE: &str = "wiki_get_space";
    /// `WikiListNodes`
    pub const WIKI_LIST_NODES: &str = "wiki_list_nodes";
    /// `ExportCreate`
    pub const EXPORT_CREATE: &str = "export_create";
    /// `ExportGet`
    pub const EXPORT_GET: &str = "export_get";
    /// `ExportDownload`
    pub const EXPORT_DOWNLOAD: &str = "export_download";
}

#[derive(Default)]
struct State {
    metas: HashMap<String, DocMeta>,
    folders: HashMap<String, Vec<DriveFile>>,
    spaces: HashMap<String, WikiSpace>,
    wiki_nodes: HashMap<String, WikiNode>,
    wiki_children: HashMap<(String, String), Vec<WikiNode>>,
    contents: HashMap<String, Vec<u8>>,
    pending_polls: HashMap<String, u32>,
    export_failures: HashMap<String, String>,
    create_failures: HashMap<String, (i64, String)>,
    hidden_lengths: HashSet<String>,
    tickets: HashMap<String, u32>,
    rate_limits: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, u32>,
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Download body that counts as in flight until dropped
struct TrackedReader {
    inner: Cursor<Vec<u8>>,
    _guard: InFlightGuard,
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// In-memory workspace implementing [`CloudClient`]
#[derive(Default)]
pub struct MemoryCloud {
    state: Mutex<State>,
    latency: Mutex<Duration>,
    creates: Arc<InFlight>,
    downloads: Arc<InFlight>,
}

impl MemoryCloud {
    /// Empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // recover from poisoning
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a document with its title and the bytes its export (or raw download) yields
    pub fn add_document(&self, token: &str, doc_type: &str, title: &str, content: &[u8]) {
        let mut state = self.state();
        state.metas.insert(
            token.to_string(),
            DocMeta {
                doc_token: token.to_string(),
                doc_type: doc_type.to_string(),
                title: title.to_string(),
                url: String::new(),
            },
        );
        state.contents.insert(token.to_string(), content.to_vec());
    }

    /// Add a drive folder
    pub fn add_folder(&self, token: &str, title: &str) {
        let mut state = self.state();
        state.metas.insert(
            token.to_string(),
            DocMeta {
                doc_token: token.to_string(),
                doc_type: "folder".into(),
                title: title.to_string(),
                url: String::new(),
            },
        );
        state.folders.entry(token.to_string()).or_default();
    }

    /// List `child` (an existing document or folder) under `folder`
    pub fn add_to_folder(&self, folder: &str, child: &str) {
        let mut state = self.state();
        let meta = state.metas.get(child).cloned().unwrap_or_else(|| DocMeta {
            doc_token: child.to_string(),
            ..Default::default()
        });
        state.folders.entry(folder.to_string()).or_default().push(DriveFile {
            token: meta.doc_token,
            name: meta.title,
            file_type: meta.doc_type,
            parent_token: folder.to_string(),
            url: String::new(),
            shortcut_info: None,
        });
    }

    /// List a shortcut named `name` under `folder`, pointing at `target`
    pub fn add_shortcut(&self, folder: &str, name: &str, target: &str) {
        let mut state = self.state();
        let target_type = state
            .metas
            .get(target)
            .map(|m| m.doc_type.clone())
            .unwrap_or_default();
        state.folders.entry(folder.to_string()).or_default().push(DriveFile {
            token: format!("shortcut-{target}"),
            name: name.to_string(),
            file_type: "shortcut".into(),
            parent_token: folder.to_string(),
            url: String::new(),
            shortcut_info: Some(ShortcutInfo {
                target_type,
                target_token: target.to_string(),
            }),
        });
    }

    /// Add a wiki space
    pub fn add_wiki_space(&self, space_id: &str, name: &str) {
        self.state().spaces.insert(
            space_id.to_string(),
            WikiSpace {
                space_id: space_id.to_string(),
                name: name.to_string(),
                description: String::new(),
            },
        );
    }

    /// Add a wiki node backed by the existing document `obj_token`
    ///
    /// `parent` is `None` for top-level nodes of the space.
    pub fn add_wiki_node(
        &self,
        space_id: &str,
        parent: Option<&str>,
        node_token: &str,
        obj_token: &str,
    ) {
        let mut state = self.state();
        let meta = state.metas.get(obj_token).cloned().unwrap_or_default();
        let node = WikiNode {
            space_id: space_id.to_string(),
            node_token: node_token.to_string(),
            obj_token: obj_token.to_string(),
            obj_type: meta.doc_type,
            parent_node_token: parent.unwrap_or_default().to_string(),
            title: meta.title,
            has_child: false,
        };
        if let Some(parent) = parent {
            if let Some(p) = state.wiki_nodes.get_mut(parent) {
                p.has_child = true;
            }
            for siblings in state.wiki_children.values_mut() {
                for sibling in siblings.iter_mut().filter(|s| s.node_token == parent) {
                    sibling.has_child = true;
                }
            }
        }
        state.wiki_nodes.insert(node_token.to_string(), node.clone());
        state
            .wiki_children
            .entry((space_id.to_string(), parent.unwrap_or_default().to_string()))
            .or_default()
            .push(node);
    }

    /// Report the export of `token` as in progress for `polls` queries before it succeeds
    pub fn set_pending_polls(&self, token: &str, polls: u32) {
        self.state().pending_polls.insert(token.to_string(), polls);
    }

    /// Make the export job of `token` fail with `message`
    pub fn fail_export(&self, token: &str, message: &str) {
        self.state()
            .export_failures
            .insert(token.to_string(), message.to_string());
    }

    /// Make creating the export job of `token` fail with a remote code
    pub fn fail_create(&self, token: &str, code: i64, msg: &str) {
        self.state()
            .create_failures
            .insert(token.to_string(), (code, msg.to_string()));
    }

    /// Download `token` without a `Content-Length`
    pub fn hide_content_length(&self, token: &str) {
        self.state().hidden_lengths.insert(token.to_string());
    }

    /// Answer the next `times` calls of `operation` with a rate-limit code
    pub fn rate_limit(&self, operation: &'static str, times: u32) {
        self.state().rate_limits.insert(operation, times);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Number of calls made to `operation`
    pub fn calls(&self, operation: &str) -> u32 {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    /// Highest number of export jobs being created at once
    pub fn peak_concurrent_creates(&self) -> usize {
        self.creates.peak.load(Ordering::SeqCst)
    }

    /// Highest number of download bodies alive at once
    pub fn peak_concurrent_downloads(&self) -> usize {
        self.downloads.peak.load(Ordering::SeqCst)
    }

    /// Count the call and tell whether it must be rate limited
    async fn enter(&self, operation: &'static str) -> bool {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state();
        *state.calls.entry(operation).or_insert(0) += 1;
        match state.rate_limits.get_mut(operation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn body(&self, token: &str) -> Option<DownloadResponse> {
        let state = self.state();
        let content = state.contents.get(token)?.clone();
        let content_length = if state.hidden_lengths.contains(token) {
            None
        } else {
            Some(content.len() as u64)
        };
        Some(DownloadResponse::ok(DownloadBody {
            reader: Box::pin(TrackedReader {
                inner: Cursor::new(content),
                _guard: self.downloads.enter(),
            }),
            content_length,
        }))
    }
}

fn rate_limited<T>() -> Result<ApiResponse<T>> {
    Ok(ApiResponse::error(
        DEFAULT_RETRYABLE_CODES[0],
        "request trigger frequency limit",
    ))
}

/// One page of `items` starting at the numeric `page_token`
fn page<T: Clone>(
    items: &[T],
    page_token: Option<&str>,
    page_size: u32,
) -> (Vec<T>, bool, Option<String>) {
    let start = page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0);
    let size = page_size.max(1) as usize;
    let end = (start + size).min(items.len());
    let slice = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
    let has_more = end < items.len();
    (slice, has_more, has_more.then(|| end.to_string()))
}

#[async_trait]
impl CloudClient for MemoryCloud {
    async fn drive_batch_query_meta(
        &self,
        docs: Vec<RequestDoc>,
    ) -> Result<ApiResponse<BatchQueryMetaData>> {
        if self.enter(ops::BATCH_QUERY_META).await {
            return rate_limited();
        }
        let state = self.state();
        let mut data = BatchQueryMetaData::default();
        for doc in docs {
            match state.metas.get(&doc.doc_token) {
                Some(meta) => data.metas.push(meta.clone()),
                None => data.failed_list.push(FailedMeta {
                    token: doc.doc_token,
                    code: NOT_FOUND_CODE,
                }),
            }
        }
        Ok(ApiResponse::ok(data))
    }

    async fn drive_list_children(
        &self,
        request: ListFilesRequest,
    ) -> Result<ApiResponse<ListFilesData>> {
        if self.enter(ops::LIST_CHILDREN).await {
            return rate_limited();
        }
        let state = self.state();
        let Some(files) = state.folders.get(&request.folder_token) else {
            return Ok(ApiResponse::error(NOT_FOUND_CODE, "folder not found"));
        };
        let (files, has_more, next_page_token) =
            page(files, request.page_token.as_deref(), request.page_size);
        Ok(ApiResponse::ok(ListFilesData {
            files,
            has_more,
            next_page_token,
        }))
    }

    async fn drive_download(&self, file_token: &str) -> Result<DownloadResponse> {
        if self.enter(ops::DRIVE_DOWNLOAD).await {
            return Ok(DownloadResponse::error(
                DEFAULT_RETRYABLE_CODES[0],
                "request trigger frequency limit",
            ));
        }
        Ok(self
            .body(file_token)
            .unwrap_or_else(|| DownloadResponse::error(NOT_FOUND_CODE, "file not found")))
    }

    async fn wiki_get_node(&self, token: &str) -> Result<ApiResponse<GetNodeData>> {
        if self.enter(ops::WIKI_GET_NODE).await {
            return rate_limited();
        }
        Ok(match self.state().wiki_nodes.get(token) {
            Some(node) => ApiResponse::ok(GetNodeData { node: node.clone() }),
            None => ApiResponse::error(NOT_FOUND_CODE, "wiki node not found"),
        })
    }

    async fn wiki_get_space(&self, space_id: &str) -> Result<ApiResponse<GetSpaceData>> {
        if self.enter(ops::WIKI_GET_SPACE).await {
            return rate_limited();
        }
        Ok(match self.state().spaces.get(space_id) {
            Some(space) => ApiResponse::ok(GetSpaceData {
                space: space.clone(),
            }),
            None => ApiResponse::error(NOT_FOUND_CODE, "wiki space not found"),
        })
    }

    async fn wiki_list_nodes(
        &self,
        request: ListNodesRequest,
    ) -> Result<ApiResponse<ListNodesData>> {
        if self.enter(ops::WIKI_LIST_NODES).await {
            return rate_limited();
        }
        let state = self.state();
        let key = (
            request.space_id.clone(),
            request.parent_node_token.clone().unwrap_or_default(),
        );
        let children = state.wiki_children.get(&key).cloned().unwrap_or_default();
        let (items, has_more, page_token) =
            page(&children, request.page_token.as_deref(), request.page_size);
        Ok(ApiResponse::ok(ListNodesData {
            items,
            has_more,
            page_token,
        }))
    }

    async fn export_create(
        &self,
        request: CreateExportRequest,
    ) -> Result<ApiResponse<CreateExportData>> {
        let _in_flight = self.creates.enter();
        if self.enter(ops::EXPORT_CREATE).await {
            return rate_limited();
        }
        let mut state = self.state();
        if let Some((code, msg)) = state.create_failures.get(&request.token) {
            return Ok(ApiResponse::error(*code, msg.clone()));
        }
        if !state.contents.contains_key(&request.token) {
            return Ok(ApiResponse::error(NOT_FOUND_CODE, "document not found"));
        }
        let ticket = format!("ticket-{}", request.token);
        state.tickets.insert(ticket.clone(), 0);
        Ok(ApiResponse::ok(CreateExportData { ticket }))
    }

    async fn export_get(&self, ticket: &str, token: &str) -> Result<ApiResponse<GetExportData>> {
        if self.enter(ops::EXPORT_GET).await {
            return rate_limited();
        }
        let mut state = self.state();
        let Some(polls) = state.tickets.get_mut(ticket) else {
            return Ok(ApiResponse::error(NOT_FOUND_CODE, "ticket not found"));
        };
        *polls += 1;
        let polls = *polls;

        let result = if let Some(message) = state.export_failures.get(token) {
            ExportTask {
                job_status: 3,
                job_error_msg: message.clone(),
                ..Default::default()
            }
        } else if polls <= state.pending_polls.get(token).copied().unwrap_or(0) {
            ExportTask {
                job_status: 2,
                job_error_msg: "processing".into(),
                ..Default::default()
            }
        } else {
            let size = state.contents.get(token).map_or(0, |c| c.len() as u64);
            ExportTask {
                job_status: 0,
                job_error_msg: "success".into(),
                file_token: format!("file-{token}"),
                file_size: size,
                file_extension: String::new(),
            }
        };
        Ok(ApiResponse::ok(GetExportData { result }))
    }

    async fn export_download(&self, file_token: &str) -> Result<DownloadResponse> {
        if self.enter(ops::EXPORT_DOWNLOAD).await {
            return Ok(DownloadResponse::error(
                DEFAULT_RETRYABLE_CODES[0],
                "request trigger frequency limit",
            ));
        }
        let token = file_token.strip_prefix("file-").unwrap_or(file_token);
        Ok(self
            .body(token)
            .unwrap_or_else(|| DownloadResponse::error(NOT_FOUND_CODE, "exported file not found")))
    }
}
