//! Narrow, typed facade over the Feishu Open API
//!
//! The pipeline only talks to the remote side through [`CloudClient`]. Every
//! operation returns a typed response carrying the `{code, msg, request_id}`
//! envelope; transport failures come back as `Err`. Retrying on rate-limit
//! codes is the caller's business (see [`crate::retry`]).
//!
//! [`FeishuClient`] is the HTTP implementation. Tests and demos plug in
//! in-memory implementations of the same trait.

mod feishu;
pub mod memory;

pub use feishu::FeishuClient;
pub use memory::MemoryCloud;

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::{RemoteStatus, with_retry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Envelope shared by every JSON endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Remote code; `0` means success
    #[serde(default)]
    pub code: i64,
    /// Remote message
    #[serde(default)]
    pub msg: String,
    /// Payload, present on success
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Log id taken from the `X-Tt-Logid` response header
    #[serde(skip)]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response wrapping `data`
    pub fn ok(data: T) -> Self {
        Self {
            code: 0,
            msg: "success".into(),
            data: Some(data),
            request_id: None,
        }
    }

    /// Failed response with a remote code
    pub fn error(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
            request_id: None,
        }
    }

    /// Attach the request's log id
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Check the code and unwrap the payload
    pub fn into_data(self, operation: &str) -> Result<T> {
        let checked = self.into_checked(operation)?;
        let request_id = checked.request_id.clone();
        checked.data.ok_or_else(|| Error::Remote {
            operation: operation.to_string(),
            code: 0,
            msg: "response carried no data".into(),
            request_id,
        })
    }
}

impl<T> RemoteStatus for ApiResponse<T> {
    fn code(&self) -> i64 {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }

    fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// Retry a JSON call and unwrap its payload, labelling failures with `operation`
pub async fn fetch_data<T, F, Fut>(retry: &RetryConfig, operation: &str, call: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ApiResponse<T>>>,
{
    with_retry(retry, call).await?.into_data(operation)
}

/// Streaming body of a file download
pub struct DownloadBody {
    /// Raw bytes
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
    /// Value of the `Content-Length` header, if announced
    pub content_length: Option<u64>,
}

impl fmt::Debug for DownloadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Response of the two download endpoints
///
/// On success `body` is set; otherwise the JSON error envelope fills
/// `code` and `msg`.
#[derive(Debug)]
pub struct DownloadResponse {
    /// Remote code; `0` means the body is streaming
    pub code: i64,
    /// Remote message
    pub msg: String,
    /// Log id taken from the `X-Tt-Logid` response header
    pub request_id: Option<String>,
    /// Streaming body, present on success
    pub body: Option<DownloadBody>,
}

impl DownloadResponse {
    /// Successful download
    pub fn ok(body: DownloadBody) -> Self {
        Self {
            code: 0,
            msg: "success".into(),
            request_id: None,
            body: Some(body),
        }
    }

    /// Failed download with a remote code
    pub fn error(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            request_id: None,
            body: None,
        }
    }

    /// Check the code and unwrap the body
    pub fn into_body(self, operation: &str) -> Result<DownloadBody> {
        let checked = self.into_checked(operation)?;
        checked
            .body
            .ok_or_else(|| Error::remote(operation, 0, "response carried no body", checked.request_id))
    }
}

impl RemoteStatus for DownloadResponse {
    fn code(&self) -> i64 {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }

    fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// One entry of a metadata batch query
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDoc {
    /// Document token
    pub doc_token: String,
    /// Document kind, e.g. `"docx"` or `"folder"`
    pub doc_type: String,
}

/// Metadata of one document
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DocMeta {
    /// Document token
    #[serde(default)]
    pub doc_token: String,
    /// Document kind
    #[serde(default)]
    pub doc_type: String,
    /// Title (for uploaded files, the file name including extension)
    #[serde(default)]
    pub title: String,
    /// Browser URL
    #[serde(default)]
    pub url: String,
}

/// Token the batch query could not resolve
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FailedMeta {
    /// Offending token
    #[serde(default)]
    pub token: String,
    /// Per-token failure code
    #[serde(default)]
    pub code: i64,
}

/// Payload of `DriveBatchQueryMeta`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BatchQueryMetaData {
    /// Resolved documents
    #[serde(default)]
    pub metas: Vec<DocMeta>,
    /// Unresolved tokens
    #[serde(default)]
    pub failed_list: Vec<FailedMeta>,
}

/// Listing of one drive folder page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListFilesRequest {
    /// Folder being listed
    pub folder_token: String,
    /// Continuation token from the previous page
    pub page_token: Option<String>,
    /// Items per page
    pub page_size: u32,
    /// Sort key (always `EditedTime`)
    pub order_by: String,
    /// Sort direction (always `DESC`)
    pub direction: String,
}

impl ListFilesRequest {
    /// First page of `folder_token`, newest edits first
    pub fn new(folder_token: impl Into<String>, page_size: u32) -> Self {
        Self {
            folder_token: folder_token.into(),
            page_token: None,
            page_size,
            order_by: "EditedTime".into(),
            direction: "DESC".into(),
        }
    }
}

/// Target of a drive shortcut
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ShortcutInfo {
    /// Kind of the target document
    #[serde(default)]
    pub target_type: String,
    /// Token of the target document
    #[serde(default)]
    pub target_token: String,
}

/// One drive listing entry
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DriveFile {
    /// Document token
    #[serde(default)]
    pub token: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Document kind
    #[serde(default, rename = "type")]
    pub file_type: String,
    /// Containing folder
    #[serde(default)]
    pub parent_token: String,
    /// Browser URL
    #[serde(default)]
    pub url: String,
    /// Set when `file_type == "shortcut"`
    #[serde(default)]
    pub shortcut_info: Option<ShortcutInfo>,
}

/// Payload of `DriveListChildren`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListFilesData {
    /// Entries of this page
    #[serde(default)]
    pub files: Vec<DriveFile>,
    /// More pages follow
    #[serde(default)]
    pub has_more: bool,
    /// Continuation token
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A wiki node
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WikiNode {
    /// Containing space
    #[serde(default)]
    pub space_id: String,
    /// Node token (what wiki URLs carry)
    #[serde(default)]
    pub node_token: String,
    /// Token of the underlying document
    #[serde(default)]
    pub obj_token: String,
    /// Kind of the underlying document
    #[serde(default)]
    pub obj_type: String,
    /// Parent node, empty at the space root
    #[serde(default)]
    pub parent_node_token: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Whether child nodes exist
    #[serde(default)]
    pub has_child: bool,
}

/// Payload of `WikiGetNode`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetNodeData {
    /// The node
    #[serde(default)]
    pub node: WikiNode,
}

/// A wiki space
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct WikiSpace {
    /// Space id
    #[serde(default)]
    pub space_id: String,
    /// Space name
    #[serde(default)]
    pub name: String,
    /// Space description
    #[serde(default)]
    pub description: String,
}

/// Payload of `WikiGetSpace`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetSpaceData {
    /// The space
    #[serde(default)]
    pub space: WikiSpace,
}

/// Listing of one wiki page of children
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListNodesRequest {
    /// Space being listed
    pub space_id: String,
    /// Parent node; `None` lists the space root
    pub parent_node_token: Option<String>,
    /// Continuation token from the previous page
    pub page_token: Option<String>,
    /// Items per page
    pub page_size: u32,
}

/// Payload of `WikiListNodes`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListNodesData {
    /// Nodes of this page
    #[serde(default)]
    pub items: Vec<WikiNode>,
    /// More pages follow
    #[serde(default)]
    pub has_more: bool,
    /// Continuation token
    #[serde(default)]
    pub page_token: Option<String>,
}

/// Body of `ExportCreate`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreateExportRequest {
    /// Target artifact extension (`docx`, `pdf`, `xlsx`, `csv`)
    pub file_extension: String,
    /// Document token
    pub token: String,
    /// Document kind
    #[serde(rename = "type")]
    pub doc_type: String,
}

/// Payload of `ExportCreate`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CreateExportData {
    /// Job ticket
    #[serde(default)]
    pub ticket: String,
}

/// State of an export job
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ExportTask {
    /// `0` done, `1`/`2` in progress, anything above failed
    #[serde(default)]
    pub job_status: i64,
    /// Failure reason when `job_status > 2`
    #[serde(default)]
    pub job_error_msg: String,
    /// Token for the export download endpoint
    #[serde(default)]
    pub file_token: String,
    /// Artifact size in bytes
    #[serde(default)]
    pub file_size: u64,
    /// Artifact extension
    #[serde(default)]
    pub file_extension: String,
}

/// Payload of `ExportGet`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GetExportData {
    /// Job state
    #[serde(default)]
    pub result: ExportTask,
}

/// Capability set the pipeline consumes
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Resolve metadata for a batch of documents
    async fn drive_batch_query_meta(
        &self,
        docs: Vec<RequestDoc>,
    ) -> Result<ApiResponse<BatchQueryMetaData>>;

    /// List one page of a drive folder
    async fn drive_list_children(
        &self,
        request: ListFilesRequest,
    ) -> Result<ApiResponse<ListFilesData>>;

    /// Stream an uploaded file
    async fn drive_download(&self, file_token: &str) -> Result<DownloadResponse>;

    /// Resolve a wiki node token
    async fn wiki_get_node(&self, token: &str) -> Result<ApiResponse<GetNodeData>>;

    /// Fetch wiki space information
    async fn wiki_get_space(&self, space_id: &str) -> Result<ApiResponse<GetSpaceData>>;

    /// List one page of wiki children
    async fn wiki_list_nodes(
        &self,
        request: ListNodesRequest,
    ) -> Result<ApiResponse<ListNodesData>>;

    /// Start an export job
    async fn export_create(
        &self,
        request: CreateExportRequest,
    ) -> Result<ApiResponse<CreateExportData>>;

    /// Query an export job
    async fn export_get(&self, ticket: &str, token: &str) -> Result<ApiResponse<GetExportData>>;

    /// Stream an exported artifact
    async fn export_download(&self, file_token: &str) -> Result<DownloadResponse>;
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_without_data() {
        let resp: ApiResponse<CreateExportData> =
            serde_json::from_str(r#"{"code": 1069902, "msg": "no permission"}"#).unwrap();
        assert_eq!(resp.code, 1069902);
        assert!(resp.data.is_none());
        let err = resp
            .with_request_id(Some("log-1".into()))
            .into_data("create export task")
            .unwrap_err();
        assert_eq!(err.request_id(), Some("log-1"));
    }

    #[test]
    fn export_task_parses() {
        let json = r#"{"code":0,"msg":"success","data":{"result":{
            "file_extension":"docx","type":"docx","file_name":"a",
            "file_token":"boxcnX","file_size":34356,"job_error_msg":"success","job_status":0}}}"#;
        let resp: ApiResponse<GetExportData> = serde_json::from_str(json).unwrap();
        let task = resp.into_data("query export task").unwrap().result;
        assert_eq!(task.file_token, "boxcnX");
        assert_eq!(task.file_size, 34356);
        assert_eq!(task.job_status, 0);
    }

    #[test]
    fn drive_listing_parses_shortcuts() {
        let json = r#"{"code":0,"data":{"files":[
            {"token":"s1","name":"link","type":"shortcut","parent_token":"f",
             "shortcut_info":{"target_type":"docx","target_token":"dox9"}}],
            "has_more":false}}"#;
        let resp: ApiResponse<ListFilesData> = serde_json::from_str(json).unwrap();
        let data = resp.into_data("list drive files").unwrap();
        let info = data.files[0].shortcut_info.clone().unwrap();
        assert_eq!(info.target_token, "dox9");
        assert!(data.next_page_token.is_none());
    }

    #[test]
    fn missing_data_on_success_is_an_error() {
        let resp: ApiResponse<GetSpaceData> = ApiResponse {
            code: 0,
            msg: String::new(),
            data: None,
            request_id: None,
        };
        assert!(resp.into_data("get wiki space").is_err());
    }

    #[test]
    fn download_error_envelope() {
        let resp = DownloadResponse::error(1061004, "forbidden");
        let err = resp.into_body("download file").unwrap_err();
        assert!(err.to_string().contains("1061004"));
    }
}
