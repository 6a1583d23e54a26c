//! HTTP implementation of [`CloudClient`] on top of reqwest

use super::{
    ApiResponse, BatchQueryMetaData, CloudClient, CreateExportData, CreateExportRequest,
    DownloadBody, DownloadResponse, GetExportData, GetNodeData, GetSpaceData, ListFilesData,
    ListFilesRequest, ListNodesData, ListNodesRequest, RequestDoc,
};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Response header carrying the server-side log id
const LOG_ID_HEADER: &str = "X-Tt-Logid";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TenantTokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    #[serde(default)]
    expire: u64,
}

/// Feishu Open API client authenticated as a self-built app
///
/// A tenant access token is fetched on first use and cached until shortly
/// before it expires. The cache sits behind an async mutex so concurrent
/// workers share one token.
pub struct FeishuClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for FeishuClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeishuClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl FeishuClient {
    /// Create a client for the Open API rooted at `base_url`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("feishu-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            token: Mutex::new(None),
        })
    }

    /// Create a client for the API region serving `host`
    pub fn from_config(config: &Config, host: &str) -> Result<Self> {
        Self::new(
            config.api_base_for_host(host),
            config.app_id.clone(),
            config.app_secret.clone(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn tenant_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .http
            .post(self.url("/auth/v3/tenant_access_token/internal"))
            .json(&serde_json::json!({
                "app_id": self.app_id,
                "app_secret": self.app_secret,
            }))
            .send()
            .await?;
        let request_id = log_id(&response);
        let body: TenantTokenResponse = response.json().await?;
        if body.code != 0 {
            return Err(Error::remote(
                "get tenant access token",
                body.code,
                body.msg,
                request_id,
            ));
        }

        debug!(expire = body.expire, "Fetched tenant access token");
        *cached = Some(CachedToken {
            value: body.tenant_access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(body.expire),
        });
        Ok(body.tenant_access_token)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<ApiResponse<T>> {
        let token = self.tenant_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let request_id = log_id(&response);
        let bytes = response.bytes().await?;

        match serde_json::from_slice::<ApiResponse<T>>(&bytes) {
            Ok(parsed) => Ok(parsed.with_request_id(request_id)),
            Err(_) if !status.is_success() => {
                Ok(ApiResponse::error(i64::from(status.as_u16()), status_text(status))
                    .with_request_id(request_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, path: &str) -> Result<DownloadResponse> {
        let token = self.tenant_token().await?;
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        let status = response.status();
        let request_id = log_id(&response);

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if status.is_success() && !is_json {
            let content_length = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let stream = response.bytes_stream().map_err(std::io::Error::other);
            let mut ok = DownloadResponse::ok(DownloadBody {
                reader: Box::pin(StreamReader::new(stream)),
                content_length,
            });
            ok.request_id = request_id;
            return Ok(ok);
        }

        // Error bodies are the usual JSON envelope, whatever the HTTP status
        let bytes = response.bytes().await?;
        let (code, msg) = match serde_json::from_slice::<ApiResponse<serde_json::Value>>(&bytes) {
            Ok(envelope) if envelope.code != 0 => (envelope.code, envelope.msg),
            _ => (i64::from(status.as_u16()), status_text(status)),
        };
        Ok(DownloadResponse {
            code,
            msg,
            request_id,
            body: None,
        })
    }
}

fn log_id(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LOG_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn status_text(status: StatusCode) -> String {
    format!(
        "HTTP {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl CloudClient for FeishuClient {
    async fn drive_batch_query_meta(
        &self,
        docs: Vec<RequestDoc>,
    ) -> Result<ApiResponse<BatchQueryMetaData>> {
        let request = self
            .http
            .post(self.url("/drive/v1/metas/batch_query"))
            .json(&serde_json::json!({
                "request_docs": docs,
                "with_url": true,
            }));
        self.send_json(request).await
    }

    async fn drive_list_children(
        &self,
        request: ListFilesRequest,
    ) -> Result<ApiResponse<ListFilesData>> {
        let mut query = vec![
            ("folder_token", request.folder_token),
            ("page_size", request.page_size.to_string()),
            ("order_by", request.order_by),
            ("direction", request.direction),
        ];
        if let Some(page_token) = request.page_token {
            query.push(("page_token", page_token));
        }
        let builder = self.http.get(self.url("/drive/v1/files")).query(&query);
        self.send_json(builder).await
    }

    async fn drive_download(&self, file_token: &str) -> Result<DownloadResponse> {
        self.download(&format!("/drive/v1/files/{}/download", encode(file_token)))
            .await
    }

    async fn wiki_get_node(&self, token: &str) -> Result<ApiResponse<GetNodeData>> {
        let builder = self
            .http
            .get(self.url("/wiki/v2/spaces/get_node"))
            .query(&[("token", token), ("obj_type", "wiki")]);
        self.send_json(builder).await
    }

    async fn wiki_get_space(&self, space_id: &str) -> Result<ApiResponse<GetSpaceData>> {
        let builder = self
            .http
            .get(self.url(&format!("/wiki/v2/spaces/{}", encode(space_id))));
        self.send_json(builder).await
    }

    async fn wiki_list_nodes(
        &self,
        request: ListNodesRequest,
    ) -> Result<ApiResponse<ListNodesData>> {
        let mut query = vec![("page_size", request.page_size.to_string())];
        if let Some(page_token) = request.page_token {
            query.push(("page_token", page_token));
        }
        if let Some(parent) = request.parent_node_token {
            query.push(("parent_node_token", parent));
        }
        let builder = self
            .http
            .get(self.url(&format!(
                "/wiki/v2/spaces/{}/nodes",
                encode(&request.space_id)
            )))
            .query(&query);
        self.send_json(builder).await
    }

    async fn export_create(
        &self,
        request: CreateExportRequest,
    ) -> Result<ApiResponse<CreateExportData>> {
        let builder = self
            .http
            .post(self.url("/drive/v1/export_tasks"))
            .json(&request);
        self.send_json(builder).await
    }

    async fn export_get(&self, ticket: &str, token: &str) -> Result<ApiResponse<GetExportData>> {
        let builder = self
            .http
            .get(self.url(&format!("/drive/v1/export_tasks/{}", encode(ticket))))
            .query(&[("token", token)]);
        self.send_json(builder).await
    }

    async fn export_download(&self, file_token: &str) -> Result<DownloadResponse> {
        self.download(&format!(
            "/drive/v1/export_tasks/file/{}/download",
            encode(file_token)
        ))
        .await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RemoteStatus;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .and(body_json(serde_json::json!({
                "app_id": "cli_test",
                "app_secret": "secret",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-abc",
                "expire": 7200,
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> FeishuClient {
        FeishuClient::new(server.uri(), "cli_test", "secret").unwrap()
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/wiki/v2/spaces/get_node"))
            .and(query_param("token", "wikcnA"))
            .and(query_param("obj_type", "wiki"))
            .and(header_eq("authorization", "Bearer t-abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Tt-Logid", "log-42")
                    .set_body_json(serde_json::json!({
                        "code": 0,
                        "data": {"node": {
                            "space_id": "sp1", "node_token": "wikcnA",
                            "obj_token": "doxA", "obj_type": "docx",
                            "title": "Root", "has_child": true
                        }}
                    })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        for _ in 0..2 {
            let resp = client.wiki_get_node("wikcnA").await.unwrap();
            assert_eq!(resp.request_id.as_deref(), Some("log-42"));
            let node = resp.into_data("get wiki node").unwrap().node;
            assert_eq!(node.obj_token, "doxA");
            assert!(node.has_child);
        }
    }

    #[tokio::test]
    async fn token_failure_is_a_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v3/tenant_access_token/internal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 10003,
                "msg": "invalid param",
            })))
            .mount(&server)
            .await;

        let err = client(&server).wiki_get_space("sp1").await.unwrap_err();
        match err {
            Error::Remote { operation, code, .. } => {
                assert_eq!(operation, "get tenant access token");
                assert_eq!(code, 10003);
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drive_listing_sends_paging_and_order() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/drive/v1/files"))
            .and(query_param("folder_token", "fldA"))
            .and(query_param("page_size", "200"))
            .and(query_param("order_by", "EditedTime"))
            .and(query_param("direction", "DESC"))
            .and(query_param("page_token", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 0,
                "data": {"files": [{"token": "doxB", "name": "B", "type": "docx"}], "has_more": false}
            })))
            .mount(&server)
            .await;

        let mut request = ListFilesRequest::new("fldA", 200);
        request.page_token = Some("p2".into());
        let data = client(&server)
            .drive_list_children(request)
            .await
            .unwrap()
            .into_data("list drive files")
            .unwrap();
        assert_eq!(data.files.len(), 1);
        assert_eq!(data.files[0].file_type, "docx");
    }

    #[tokio::test]
    async fn rate_limit_code_is_surfaced_not_raised() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/drive/v1/export_tasks"))
            .and(body_json(serde_json::json!({
                "file_extension": "docx", "token": "doxA", "type": "docx"
            })))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 99991400,
                "msg": "request trigger frequency limit",
            })))
            .mount(&server)
            .await;

        let resp = client(&server)
            .export_create(CreateExportRequest {
                file_extension: "docx".into(),
                token: "doxA".into(),
                doc_type: "docx".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.code(), 99991400);
    }

    #[tokio::test]
    async fn download_streams_body_with_length() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/drive/v1/export_tasks/file/boxA/download"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(b"hello world".to_vec()),
            )
            .mount(&server)
            .await;

        let body = client(&server)
            .export_download("boxA")
            .await
            .unwrap()
            .into_body("download exported file")
            .unwrap();
        assert_eq!(body.content_length, Some(11));

        let mut reader = body.reader;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello world");
    }

    #[tokio::test]
    async fn download_error_envelope_is_parsed() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/drive/v1/files/boxB/download"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("X-Tt-Logid", "log-7")
                    .set_body_json(serde_json::json!({
                        "code": 1061004,
                        "msg": "forbidden",
                    })),
            )
            .mount(&server)
            .await;

        let resp = client(&server).drive_download("boxB").await.unwrap();
        assert_eq!(resp.code, 1061004);
        assert!(resp.body.is_none());
        let err = resp.into_body("download file").unwrap_err();
        assert_eq!(err.request_id(), Some("log-7"));
    }

    #[tokio::test]
    async fn non_json_failure_maps_to_http_status() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path("/wiki/v2/spaces/sp1"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let resp = client(&server).wiki_get_space("sp1").await.unwrap();
        assert_eq!(resp.code, 502);
        assert!(resp.msg.starts_with("HTTP 502"));
    }
}
