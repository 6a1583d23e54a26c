//! Document tree discovery
//!
//! [`Discoverer`] turns a [`DocumentSource`] into a [`DocumentNode`] tree by
//! walking the wiki or drive hierarchy below it. Every node goes through
//! [`normalize_node`] as it is built, so the returned tree already carries
//! types, extensions and download flags; only paths are left for
//! [`crate::naming::assign_paths`].

use crate::cloud::{
    CloudClient, DocMeta, ListFilesRequest, ListNodesRequest, RequestDoc, WikiNode, fetch_data,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming::normalize_node;
use crate::source::{
    DocumentSource, KIND_FOLDER, KIND_WIKI, KIND_WIKI_SPACE, parse_sources,
};
use crate::types::{DocType, DocumentNode};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info};

/// Walks remote hierarchies into document trees
pub struct Discoverer<'a> {
    client: &'a dyn CloudClient,
    config: &'a Config,
}

impl<'a> Discoverer<'a> {
    /// Discoverer reading through `client`, limited by `config.discovery`
    pub fn new(client: &'a dyn CloudClient, config: &'a Config) -> Self {
        Self { client, config }
    }

    /// Discover every configured URL; all of them must share one host
    pub async fn discover_urls(&self, urls: &[String]) -> Result<Vec<DocumentNode>> {
        let sources = parse_sources(urls)?;
        let mut roots = Vec::with_capacity(sources.len());
        for source in &sources {
            roots.push(self.discover(source).await?);
        }
        Ok(roots)
    }

    /// Discover the tree below one source
    pub async fn discover(&self, source: &DocumentSource) -> Result<DocumentNode> {
        info!(kind = %source.kind, token = %source.token, "Discovering documents");
        match source.kind.as_str() {
            KIND_WIKI => self.wiki_node(source).await,
            KIND_WIKI_SPACE => self.wiki_space(source).await,
            KIND_FOLDER => self.drive_folder(source).await,
            _ => match source.single_doc_type() {
                Some(doc_type) => self.single_document(source, doc_type).await,
                None => Err(Error::InvalidArgument(format!(
                    "unsupported document kind {}",
                    source.kind
                ))),
            },
        }
    }

    fn check_wiki_deadline(&self) -> Result<()> {
        let elapsed = self.config.elapsed();
        let deadline = self.config.discovery.wiki_deadline;
        if elapsed > deadline {
            return Err(Error::Timeout(format!(
                "wiki discovery exceeded {}s",
                deadline.as_secs()
            )));
        }
        Ok(())
    }

    fn normalized(&self, mut node: DocumentNode) -> DocumentNode {
        normalize_node(&mut node, &self.config.file_extensions);
        node
    }

    fn wiki_document(&self, source: &DocumentSource, item: &WikiNode) -> DocumentNode {
        self.normalized(DocumentNode {
            name: item.title.clone(),
            doc_type: DocType::from(item.obj_type.as_str()),
            token: item.obj_token.clone(),
            url: source.url_for(KIND_WIKI, &item.node_token),
            node_token: item.node_token.clone(),
            space_id: item.space_id.clone(),
            ..Default::default()
        })
    }

    async fn wiki_node(&self, source: &DocumentSource) -> Result<DocumentNode> {
        self.check_wiki_deadline()?;
        let token = source.token.as_str();
        let item = fetch_data(&self.config.retry, "get wiki node", |_| {
            self.client.wiki_get_node(token)
        })
        .await?
        .node;

        let mut node = self.wiki_document(source, &item);
        if item.has_child {
            node.children = self
                .wiki_children(source, &item.space_id, Some(&item.node_token))
                .await?;
        }
        Ok(node)
    }

    async fn wiki_space(&self, source: &DocumentSource) -> Result<DocumentNode> {
        self.check_wiki_deadline()?;
        let space_id = source.token.as_str();
        let space = fetch_data(&self.config.retry, "get wiki space", |_| {
            self.client.wiki_get_space(space_id)
        })
        .await?
        .space;

        let mut root = self.normalized(DocumentNode {
            space_id: space_id.to_string(),
            url: source.url_for(KIND_WIKI_SPACE, space_id),
            ..DocumentNode::folder(space.name)
        });
        root.children = self.wiki_children(source, space_id, None).await?;
        Ok(root)
    }

    fn wiki_children<'b>(
        &'b self,
        source: &'b DocumentSource,
        space_id: &'b str,
        parent: Option<&'b str>,
    ) -> BoxFuture<'b, Result<Vec<DocumentNode>>> {
        async move {
            let mut children = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                self.check_wiki_deadline()?;
                let request = ListNodesRequest {
                    space_id: space_id.to_string(),
                    parent_node_token: parent.map(str::to_string),
                    page_token: page_token.clone(),
                    page_size: self.config.discovery.wiki_page_size,
                };
                let page = fetch_data(&self.config.retry, "list wiki nodes", |_| {
                    self.client.wiki_list_nodes(request.clone())
                })
                .await?;
                debug!(
                    space_id,
                    parent = parent.unwrap_or_default(),
                    items = page.items.len(),
                    "Listed wiki nodes"
                );

                for item in &page.items {
                    let mut node = self.wiki_document(source, item);
                    if item.has_child {
                        node.children = self
                            .wiki_children(source, space_id, Some(&item.node_token))
                            .await?;
                    }
                    children.push(node);
                }

                match page.page_token.filter(|t| !t.is_empty()) {
                    Some(next) if page.has_more => page_token = Some(next),
                    _ => break,
                }
            }
            Ok(children)
        }
        .boxed()
    }

    async fn drive_folder(&self, source: &DocumentSource) -> Result<DocumentNode> {
        let meta = self.query_meta(&source.token, DocType::Folder).await?;
        let mut root = self.normalized(DocumentNode {
            name: meta.title,
            doc_type: DocType::Folder,
            token: source.token.clone(),
            url: non_empty_or(meta.url, || source.url_for(KIND_FOLDER, &source.token)),
            ..Default::default()
        });
        root.children = self.drive_children(source, &source.token).await?;
        Ok(root)
    }

    fn drive_children<'b>(
        &'b self,
        source: &'b DocumentSource,
        folder_token: &'b str,
    ) -> BoxFuture<'b, Result<Vec<DocumentNode>>> {
        async move {
            let mut children = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut request =
                    ListFilesRequest::new(folder_token, self.config.discovery.drive_page_size);
                request.page_token = page_token.clone();
                let page = fetch_data(&self.config.retry, "list drive files", |_| {
                    self.client.drive_list_children(request.clone())
                })
                .await?;
                debug!(folder_token, files = page.files.len(), "Listed drive folder");

                for file in page.files {
                    let (doc_type, token) = match &file.shortcut_info {
                        Some(target) if file.file_type == DocType::Shortcut.as_str() => {
                            (target.target_type.clone(), target.target_token.clone())
                        }
                        _ => (file.file_type.clone(), file.token.clone()),
                    };
                    let doc_type = DocType::from(doc_type);
                    let url = non_empty_or(file.url, || {
                        let kind = match doc_type {
                            DocType::Folder => KIND_FOLDER.to_string(),
                            ref other => format!("/{other}"),
                        };
                        source.url_for(&kind, &token)
                    });

                    let mut node = self.normalized(DocumentNode {
                        name: file.name,
                        doc_type,
                        token,
                        url,
                        ..Default::default()
                    });
                    if node.is_folder() {
                        node.children = self.drive_children(source, &node.token).await?;
                    }
                    children.push(node);
                }

                match page.next_page_token.filter(|t| !t.is_empty()) {
                    Some(next) if page.has_more => page_token = Some(next),
                    _ => break,
                }
            }
            Ok(children)
        }
        .boxed()
    }

    async fn single_document(
        &self,
        source: &DocumentSource,
        doc_type: DocType,
    ) -> Result<DocumentNode> {
        let meta = self.query_meta(&source.token, doc_type.clone()).await?;
        Ok(self.normalized(DocumentNode {
            name: meta.title,
            doc_type,
            token: source.token.clone(),
            url: non_empty_or(meta.url, || source.url_for(&source.kind, &source.token)),
            ..Default::default()
        }))
    }

    async fn query_meta(&self, token: &str, doc_type: DocType) -> Result<DocMeta> {
        let docs = vec![RequestDoc {
            doc_token: token.to_string(),
            doc_type: doc_type.to_string(),
        }];
        let data = fetch_data(&self.config.retry, "query document meta", |_| {
            self.client.drive_batch_query_meta(docs.clone())
        })
        .await?;

        if let Some(failed) = data.failed_list.first() {
            return Err(Error::remote(
                "query document meta",
                failed.code,
                format!("token {} could not be resolved", failed.token),
                None,
            ));
        }
        data.metas
            .into_iter()
            .find(|m| m.doc_token == token)
            .ok_or_else(|| Error::Other(format!("no metadata returned for token {token}")))
    }
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() { fallback() } else { value }
}
