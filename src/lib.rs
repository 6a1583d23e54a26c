//! # feishu-export
//!
//! Bulk exporter for Feishu/Lark cloud documents.
//!
//! Given URLs of documents, drive folders, wiki nodes or whole wiki spaces,
//! the crate discovers the document tree, converts structured documents
//! (docs, sheets, bitables) to office files through remote export jobs, and
//! streams everything to a local directory that mirrors the tree.
//!
//! ## Pipeline
//!
//! 1. [`source`] parses URLs into `(host, kind, token)` triples
//! 2. [`discovery`] walks wiki spaces and drive folders through a [`cloud::CloudClient`]
//! 3. [`naming`] normalizes names and extensions and assigns unique local paths
//! 4. [`task`] runs exporter and downloader workers joined by a bounded queue,
//!    reporting to the [`progress`] program
//!
//! ## Quick Start
//!
//! ```no_run
//! use feishu_export::{Config, Discoverer, FeishuClient, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         app_id: "cli_xxx".to_string(),
//!         app_secret: "secret".to_string(),
//!         doc_urls: vec!["https://sample.feishu.cn/drive/folder/fldcnXXXX".to_string()],
//!         ..Default::default()
//!     };
//!     config.validate()?;
//!
//!     let client = Arc::new(FeishuClient::from_config(&config, "sample.feishu.cn")?);
//!     let roots = Discoverer::new(client.as_ref(), &config)
//!         .discover_urls(&config.doc_urls)
//!         .await?;
//!
//!     let summary = Orchestrator::new(client, config).run(roots).await?;
//!     println!("{} files written", summary.stats.downloaded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Open API facade and its implementations
pub mod cloud;
/// Configuration types
pub mod config;
/// Document tree discovery
pub mod discovery;
/// Error types
pub mod error;
/// Export jobs and download streams
pub mod exporter;
/// Filesystem abstraction
pub mod fs;
/// Name normalization and local paths
pub mod naming;
/// Live multi-file progress
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Source URL parsing
pub mod source;
/// Run orchestration and worker pools
pub mod task;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;
/// Streaming writer with progress reporting
pub mod writer;

// Re-export commonly used types
pub use cloud::{CloudClient, FeishuClient, MemoryCloud};
pub use config::{Config, DiscoveryConfig, PacingConfig, RetryConfig, WorkerConfig};
pub use discovery::Discoverer;
pub use error::{Error, ErrorKind, Result};
pub use progress::{Frontend, ProgressHandle, ProgressProgram};
pub use source::{DocumentSource, analyse_url};
pub use task::{Orchestrator, RunSummary};
pub use types::{DocType, DocumentNode, Status};
