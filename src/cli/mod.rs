//! Command-line interface
//!
//! Builds a [`Config`] from flags, environment and an optional JSON file,
//! sets up logging, then runs discovery and the export pipeline.

use anyhow::{Context, Result, bail};
use clap::Parser;
use feishu_export::progress::Frontend;
use feishu_export::source::parse_sources;
use feishu_export::task::RunSummary;
use feishu_export::{CloudClient, Config, DocType, Discoverer, FeishuClient, Orchestrator, utils};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod demo;

/// Log file written inside the save directory while the progress display is up
const LOG_FILE_NAME: &str = "feishu-export.log";

/// Export Feishu/Lark cloud documents, folders and wiki spaces to local files
#[derive(Parser, Debug)]
#[command(name = "feishu-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Document, drive folder, wiki node or wiki space URLs (one host per run)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// App id of the self-built application
    #[arg(long, env = "FEISHU_APP_ID")]
    app_id: Option<String>,

    /// App secret of the self-built application
    #[arg(long, env = "FEISHU_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory [default: dist]
    #[arg(short, long, value_name = "DIR")]
    save_dir: Option<PathBuf>,

    /// Export a document kind to another format, e.g. `docx=pdf` or `sheet=csv`
    #[arg(short = 'e', long = "file-extension", value_name = "KIND=EXT", value_parser = parse_extension)]
    file_extensions: Vec<(DocType, String)>,

    /// Only discover and write document-tree.json
    #[arg(short, long)]
    list_only: bool,

    /// Leave the progress display when every file finished
    #[arg(short, long)]
    quit_automatically: bool,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long)]
    verbose: bool,

    /// Override the Open API base URL
    #[arg(long, value_name = "URL")]
    api_base_url: Option<String>,

    /// Log progress instead of drawing it (implied when stdout is not a terminal)
    #[arg(long)]
    headless: bool,

    /// Run against a built-in in-memory workspace instead of the Open API
    #[arg(long)]
    demo: bool,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = build_config(&cli)?;

    let frontend = if cli.headless || !std::io::stdout().is_terminal() {
        Frontend::Headless
    } else {
        Frontend::Terminal
    };
    if frontend == Frontend::Headless {
        config.quit_automatically = true;
    }

    let client: Arc<dyn CloudClient> = if cli.demo {
        let (workspace, urls) = demo::workspace();
        if config.doc_urls.is_empty() {
            config.doc_urls = urls;
        }
        config.app_id = "demo".into();
        config.app_secret = "demo".into();
        config.validate()?;
        Arc::new(workspace)
    } else {
        config.validate()?;
        let sources = parse_sources(&config.doc_urls)?;
        let host = sources
            .first()
            .map(|s| s.host.clone())
            .context("no source url given")?;
        Arc::new(FeishuClient::from_config(&config, &host)?)
    };

    let log_file = (frontend == Frontend::Terminal && !config.list_only)
        .then(|| config.save_dir.join(LOG_FILE_NAME));
    init_tracing(config.verbose, log_file.as_deref())?;
    if let Some(tip) = utils::platform_tip() {
        eprintln!("{tip}");
    }

    let roots = Discoverer::new(client.as_ref(), &config)
        .discover_urls(&config.doc_urls)
        .await
        .map_err(|e| anyhow::anyhow!(link(&e.to_string())))
        .context("failed to discover documents")?;

    let summary = Orchestrator::new(client, config)
        .with_frontend(frontend)
        .run(roots)
        .await
        .context("export run failed")?;

    report(&summary, log_file.as_deref());
    if !summary.failures.is_empty() {
        bail!(
            "{} of {} files failed",
            summary.failures.len(),
            summary.stats.total
        );
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if !cli.urls.is_empty() {
        config.doc_urls = cli.urls.clone();
    }
    if let Some(app_id) = &cli.app_id {
        config.app_id = app_id.clone();
    }
    if let Some(app_secret) = &cli.app_secret {
        config.app_secret = app_secret.clone();
    }
    if let Some(save_dir) = &cli.save_dir {
        config.save_dir = save_dir.clone();
    }
    for (doc_type, ext) in &cli.file_extensions {
        config.file_extensions.insert(doc_type.clone(), ext.clone());
    }
    if cli.api_base_url.is_some() {
        config.api_base_url = cli.api_base_url.clone();
    }
    config.list_only |= cli.list_only;
    config.quit_automatically |= cli.quit_automatically;
    config.verbose |= cli.verbose;
    config.start_time = chrono::Local::now();
    Ok(config)
}

fn parse_extension(raw: &str) -> std::result::Result<(DocType, String), String> {
    let (kind, ext) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KIND=EXT, got {raw:?}"))?;
    let kind = kind.trim().to_lowercase();
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if kind.is_empty() || ext.is_empty() {
        return Err(format!("expected KIND=EXT, got {raw:?}"));
    }
    Ok((DocType::from(kind), ext))
}

/// Install the tracing subscriber
///
/// RUST_LOG takes precedence; otherwise `--verbose` selects DEBUG and the
/// default is INFO. With `log_file` set, output goes there instead of stderr
/// so it never tears the progress display.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .with(filter)
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(filter)
                .try_init();
        }
    }
    Ok(())
}

fn link(message: &str) -> String {
    utils::link_request_id(message, utils::supports_hyperlinks())
}

fn report(summary: &RunSummary, log_file: Option<&Path>) {
    let stats = &summary.stats;
    println!("Document tree: {}", summary.tree_path.display());
    if stats.total > 0 {
        println!(
            "Files: {} total, {} downloaded, {} failed",
            stats.total, stats.downloaded, stats.failed
        );
    }
    for row in &summary.failures {
        println!(
            "  failed {}: {}",
            row.key,
            link(row.message.as_deref().unwrap_or("unknown error"))
        );
    }
    if let Some(path) = log_file {
        println!("Log: {}", path.display());
    }
    let elapsed = utils::format_duration(summary.elapsed);
    tracing::info!(elapsed = %elapsed, "Done");
    println!("Done in {elapsed}");
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_overrides() {
        assert_eq!(
            parse_extension("docx=pdf").unwrap(),
            (DocType::Docx, "pdf".to_string())
        );
        assert_eq!(
            parse_extension(" Sheet = .CSV ").unwrap(),
            (DocType::Sheet, "csv".to_string())
        );
        assert!(parse_extension("docx").is_err());
        assert!(parse_extension("=pdf").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "feishu-export",
            "--app-id",
            "cli_a",
            "--app-secret",
            "s3cret",
            "-s",
            "out",
            "-e",
            "docx=pdf",
            "--list-only",
            "https://sample.feishu.cn/docx/doxA",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.app_id, "cli_a");
        assert_eq!(config.save_dir, PathBuf::from("out"));
        assert_eq!(config.file_extensions[&DocType::Docx], "pdf");
        assert!(config.list_only);
        assert_eq!(config.doc_urls, vec!["https://sample.feishu.cn/docx/doxA"]);
        config.validate().unwrap();
    }

    #[test]
    fn config_file_is_the_base_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"app_id": "cli_file", "app_secret": "x", "save_dir": "from-file", "workers": {"exporters": 2}}"#,
        )
        .unwrap();
        let cli = Cli::parse_from([
            "feishu-export",
            "-c",
            path.to_str().unwrap(),
            "--app-id",
            "cli_flag",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.app_id, "cli_flag");
        assert_eq!(config.save_dir, PathBuf::from("from-file"));
        assert_eq!(config.workers.exporters, 2);
        assert_eq!(config.workers.downloaders, 3);
    }
}
