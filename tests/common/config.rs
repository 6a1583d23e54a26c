//! Test configuration helpers

use feishu_export::config::{Config, PacingConfig, RetryConfig};
use std::path::Path;
use std::time::Duration;

/// Configuration for in-memory runs: no pauses, millisecond retry backoff
pub fn test_config(save_dir: &Path, urls: &[String]) -> Config {
    Config {
        app_id: "cli_test".to_string(),
        app_secret: "secret".to_string(),
        doc_urls: urls.to_vec(),
        save_dir: save_dir.to_path_buf(),
        quit_automatically: true,
        retry: RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        },
        pacing: PacingConfig::immediate(),
        ..Default::default()
    }
}

/// Credentials and source URL of a real tenant
pub struct LiveCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub url: String,
}

/// Load live credentials from `.env`
///
/// Required environment variables:
/// - `FEISHU_APP_ID` - App id of a self-built app
/// - `FEISHU_APP_SECRET` - Its secret
/// - `FEISHU_TEST_URL` - A small folder or document the app can read
pub fn load_live_credentials() -> Option<LiveCredentials> {
    dotenvy::dotenv().ok();
    Some(LiveCredentials {
        app_id: std::env::var("FEISHU_APP_ID").ok()?,
        app_secret: std::env::var("FEISHU_APP_SECRET").ok()?,
        url: std::env::var("FEISHU_TEST_URL").ok()?,
    })
}
