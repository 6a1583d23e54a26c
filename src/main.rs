//! feishu-export: export Feishu/Lark documents, folders and wiki spaces to local files

use anyhow::Result;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
