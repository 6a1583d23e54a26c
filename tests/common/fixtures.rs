//! In-memory workspaces used across the pipeline tests

use feishu_export::MemoryCloud;
use std::sync::Arc;

/// Host every fixture URL points at
pub const HOST: &str = "sample.feishu.cn";

pub fn folder_url(token: &str) -> String {
    format!("https://{HOST}/drive/folder/{token}")
}

pub fn wiki_space_url(space_id: &str) -> String {
    format!("https://{HOST}/wiki/settings/{space_id}")
}

/// Folder `Shared` holding two documents that need export and one uploaded workbook
pub fn three_documents() -> (Arc<MemoryCloud>, Vec<String>) {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.add_folder("fldShared", "Shared");
    cloud.add_document("doxPlan", "docx", "Plan", b"plan as docx");
    cloud.add_document("shtBudget", "sheet", "Budget", b"budget as xlsx");
    cloud.add_document("boxReport", "file", "report.xlsx", b"uploaded workbook");
    for token in ["doxPlan", "shtBudget", "boxReport"] {
        cloud.add_to_folder("fldShared", token);
    }
    cloud.set_pending_polls("doxPlan", 1);
    (cloud, vec![folder_url("fldShared")])
}

/// Folder with `count` documents, all exported
pub fn many_documents(count: usize) -> (Arc<MemoryCloud>, Vec<String>) {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.add_folder("fldMany", "Many");
    for i in 0..count {
        let token = format!("dox{i:03}");
        cloud.add_document(&token, "docx", &format!("Doc {i:03}"), &vec![b'x'; 4096]);
        cloud.add_to_folder("fldMany", &token);
    }
    (cloud, vec![folder_url("fldMany")])
}

/// Wiki space whose pages share titles and include an untitled page
pub fn wiki_with_duplicates() -> (Arc<MemoryCloud>, Vec<String>) {
    let cloud = Arc::new(MemoryCloud::new());
    cloud.add_wiki_space("7001", "Handbook");
    cloud.add_document("doxA1", "docx", "Notes", b"first");
    cloud.add_document("doxA2", "docx", "Notes", b"second");
    cloud.add_document("doxB", "docx", "", b"untitled");
    cloud.add_document("doxC", "doc", "Child", b"nested");
    cloud.add_wiki_node("7001", None, "wikA1", "doxA1");
    cloud.add_wiki_node("7001", None, "wikA2", "doxA2");
    cloud.add_wiki_node("7001", None, "wikB", "doxB");
    cloud.add_wiki_node("7001", Some("wikA1"), "wikC", "doxC");
    (cloud, vec![wiki_space_url("7001")])
}
