//! Built-in workspace for `--demo`

use feishu_export::MemoryCloud;
use std::time::Duration;

const HOST: &str = "demo.feishu.cn";

/// A small wiki space and drive folder, with one export that fails
pub fn workspace() -> (MemoryCloud, Vec<String>) {
    let cloud = MemoryCloud::new();
    cloud.set_latency(Duration::from_millis(150));

    cloud.add_wiki_space("7000000000000000001", "Product Handbook");
    let pages = [
        ("wikRoadmap", "doxRoadmap", "docx", "Roadmap 2025", None),
        ("wikSpecs", "doxSpecs", "docx", "Specifications", None),
        ("wikApi", "doxApi", "docx", "API: Reference", Some("wikSpecs")),
        ("wikMetrics", "shtMetrics", "sheet", "Metrics", Some("wikSpecs")),
        ("wikBugs", "bscBugs", "bitable", "Bug tracker", None),
        ("wikLegacy", "docLegacy", "doc", "Legacy notes", None),
        ("wikUntitled", "doxUntitled", "docx", "", None),
    ];
    for (node, obj, kind, title, parent) in pages {
        cloud.add_document(obj, kind, title, &filler(title, 48 * 1024));
        cloud.set_pending_polls(obj, 2);
        cloud.add_wiki_node("7000000000000000001", parent, node, obj);
    }
    cloud.fail_export("docLegacy", "legacy documents cannot be exported");

    cloud.add_folder("fldShared", "Shared");
    cloud.add_document("boxReport", "file", "report.xlsx", &filler("report", 256 * 1024));
    cloud.add_document("boxSlides", "file", "kickoff.pdf", &filler("kickoff", 64 * 1024));
    cloud.hide_content_length("boxReport");
    cloud.add_document("doxMinutes", "docx", "Meeting minutes", &filler("minutes", 32 * 1024));
    cloud.add_to_folder("fldShared", "boxReport");
    cloud.add_to_folder("fldShared", "boxSlides");
    cloud.add_shortcut("fldShared", "Minutes (shortcut)", "doxMinutes");

    let urls = vec![
        format!("https://{HOST}/wiki/settings/7000000000000000001"),
        format!("https://{HOST}/drive/folder/fldShared"),
    ];
    (cloud, urls)
}

fn filler(seed: &str, len: usize) -> Vec<u8> {
    seed.bytes().chain(std::iter::repeat(b'.')).take(len).collect()
}
