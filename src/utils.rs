//! Utility functions shared across the pipeline

use crate::config::DelayRange;
use rand::Rng;
use std::time::Duration;

/// Search page that resolves a request id to its server-side log
pub const REQUEST_SEARCH_URL: &str = "https://open.feishu.cn/search?q=";

/// Collapse a possibly multi-line message onto one line
///
/// Line breaks become single spaces and blank lines disappear.
pub fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Draw a uniformly distributed duration from `range`
pub fn sample_delay(range: DelayRange) -> Duration {
    if range.max <= range.min {
        return range.min;
    }
    let secs = rand::thread_rng().gen_range(range.min.as_secs_f64()..=range.max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Sleep for a random duration drawn from `range`
pub async fn pause(range: DelayRange) {
    let delay = sample_delay(range);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Search URL for a failing request's log id
pub fn request_search_url(request_id: &str) -> String {
    format!("{}{}", REQUEST_SEARCH_URL, urlencoding::encode(request_id))
}

/// Whether the attached terminal advertises OSC-8 hyperlink support
///
/// Detection is environment based, the same signals most terminal-aware
/// tools check. `FORCE_HYPERLINK=0|1` overrides everything.
pub fn supports_hyperlinks() -> bool {
    if let Ok(force) = std::env::var("FORCE_HYPERLINK") {
        return force != "0";
    }
    if std::env::var_os("CI").is_some() {
        return false;
    }
    if std::env::var_os("WT_SESSION").is_some()
        || std::env::var_os("DOMTERM").is_some()
        || std::env::var_os("KONSOLE_VERSION").is_some()
    {
        return true;
    }
    if let Ok(vte) = std::env::var("VTE_VERSION") {
        if vte.parse::<u32>().is_ok_and(|v| v >= 5000) {
            return true;
        }
    }
    matches!(
        std::env::var("TERM_PROGRAM").as_deref(),
        Ok("iTerm.app" | "WezTerm" | "vscode" | "ghostty" | "Hyper")
    )
}

/// Wrap `text` in an OSC-8 hyperlink to `url`
pub fn hyperlink(url: &str, text: &str) -> String {
    format!("\x1b]8;;{url}\x1b\\{text}\x1b]8;;\x1b\\")
}

/// Render a request id as a link to its log search page
///
/// Falls back to `id (url)` when the terminal cannot show hyperlinks.
pub fn render_request_id(request_id: &str, hyperlinks: bool) -> String {
    let url = request_search_url(request_id);
    if hyperlinks {
        hyperlink(&url, request_id)
    } else {
        format!("{request_id} ({url})")
    }
}

/// Replace a `request_id=<id>` fragment of an error message with a rendered link
pub fn link_request_id(message: &str, hyperlinks: bool) -> String {
    const MARKER: &str = "request_id=";
    let Some(start) = message.find(MARKER) else {
        return message.to_string();
    };
    let id_start = start + MARKER.len();
    let id_end = message[id_start..]
        .find(|c: char| c.is_whitespace() || c == ',' || c == ')')
        .map_or(message.len(), |i| id_start + i);
    if id_start == id_end {
        return message.to_string();
    }
    format!(
        "{}request_id={}{}",
        &message[..start],
        render_request_id(&message[id_start..id_end], hyperlinks),
        &message[id_end..]
    )
}

/// Colour-support tip shown on Windows consoles
pub fn platform_tip() -> Option<&'static str> {
    if cfg!(windows) {
        Some("Tip: run this tool from PowerShell or cmd for colour output")
    } else {
        None
    }
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Human-readable duration, `1h02m03s` style
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{}.{:01}s", s, duration.subsec_millis() / 100)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_joins_lines() {
        assert_eq!(single_line("a\nb"), "a b");
        assert_eq!(single_line("  a  \r\n\r\n b "), "a b");
        assert_eq!(single_line(""), "");
    }

    #[test]
    fn sample_delay_stays_in_range() {
        let range = DelayRange {
            min: Duration::from_millis(10),
            max: Duration::from_millis(20),
        };
        for _ in 0..100 {
            let d = sample_delay(range);
            assert!(d >= range.min && d <= range.max, "out of range: {d:?}");
        }
        assert_eq!(sample_delay(DelayRange::zero()), Duration::ZERO);
    }

    #[test]
    fn request_links() {
        assert_eq!(
            request_search_url("2024 abc"),
            "https://open.feishu.cn/search?q=2024%20abc"
        );
        let plain = render_request_id("xyz", false);
        assert_eq!(plain, "xyz (https://open.feishu.cn/search?q=xyz)");
        let linked = render_request_id("xyz", true);
        assert!(linked.starts_with("\x1b]8;;https://open.feishu.cn/search?q=xyz"));
        assert!(linked.contains("\x1b\\xyz\x1b]8;;"));
    }

    #[test]
    fn request_id_inside_message() {
        let msg = "create export task failed: code=1069902, msg=no permission, request_id=20241019abc";
        assert_eq!(
            link_request_id(msg, false),
            "create export task failed: code=1069902, msg=no permission, request_id=20241019abc (https://open.feishu.cn/search?q=20241019abc)"
        );
        assert_eq!(link_request_id("plain failure", true), "plain failure");
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h02m03s");
    }
}
