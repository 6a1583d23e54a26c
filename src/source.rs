//! Source URL analysis
//!
//! A user URL such as `https://sample.feishu.cn/wiki/settings/7075377271827264924`
//! is reduced to `(host, kind, token)`: the kind is every path segment but the
//! last, re-joined with a leading slash, and the token is the last segment.

use crate::error::{Error, Result};
use crate::types::DocType;
use url::Url;

/// Single wiki node
pub const KIND_WIKI: &str = "/wiki";
/// Whole wiki space
pub const KIND_WIKI_SPACE: &str = "/wiki/settings";
/// Drive folder
pub const KIND_FOLDER: &str = "/drive/folder";
/// Legacy document
pub const KIND_DOCS: &str = "/docs";
/// New-style document
pub const KIND_DOCX: &str = "/docx";
/// Spreadsheet
pub const KIND_SHEETS: &str = "/sheets";
/// Uploaded file
pub const KIND_FILE: &str = "/file";
/// Multi-dimensional table
pub const KIND_BASE: &str = "/base";
/// Mind map
pub const KIND_MINDNOTES: &str = "/mindnotes";

/// `(kind, token)` pair extracted from a user URL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSource {
    /// Host the URL points at, port stripped
    pub host: String,
    /// Path prefix such as `/wiki` or `/drive/folder`
    pub kind: String,
    /// Remote token (last path segment)
    pub token: String,
}

impl DocumentSource {
    /// Parse a URL into a source
    pub fn parse(raw: &str) -> Result<Self> {
        let (host, kind, token) = analyse_url(raw)?;
        Ok(Self { host, kind, token })
    }

    /// Document kind for single-document sources, `None` for containers
    pub fn single_doc_type(&self) -> Option<DocType> {
        match self.kind.as_str() {
            KIND_DOCS => Some(DocType::Doc),
            KIND_DOCX => Some(DocType::Docx),
            KIND_SHEETS => Some(DocType::Sheet),
            KIND_FILE => Some(DocType::File),
            KIND_BASE => Some(DocType::Bitable),
            KIND_MINDNOTES => Some(DocType::Mindnote),
            _ => None,
        }
    }

    /// Browser URL of a document of `kind` on this source's host
    pub fn url_for(&self, kind: &str, token: &str) -> String {
        format!("https://{}{}/{}", self.host, kind, token)
    }
}

/// Split a source URL into `(host, kind, token)`
///
/// Fails with [`Error::BadRequest`] when the URL does not parse, the scheme
/// is not http(s), or the path has fewer than two segments.
pub fn analyse_url(raw: &str) -> Result<(String, String, String)> {
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::BadRequest(format!("invalid url {raw:?}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::BadRequest(
            "url must start with http:// or https://".into(),
        ));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::BadRequest(format!("url {raw:?} has no host")))?
        .to_string();

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    if segments.len() < 2 {
        return Err(Error::BadRequest(format!(
            "url {raw:?} must contain a document kind and a token"
        )));
    }

    let (token, kind_segments) = segments
        .split_last()
        .ok_or_else(|| Error::BadRequest(format!("url {raw:?} has an empty path")))?;
    let kind = format!("/{}", kind_segments.join("/"));

    Ok((host, kind, (*token).to_string()))
}

/// Parse every URL and require that they share one host
pub fn parse_sources(urls: &[String]) -> Result<Vec<DocumentSource>> {
    let sources = urls
        .iter()
        .map(|u| DocumentSource::parse(u))
        .collect::<Result<Vec<_>>>()?;

    if let Some(first) = sources.first() {
        if let Some(other) = sources.iter().find(|s| s.host != first.host) {
            return Err(Error::BadRequest(format!(
                "all urls must share one host, got {} and {}",
                first.host, other.host
            )));
        }
    }
    Ok(sources)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyses_docs_url() {
        let parsed = analyse_url("https://sample.feishu.cn/docs/2olt0Ts4Mds7j7iqzdwrqEUnO7q").unwrap();
        assert_eq!(
            parsed,
            (
                "sample.feishu.cn".to_string(),
                "/docs".to_string(),
                "2olt0Ts4Mds7j7iqzdwrqEUnO7q".to_string()
            )
        );
    }

    #[test]
    fn analyses_wiki_space_url() {
        let parsed = analyse_url("https://sample.feishu.cn/wiki/settings/7075377271827264924").unwrap();
        assert_eq!(parsed.0, "sample.feishu.cn");
        assert_eq!(parsed.1, "/wiki/settings");
        assert_eq!(parsed.2, "7075377271827264924");
    }

    #[test]
    fn analyses_drive_folder_and_strips_port_and_query() {
        let parsed =
            analyse_url("http://sample.feishu.cn:8080/drive/folder/fldcnABC?from=space#x").unwrap();
        assert_eq!(parsed.0, "sample.feishu.cn");
        assert_eq!(parsed.1, "/drive/folder");
        assert_eq!(parsed.2, "fldcnABC");
    }

    #[test]
    fn rejects_other_schemes() {
        let err = analyse_url("feishu://x/docs/y").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(
            err.to_string(),
            "bad request: url must start with http:// or https://"
        );
    }

    #[test]
    fn rejects_short_paths_and_garbage() {
        assert!(matches!(
            analyse_url("https://sample.feishu.cn/docx"),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            analyse_url("not a url"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn reconstructed_url_reparses_to_same_triple() {
        let inputs = [
            "https://a.feishu.cn/wiki/wikcnX",
            "https://a.feishu.cn/wiki/settings/123",
            "http://b.larksuite.com/drive/folder/fldY",
            "https://c.feishu.cn/sheets/shtZ/",
        ];
        for input in inputs {
            let (host, kind, token) = analyse_url(input).unwrap();
            let rebuilt = format!("https://{host}{kind}/{token}");
            assert_eq!(analyse_url(&rebuilt).unwrap(), (host, kind, token));
        }
    }

    #[test]
    fn single_doc_kinds() {
        let source = DocumentSource::parse("https://a.feishu.cn/docx/doxA").unwrap();
        assert_eq!(source.single_doc_type(), Some(DocType::Docx));
        let source = DocumentSource::parse("https://a.feishu.cn/wiki/wikA").unwrap();
        assert_eq!(source.single_doc_type(), None);
    }

    #[test]
    fn parse_sources_requires_one_host() {
        let ok = parse_sources(&[
            "https://a.feishu.cn/docx/1".to_string(),
            "https://a.feishu.cn/wiki/2".to_string(),
        ])
        .unwrap();
        assert_eq!(ok.len(), 2);

        let err = parse_sources(&[
            "https://a.feishu.cn/docx/1".to_string(),
            "https://b.feishu.cn/docx/2".to_string(),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
