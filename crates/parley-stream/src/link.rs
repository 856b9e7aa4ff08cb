//! Resolution of tool output paths into fetchable attachments.
//!
//! Tool results reference generated files as free text containing an
//! `output/<relative path>` fragment. The extractor pulls the first such
//! path out of the text, classifies it by extension, and resolves it to a
//! percent-encoded URL under the backend's static mount.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use parley_core::types::{Attachment, AttachmentKind};

/// Characters escaped in path segments, on top of controls. `/` stays
/// literal so the path keeps its structure.
const PATH_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Extracts `output/<path>` references from free-text tool results and
/// resolves them against a base URL.
#[derive(Debug)]
pub struct OutputResolver {
    base_url: String,
    path_re: Regex,
}

impl OutputResolver {
    /// Create a resolver for the given backend base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            // Windows-style backslashes appear in some tool outputs; both
            // separators are accepted and normalized to `/`.
            path_re: Regex::new(r"output[/\\][\w\-./\\]+").expect("static regex"),
        }
    }

    /// Find the first `output/<path>` reference in `text`.
    ///
    /// Returns the relative path below `output/`, with separators normalized
    /// and trailing punctuation stripped.
    pub fn extract_path(&self, text: &str) -> Option<String> {
        let m = self.path_re.find(text)?;
        let normalized = m.as_str().replace('\\', "/");
        let trimmed = normalized.trim_end_matches(&['.', '/'][..]);
        let rel = trimmed.strip_prefix("output/")?;
        if rel.is_empty() {
            return None;
        }
        Some(rel.to_string())
    }

    /// Resolve a relative output path to its static URL, percent-encoding
    /// each segment.
    pub fn resolve_url(&self, rel_path: &str) -> String {
        let encoded = utf8_percent_encode(rel_path, PATH_SET);
        format!("{}/static/output/{}", self.base_url, encoded)
    }

    /// Build an attachment from the first output reference in `text`, if any.
    pub fn attachment_from(&self, text: &str) -> Option<Attachment> {
        let rel = self.extract_path(text)?;
        let name = rel.rsplit('/').next().unwrap_or(&rel).to_string();
        Some(Attachment {
            kind: AttachmentKind::from_path(&rel),
            url: self.resolve_url(&rel),
            name,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
