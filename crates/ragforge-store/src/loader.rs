//! The document-loader capability and the plain-text reference loader.

use std::path::Path;

use async_trait::async_trait;
use ragforge_core::{Error, Result};
use tracing::debug;

/// Raw text extracted from a source file. For paged formats, `text` is
/// the concatenation of `pages` in order; chunk-to-page mapping uses
/// the cumulative page-text lengths.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub text: String,
    pub pages: Option<Vec<String>>,
}

impl LoadedDocument {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pages: None,
        }
    }

    /// Build a paged document; `text` becomes the page concatenation.
    pub fn paged(pages: Vec<String>) -> Self {
        Self {
            text: pages.concat(),
            pages: Some(pages),
        }
    }
}

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<LoadedDocument>;
}

/// File families the text loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    PlainText,
    Markdown,
    Code,
    Unknown,
}

impl FileKind {
    fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "txt" | "text" | "log" => Self::PlainText,
            "md" | "mdx" | "markdown" => Self::Markdown,
            "py" | "js" | "ts" | "tsx" | "jsx" | "rs" | "go" | "java" | "cpp" | "c" | "h"
            | "rb" | "sh" | "yaml" | "yml" | "toml" | "ini" | "cfg" | "xml" | "html" | "css"
            | "sql" | "json" => Self::Code,
            _ => Self::Unknown,
        }
    }
}

/// Reads UTF-8 text files. Unknown extensions are sniffed: content that
/// looks binary is rejected rather than embedded as mojibake.
pub struct TextLoader;

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let kind = FileKind::from_extension(ext);

        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes).map_err(|_| {
            Error::Loader(format!("{} is not valid UTF-8", path.display()))
        })?;

        if kind == FileKind::Unknown && looks_binary(&text) {
            return Err(Error::Loader(format!(
                "{} looks like a binary file",
                path.display()
            )));
        }

        debug!("loaded {} ({} bytes)", path.display(), text.len());
        Ok(LoadedDocument::text(text))
    }
}

/// More than 10% control characters (outside line endings and tabs)
/// marks the content as binary.
fn looks_binary(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();
    control > text.chars().count() / 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_loads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Title\n\nBody text.").unwrap();

        let loaded = TextLoader.load(&path).await.unwrap();
        assert!(loaded.text.starts_with("# Title"));
        assert!(loaded.pages.is_none());
    }

    #[tokio::test]
    async fn test_rejects_binary_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        // Valid UTF-8 but dominated by control characters.
        f.write_all("\u{1}\u{2}\u{3}\u{4}\u{5}ok".as_bytes()).unwrap();

        let err = TextLoader.load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Loader(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = TextLoader.load(Path::new("/nonexistent/f.txt")).await;
        assert!(matches!(err, Err(Error::Io(_))));
    }

    #[test]
    fn test_paged_concatenation() {
        let doc = LoadedDocument::paged(vec!["page one ".into(), "page two".into()]);
        assert_eq!(doc.text, "page one page two");
        assert_eq!(doc.pages.as_ref().unwrap().len(), 2);
    }
}
