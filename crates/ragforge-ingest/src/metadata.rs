//! Chunk position, page, and section metadata.

use std::path::Path;

use ragforge_core::{Chunk, ChunkMetadata};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a chunk's content.
pub fn content_sha256(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turn chunk contents into [`Chunk`]s with source positions.
///
/// Positions come from a sequential find-from-cursor scan: each window
/// is searched for at or after the end of the previous match, and the
/// cursor advances past it. A window that no longer appears verbatim in
/// the source (the chunker rejoins sentences with single spaces) maps
/// to position 0 silently.
pub fn assign_positions(text: &str, windows: Vec<String>) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(windows.len());
    let mut cursor = 0;

    for (chunk_index, content) in windows.into_iter().enumerate() {
        let (start, end) = match text[cursor.min(text.len())..].find(&content) {
            Some(offset) => {
                let start = cursor + offset;
                let end = start + content.len();
                cursor = end;
                (start, end)
            }
            None => (0, content.len()),
        };
        let sha256 = content_sha256(&content);
        chunks.push(Chunk {
            content,
            start,
            end,
            chunk_index,
            sha256,
        });
    }
    chunks
}

/// Map a chunk's byte span onto 1-based page numbers via cumulative
/// page-text lengths. Both ends clamp to at least page 1.
pub fn page_range(pages: &[String], start: usize, end: usize) -> (u32, u32) {
    let page_at = |offset: usize| -> u32 {
        let mut cumulative = 0usize;
        for (i, page) in pages.iter().enumerate() {
            cumulative += page.len();
            if offset < cumulative {
                return (i + 1) as u32;
            }
        }
        pages.len().max(1) as u32
    };
    let from = page_at(start);
    let to = page_at(end.saturating_sub(1)).max(from);
    (from.max(1), to.max(1))
}

/// The most recent markdown heading (`#` to `######` plus a space)
/// at or before `offset`.
pub fn section_for_offset(text: &str, offset: usize) -> Option<String> {
    let mut section = None;
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        if line_start > offset {
            break;
        }
        if let Some(title) = heading_title(line) {
            section = Some(title);
        }
        line_start += line.len();
    }
    section
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim_end();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
        Some(trimmed[hashes + 1..].trim().to_string())
    } else {
        None
    }
}

/// Assemble the per-chunk metadata for a file.
pub fn chunk_metadata(path: &Path, text: &str, pages: Option<&[String]>, chunk: &Chunk) -> ChunkMetadata {
    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let doc_title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (page_from, page_to) = match pages {
        Some(pages) if !pages.is_empty() => {
            let (from, to) = page_range(pages, chunk.start, chunk.end);
            (Some(from), Some(to))
        }
        _ => (None, None),
    };

    let section = if matches!(file_type.as_str(), "md" | "mdx" | "markdown" | "txt" | "text") {
        section_for_offset(text, chunk.start)
    } else {
        None
    };

    ChunkMetadata {
        file_type,
        doc_title,
        page_from,
        page_to,
        section,
        enrichment: None,
    }
}
