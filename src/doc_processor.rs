use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RagSettings;
use crate::error::{AppError, Result};

/// Formats the ingestion pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Detect the format from the file extension alone, without touching the file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "txt" => Ok(DocumentFormat::Text),
            _ => Err(AppError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSource {
    pub file_name: String,
    /// 1-based page number, PDF only.
    pub page: Option<usize>,
    pub chunk_index: usize,
    /// Character offset of the chunk within its page (or the whole file).
    pub char_offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: ChunkSource,
}

/// Raw text of one page (PDF) or of the whole file (text).
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub page: Option<usize>,
}

/// A window of a segment produced by [`chunk_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub char_offset: usize,
    pub text: String,
}

/// Load `path` and split it into overlapping chunks.
///
/// Fails with `UnsupportedFormat` before any I/O for anything but `.pdf` and
/// `.txt`, and with `Ingestion` for unreadable, empty or unparsable files.
pub fn ingest(path: &Path, settings: &RagSettings) -> Result<Vec<Chunk>> {
    let format = DocumentFormat::from_path(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let segments = load_segments(path, format)?;

    let mut chunks = Vec::new();
    for segment in segments.iter().filter(|s| !s.text.trim().is_empty()) {
        for span in chunk_text(
            &segment.text,
            settings.chunk_size,
            settings.chunk_overlap,
            settings.prefer_boundaries,
        ) {
            chunks.push(Chunk {
                text: span.text,
                source: ChunkSource {
                    file_name: file_name.clone(),
                    page: segment.page,
                    chunk_index: chunks.len(),
                    char_offset: span.char_offset,
                },
            });
        }
    }

    if chunks.is_empty() {
        return Err(AppError::Ingestion(format!(
            "{} contains no extractable text",
            file_name
        )));
    }

    info!(
        "Ingested {} into {} chunks ({} segments)",
        file_name,
        chunks.len(),
        segments.len()
    );
    Ok(chunks)
}

/// Read a document into raw text segments: one per page for PDF, one for text.
pub fn load_segments(path: &Path, format: DocumentFormat) -> Result<Vec<Segment>> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Ingestion(format!("cannot read {}: {}", path.display(), e)))?;
    if bytes.is_empty() {
        return Err(AppError::Ingestion(format!("{} is empty", path.display())));
    }

    match format {
        DocumentFormat::Text => {
            let content = String::from_utf8(bytes).map_err(|e| {
                AppError::Ingestion(format!("{} is not valid UTF-8: {}", path.display(), e))
            })?;
            Ok(vec![Segment {
                text: content,
                page: None,
            }])
        }
        DocumentFormat::Pdf => {
            let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| AppError::Ingestion(format!("PDF parse error: {}", e)))?;
            debug!("Extracted {} pages from {}", pages.len(), path.display());
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| Segment {
                    text,
                    page: Some(i + 1),
                })
                .collect())
        }
    }
}

/// Split text into overlapping chunks of `chunk_size` characters.
///
/// Consecutive chunks always share exactly `overlap` characters, so removing
/// the first `overlap` characters of every chunk after the first and joining
/// them gives back `text`. With `prefer_boundaries` the end of a chunk moves
/// back to the last paragraph, line, sentence or word break that keeps it at
/// least half full.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    prefer_boundaries: bool,
) -> Vec<TextSpan> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![];
    }
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if prefer_boundaries && hard_end < chars.len() {
            boundary_end(&chars, start, hard_end, overlap, chunk_size)
        } else {
            hard_end
        };

        chunks.push(TextSpan {
            char_offset: start,
            text: chars[start..end].iter().collect(),
        });

        if end >= chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Latest break in `(min_end..=hard_end]` by descending preference.
fn boundary_end(
    chars: &[char],
    start: usize,
    hard_end: usize,
    overlap: usize,
    chunk_size: usize,
) -> usize {
    // the next chunk must start after this one did
    let min_end = (start + overlap + 1).max(start + chunk_size.div_ceil(2));
    if min_end > hard_end {
        return hard_end;
    }

    let paragraph = |p: usize| p >= 2 && chars[p - 2] == '\n' && chars[p - 1] == '\n';
    let line = |p: usize| chars[p - 1] == '\n';
    let sentence = |p: usize| {
        p >= 2 && matches!(chars[p - 2], '.' | '!' | '?') && chars[p - 1].is_whitespace()
    };
    let word = |p: usize| chars[p - 1].is_whitespace();

    let rules: [&dyn Fn(usize) -> bool; 4] = [&paragraph, &line, &sentence, &word];
    for rule in rules {
        if let Some(end) = (min_end..=hard_end).rev().find(|&p| rule(p)) {
            return end;
        }
    }
    hard_end
}
