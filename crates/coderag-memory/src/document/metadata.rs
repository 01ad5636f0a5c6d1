use std::fmt::Write as _;

use super::converter::TEXT_EXTENSION;
use super::types::Chunk;

/// Strip the text-mirror extension from every chunk's `source`, so metadata
/// names the original file rather than its `.txt` copy. Idempotent.
pub fn normalize_source_metadata(chunks: &mut [Chunk]) {
    let suffix = format!(".{TEXT_EXTENSION}");
    for chunk in chunks {
        let trimmed = chunk.metadata.source.trim_end_matches(suffix.as_str());
        if trimmed.len() != chunk.metadata.source.len() {
            chunk.metadata.source = trimmed.to_owned();
        }
    }
}

/// Render up to `n` chunks (all when `None`) with their metadata.
#[must_use]
pub fn format_chunks(chunks: &[Chunk], n: Option<usize>) -> String {
    let count = n.map_or(chunks.len(), |n| n.min(chunks.len()));
    let rule = "=".repeat(100);
    let thin = "-".repeat(100);

    let mut out = format!("\nPrinting {count} document(s)...\n\n");
    for chunk in &chunks[..count] {
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Document Metadata: {}", chunk.metadata.to_json());
        let _ = writeln!(out, "{thin}");
        let _ = writeln!(out, "{}\n", chunk.content);
    }
    let _ = writeln!(out, "{rule}");
    out
}

pub fn print_chunks(chunks: &[Chunk], n: Option<usize>) {
    print!("{}", format_chunks(chunks, n));
}
