use std::collections::VecDeque;
use std::sync::Arc;

use super::error::DocumentError;
use super::types::{Chunk, Document};

/// Measures a piece of text in the same unit as `chunk_size`.
pub type LengthFn = Arc<dyn Fn(&str) -> usize + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tried in order; the empty separator cuts between characters.
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 150,
            separators: ["\n\n", "\n", " ", ""]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidConfig`] when `chunk_size` is zero or
    /// `chunk_overlap` is not smaller than `chunk_size`.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.chunk_size == 0 {
            return Err(DocumentError::InvalidConfig(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocumentError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Recursive separator-based splitter.
///
/// Text is cut on the first separator that occurs in it. Pieces shorter than
/// `chunk_size` are packed greedily into chunks, carrying up to
/// `chunk_overlap` of trailing pieces into the next chunk; longer pieces are
/// split again with the remaining separators. Each separator stays attached to
/// the start of the piece that follows it.
///
/// With a non-zero `chunk_overlap`, a chunk that shares nothing with its
/// predecessor is prefixed with the predecessor's tail, preferably whole words,
/// as long as both `chunk_overlap` and `chunk_size` still hold.
#[derive(Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
    length_fn: LengthFn,
}

impl std::fmt::Debug for TextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSplitter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TextSplitter {
    /// Splitter measuring length in characters.
    ///
    /// # Errors
    ///
    /// See [`SplitterConfig::validate`].
    pub fn new(config: SplitterConfig) -> Result<Self, DocumentError> {
        config.validate()?;
        Ok(Self {
            config,
            length_fn: Arc::new(|s: &str| s.chars().count()),
        })
    }

    /// Replace the length measure, e.g. with a tokenizer's token count.
    #[must_use]
    pub fn with_length_fn(mut self, length_fn: LengthFn) -> Self {
        self.length_fn = length_fn;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunks = self
            .split_recursive(text, &self.config.separators)
            .into_iter()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        if self.config.chunk_overlap == 0 {
            return chunks.collect();
        }

        let mut out: Vec<String> = Vec::new();
        for chunk in chunks {
            let carried = match out.last() {
                Some(prev) if shared_len(prev, &chunk) == 0 => self.carry_tail(prev, &chunk),
                _ => None,
            };
            out.push(carried.unwrap_or(chunk));
        }
        out
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.content)
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chunk {
                content,
                metadata: document.metadata.clone(),
                chunk_index: i,
            })
            .collect()
    }

    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }

    fn len(&self, s: &str) -> usize {
        (self.length_fn)(s)
    }

    /// `next` prefixed with the longest tail of `prev` that keeps the overlap
    /// and size limits. Joined with a newline when that still fits.
    fn carry_tail(&self, prev: &str, next: &str) -> Option<String> {
        for joiner in ["\n", ""] {
            let fits = |tail: &str| {
                self.len(tail) <= self.config.chunk_overlap
                    && self.len(&format!("{tail}{joiner}{next}")) <= self.config.chunk_size
            };
            let mut start = prev.len();
            for (i, _) in prev.char_indices().rev() {
                if !fits(&prev[i..]) {
                    break;
                }
                start = i;
            }
            let tail = word_aligned_tail(prev, start);
            if !tail.is_empty() {
                return Some(format!("{tail}{joiner}{next}"));
            }
        }
        None
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut small: Vec<String> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if self.len(&piece) < self.config.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut out = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = self.len(piece);
            if total + len > size && !window.is_empty() {
                if total > size {
                    tracing::warn!(total, size, "created a chunk longer than chunk_size");
                }
                push_joined(&mut out, &window);
                while total > overlap || (total + len > size && total > 0) {
                    let Some((_, dropped)) = window.pop_front() else {
                        break;
                    };
                    total -= dropped;
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_joined(&mut out, &window);
        out
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep, &separators[i + 1..]);
        }
    }
    (separators.last().map_or("", String::as_str), &[])
}

fn split_keep_start(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out: Vec<String> = parts.next().map(str::to_owned).into_iter().collect();
    out.extend(parts.map(|p| format!("{separator}{p}")));
    out.retain(|p| !p.is_empty());
    out
}

/// `prev[start..]`, cut forward to the next word start when it begins mid-word.
fn word_aligned_tail(prev: &str, start: usize) -> &str {
    let tail = &prev[start..];
    let at_word_start = prev[..start]
        .chars()
        .next_back()
        .is_none_or(char::is_whitespace);
    if at_word_start {
        return tail.trim_start();
    }
    match tail.split_once(char::is_whitespace) {
        Some((_, rest)) if !rest.trim_start().is_empty() => rest.trim_start(),
        _ => tail,
    }
}

/// Length in chars of the longest suffix of `prev` that is also a prefix of
/// `next`.
fn shared_len(prev: &str, next: &str) -> usize {
    next.char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| prev.ends_with(&next[..end]))
        .last()
        .map_or(0, |end| next[..end].chars().count())
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_owned());
    }
}
