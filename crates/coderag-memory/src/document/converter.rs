//! Mirror a source tree as UTF-8 `.txt` files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::{DEFAULT_MAX_FILE_SIZE, DocumentError};

pub const TEXT_EXTENSION: &str = "txt";

pub const DEFAULT_EXCLUDED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "ico", "webp", "tiff"];

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Extensions skipped without reading, compared case-insensitively.
    pub excluded_extensions: Vec<String>,
    /// Honour `.gitignore` and skip hidden entries during the walk.
    pub respect_ignore_files: bool,
    pub max_file_size: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            excluded_extensions: DEFAULT_EXCLUDED_EXTENSIONS
                .iter()
                .map(|e| (*e).to_owned())
                .collect(),
            respect_ignore_files: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ConverterConfig {
    fn is_excluded(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.excluded_extensions
                    .iter()
                    .any(|x| x.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionReport {
    pub converted: usize,
    pub skipped_excluded: usize,
    /// Walk, stat or read errors.
    pub read_failures: usize,
    /// Files that are not valid UTF-8.
    pub decode_failures: usize,
    pub write_failures: usize,
}

/// Destination of `relative` inside the text mirror rooted at `dst`.
#[must_use]
pub fn mirror_path(dst: &Path, relative: &Path) -> PathBuf {
    dst.join(relative).with_extension(TEXT_EXTENSION)
}

/// Copy every UTF-8 decodable file under `src` into `dst`, preserving the
/// relative layout and replacing each extension with `.txt`.
///
/// Per-file read, decode and write failures are logged and counted; the walk
/// continues. Reruns overwrite earlier output.
///
/// # Errors
///
/// Returns an error if `src` is not a directory or `dst` cannot be created.
pub fn convert_tree(
    src: &Path,
    dst: &Path,
    config: &ConverterConfig,
) -> Result<ConversionReport, DocumentError> {
    let src = std::fs::canonicalize(src)?;
    if !src.is_dir() {
        return Err(DocumentError::Io(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{} is not a directory", src.display()),
        )));
    }
    std::fs::create_dir_all(dst)?;
    let dst = std::fs::canonicalize(dst)?;
    // only a mirror nested in the source can be walked into
    let skip_mirror = dst != src && dst.starts_with(&src);

    let walker = WalkBuilder::new(&src)
        .standard_filters(config.respect_ignore_files)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut report = ConversionReport::default();
    let mut written: HashSet<PathBuf> = HashSet::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                report.read_failures += 1;
                continue;
            }
        };
        let path = entry.path();
        let in_mirror = skip_mirror && path.starts_with(&dst);
        if in_mirror || !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        if config.is_excluded(path) {
            tracing::debug!(path = %path.display(), "excluded by extension");
            report.skipped_excluded += 1;
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > config.max_file_size => {
                tracing::warn!(
                    path = %path.display(),
                    size = meta.len(),
                    "skipping file above size limit"
                );
                report.skipped_excluded += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot stat file: {e}");
                report.read_failures += 1;
                continue;
            }
        }

        let text = match std::fs::read(path).map(String::from_utf8) {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), "not valid UTF-8, skipping: {e}");
                report.decode_failures += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read: {e}");
                report.read_failures += 1;
                continue;
            }
        };

        let Ok(relative) = path.strip_prefix(&src) else {
            continue;
        };
        let target = mirror_path(&dst, relative);
        if !written.insert(target.clone()) {
            tracing::warn!(
                path = %path.display(),
                target = %target.display(),
                "destination already written this run, overwriting"
            );
        }

        let result = match target.parent() {
            Some(parent) => std::fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|()| std::fs::write(&target, text));
        if let Err(e) = result {
            tracing::warn!(target = %target.display(), "failed to write: {e}");
            report.write_failures += 1;
            continue;
        }
        report.converted += 1;
    }

    tracing::info!(
        converted = report.converted,
        skipped = report.skipped_excluded,
        read_failures = report.read_failures,
        decode_failures = report.decode_failures,
        write_failures = report.write_failures,
        "converted {} to {}",
        src.display(),
        dst.display()
    );
    Ok(report)
}
