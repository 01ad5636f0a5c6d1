use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;

use super::super::{Document, DocumentError, DocumentLoader};
use super::TextLoader;

/// Loads every file under a directory through a per-file loader.
///
/// `source` of each document becomes the path relative to the directory with
/// `/` separators; the absolute path is kept in `extra["path"]`. Files with any
/// path component starting with `.` below the directory are skipped unless
/// `include_hidden` is set.
#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    pub loader: TextLoader,
    pub include_hidden: bool,
}

impl DirectoryLoader {
    /// # Errors
    ///
    /// Any walk or per-file failure is fatal and reported as
    /// [`DocumentError::Load`]. A directory with no loadable file yields
    /// [`DocumentError::NoDocuments`].
    pub async fn load_dir(&self, dir: &Path) -> Result<Vec<Document>, DocumentError> {
        let wrap = |e: DocumentError| DocumentError::Load {
            dir: dir.to_path_buf(),
            source: Box::new(e),
        };

        let root = std::fs::canonicalize(dir).map_err(|e| wrap(e.into()))?;
        let files = self.collect_files(&root).map_err(wrap)?;

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            let loaded = self.loader.load(&path).await.map_err(wrap)?;
            let relative = relative_source(&root, &path);
            for mut doc in loaded {
                doc.metadata
                    .extra
                    .insert("path".to_owned(), path.display().to_string());
                doc.metadata.source.clone_from(&relative);
                documents.push(doc);
            }
        }

        if documents.is_empty() {
            return Err(DocumentError::NoDocuments(dir.to_path_buf()));
        }
        tracing::info!(
            count = documents.len(),
            "loaded documents from {}",
            dir.display()
        );
        Ok(documents)
    }

    fn collect_files(&self, root: &Path) -> Result<Vec<PathBuf>, DocumentError> {
        let mut files = Vec::new();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if !self.include_hidden && is_hidden(root, entry.path()) {
                continue;
            }
            files.push(entry.into_path());
        }
        Ok(files)
    }
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| matches!(c, Component::Normal(part) if part.to_string_lossy().starts_with('.')))
}

fn relative_source(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sources_are_relative_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("b.txt"), "bee").unwrap();
        std::fs::write(dir.path().join("a.txt"), "ay").unwrap();
        std::fs::write(dir.path().join("pkg/c.txt"), "see").unwrap();

        let docs = DirectoryLoader::default().load_dir(dir.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.metadata.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "b.txt", "pkg/c.txt"]);

        let abs = std::fs::canonicalize(dir.path().join("a.txt")).unwrap();
        assert_eq!(
            docs[0].metadata.extra.get("path").map(String::as_str),
            Some(abs.display().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn hidden_files_skipped_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env.txt"), "SECRET=1").unwrap();
        std::fs::write(dir.path().join("main.txt"), "fn main() {}").unwrap();

        let docs = DirectoryLoader::default().load_dir(dir.path()).await.unwrap();
        assert_eq!(docs.len(), 1);

        let loader = DirectoryLoader {
            include_hidden: true,
            ..DirectoryLoader::default()
        };
        assert_eq!(loader.load_dir(dir.path()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn files_under_hidden_directories_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git/hooks")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD.txt"), "ref: refs/heads/main").unwrap();
        std::fs::write(dir.path().join(".git/hooks/pre-commit.txt"), "#!/bin/sh").unwrap();
        std::fs::write(dir.path().join("main.txt"), "fn main() {}").unwrap();

        let docs = DirectoryLoader::default().load_dir(dir.path()).await.unwrap();
        let sources: Vec<_> = docs.iter().map(|d| d.metadata.source.as_str()).collect();
        assert_eq!(sources, vec!["main.txt"]);
    }

    #[test]
    fn hidden_check_ignores_components_above_root() {
        let root = Path::new("/home/user/.cache/mirror");
        assert!(!is_hidden(root, &root.join("src/lib.txt")));
        assert!(is_hidden(root, &root.join("src/.hidden/lib.txt")));
    }

    #[tokio::test]
    async fn empty_directory_is_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let err = DirectoryLoader::default()
            .load_dir(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::NoDocuments(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_load_error() {
        let err = DirectoryLoader::default()
            .load_dir(Path::new("/nonexistent/mirror"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Load { .. }));
    }

    #[tokio::test]
    async fn undecodable_file_aborts_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.txt"), "fine").unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff_u8, 0xfe]).unwrap();

        let err = DirectoryLoader::default()
            .load_dir(dir.path())
            .await
            .unwrap_err();
        let DocumentError::Load { dir: failed, source } = err else {
            panic!("expected load error");
        };
        assert_eq!(failed, dir.path());
        assert!(matches!(*source, DocumentError::Io(_)));
    }

    #[test]
    fn relative_source_uses_forward_slashes() {
        let root = Path::new("/data/mirror");
        let path = root.join("src").join("lib.txt");
        assert_eq!(relative_source(root, &path), "src/lib.txt");
    }
}
