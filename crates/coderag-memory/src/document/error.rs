use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to load documents from {}: {source}", dir.display())]
    Load {
        dir: PathBuf,
        #[source]
        source: Box<DocumentError>,
    },

    #[error("no documents found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
