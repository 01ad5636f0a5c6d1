mod directory;
mod text;

pub use directory::DirectoryLoader;
pub use text::TextLoader;
