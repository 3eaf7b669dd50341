use async_trait::async_trait;
use scholar_core::DocumentStore;
use std::io::{Error, ErrorKind};
use std::path::PathBuf;
use tracing::{debug, info};

/// Documents kept as flat files in one directory, named by document name.
///
/// Hidden files (leading `.`) are never listed; writes go through a hidden
/// temporary file and a rename so a partial document is never visible.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory if needed and return a store over it.
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let store = Self::new(dir);
        tokio::fs::create_dir_all(&store.dir).await?;
        info!("Using document directory: {}", store.dir.display());
        Ok(store)
    }

    fn document_path(&self, name: &str) -> std::io::Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }
}

/// Document names must be plain file names.
fn validate_name(name: &str) -> std::io::Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("invalid document name: {name:?}"),
        ));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn list_names(&self) -> std::io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                debug!("Skipping non UTF-8 file name: {:?}", entry.file_name());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    async fn exists(&self, name: &str) -> std::io::Result<bool> {
        let path = self.document_path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, name: &str) -> std::io::Result<Vec<u8>> {
        let path = self.document_path(name)?;
        tokio::fs::read(&path).await
    }

    async fn store(&self, name: &str, content: &[u8]) -> std::io::Result<()> {
        let path = self.document_path(name)?;
        let partial = self.dir.join(format!(".{name}.partial"));

        tokio::fs::write(&partial, content).await?;
        tokio::fs::rename(&partial, &path).await?;

        info!("Stored document {} ({} bytes)", name, content.len());
        Ok(())
    }
}
