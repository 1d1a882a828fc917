use crate::models::StoredFile;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const COURSEWARE_EXTENSIONS: [&str; 2] = [".html", ".htm"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create upload directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid file name: {0}")]
    InvalidName(String),
    #[error("file not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The flat directory holding every uploaded file.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Resolves `root` against the current directory once, up front.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    /// Writes `content` under `name`. An existing file with that name is
    /// left untouched and reported as [`StorageError::AlreadyExists`].
    pub async fn write(&self, name: &str, content: &[u8]) -> StorageResult<StoredFile> {
        let path = self.resolve(name)?;
        self.ensure_root().await?;

        let write_err = |source: io::Error| StorageError::Write {
            path: path.clone(),
            source,
        };

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(write_err(e)),
        };

        file.write_all(content).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        let stored = self.describe(name, &path).await?;
        tracing::info!(
            name = %stored.name,
            path = %stored.path.display(),
            size_bytes = stored.size,
            "stored upload"
        );
        Ok(stored)
    }

    /// Lists `.html`/`.htm` files, sorted by name. A missing directory is empty.
    pub async fn list_courseware(&self) -> StorageResult<Vec<StoredFile>> {
        let read_err = |source: io::Error| StorageError::Read {
            path: self.root.clone(),
            source,
        };

        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(read_err(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_courseware(&name) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => {}
                _ => continue,
            }
            // Removed between read_dir and stat.
            match self.describe(&name, &entry.path()).await {
                Ok(stored) => files.push(stored),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable entry"),
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Opens a stored file for streaming.
    pub async fn open(&self, name: &str) -> StorageResult<(fs::File, StoredFile)> {
        let path = self.resolve(name)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(source) => return Err(StorageError::Read { path, source }),
        };

        match file.metadata().await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(StorageError::NotFound(name.to_string())),
        }

        let stored = self.describe(name, &path).await?;
        Ok((file, stored))
    }

    /// Maps a bare file name into the store, refusing anything that could
    /// leave the directory.
    fn resolve(&self, name: &str) -> StorageResult<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    async fn describe(&self, name: &str, path: &Path) -> StorageResult<StoredFile> {
        let meta = fs::metadata(path).await.map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
            _ => StorageError::Read {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredFile {
            name: name.to_string(),
            path: path.to_path_buf(),
            size: meta.len(),
            modified,
        })
    }
}

fn is_courseware(name: &str) -> bool {
    COURSEWARE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn store_in(dir: &tempfile::TempDir) -> UploadStore {
        UploadStore::new(dir.path().join("uploads")).unwrap()
    }

    #[tokio::test]
    async fn write_creates_directory_and_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let content = [0u8, 159, 146, 150, b'<', b'h', b'1', b'>'];

        let stored = store.write("raw.html", &content).await.unwrap();

        assert_eq!(stored.size, content.len() as u64);
        assert!(stored.path.is_absolute());
        assert_eq!(std::fs::read(&stored.path).unwrap(), content);
    }

    #[tokio::test]
    async fn text_is_written_as_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let stored = store.write("t.html", "<h1>圆的性质</h1>".as_bytes()).await.unwrap();
        assert_eq!(std::fs::read_to_string(stored.path).unwrap(), "<h1>圆的性质</h1>");
    }

    #[tokio::test]
    async fn ensure_root_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.ensure_root().await.unwrap();
        store.ensure_root().await.unwrap();
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn existing_files_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.write("same.html", b"first").await.unwrap();

        let err = store.write("same.html", b"second").await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(std::fs::read(store.root().join("same.html")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        for name in ["../escape.html", "a/b.html", "..", "", "c\\d.html"] {
            let err = store.write(name, b"x").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidName(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn listing_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.list_courseware().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.write("b.html", b"bb").await.unwrap();
        store.write("a.htm", b"a").await.unwrap();
        store.write("notes.txt", b"x").await.unwrap();
        store.write("UPPER.HTML", b"x").await.unwrap();
        std::fs::create_dir(store.root().join("dir.html")).unwrap();

        let files = store.list_courseware().await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.htm", "b.html"]);
        assert_eq!(files[1].size, 2);
    }

    #[tokio::test]
    async fn open_reads_back_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.write("lesson.html", b"<h1>x</h1>").await.unwrap();

        let (mut file, stored) = store.open("lesson.html").await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"<h1>x</h1>");
        assert_eq!(stored.size, 10);

        let err = store.open("missing.html").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
