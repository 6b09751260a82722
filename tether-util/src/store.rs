use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tracing::trace;

use super::fs::safe_write_all;

/// A filesystem backed store of JSON documents.
///
/// Documents are addressed by a flat key and stored as `<root>/<key>.json`.
/// Writes are atomic but there is no locking, two processes writing the
/// same key race and the last rename wins.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("invalid document key '{0}'")]
    InvalidKey(String),
}

impl Store {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(key).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {
                Ok(self.root.join(key).with_extension("json"))
            }
            _ => Err(StoreError::InvalidKey(key.to_owned())),
        }
    }

    /// Create or replace the document under `key`
    pub async fn write<V: Serialize>(&self, key: &str, value: &V) -> Result<(), StoreError> {
        let path = self.document_path(key)?;
        fs::create_dir_all(&self.root).await?;

        let buf = serde_json::to_vec(value)?;
        trace!("writing {}", path.display());
        tokio::task::spawn_blocking(move || safe_write_all(path, buf))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }

    /// Read the document under `key`, returning `None` if it was never
    /// written
    pub async fn read<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, StoreError> {
        let path = self.document_path(key)?;
        trace!("reading {}", path.display());

        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str::<V>(&contents)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete the document under `key`.
    ///
    /// Deleting a document that does not exist succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.document_path(key)?;
        trace!("removing {}", path.display());
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Assignment {
        hub: String,
        device_id: String,
    }

    #[tokio::test]
    async fn it_reads_back_written_documents() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path().join("nested"));

        let doc = Assignment {
            hub: "hub1.example.net".into(),
            device_id: "dev1".into(),
        };
        store.write("assignment", &doc).await.unwrap();

        let read: Option<Assignment> = store.read("assignment").await.unwrap();
        assert_eq!(read, Some(doc));
        assert!(dir.path().join("nested").join("assignment.json").exists());
    }

    #[tokio::test]
    async fn it_returns_none_for_missing_documents() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        let read: Option<Assignment> = store.read("assignment").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn it_deletes_documents_idempotently() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        store.write("assignment", &"value").await.unwrap();
        store.delete("assignment").await.unwrap();
        store.delete("assignment").await.unwrap();

        let read: Option<String> = store.read("assignment").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn it_rejects_keys_escaping_the_root() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());

        assert!(matches!(
            store.write("../outside", &"value").await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.read::<String>("a/b").await,
            Err(StoreError::InvalidKey(_))
        ));
    }
}
