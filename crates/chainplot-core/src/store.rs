//! Durable storage for chart documents.
//!
//! [`JsonFileStore`] keeps one `<key>.json` document per chart in a data
//! directory. Writes land in a sibling temp file which is fsynced and then
//! renamed over the target, so readers only ever see a complete previous or
//! complete new document.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::series::SeriesSet;

pub trait SeriesStore {
    /// Load the series set stored under `key`, or `None` if nothing has
    /// been persisted yet.
    fn read(&self, key: &str) -> Result<Option<SeriesSet>, CoreError>;

    /// Replace the series set stored under `key`. Either the whole new
    /// state becomes visible or the previous one remains.
    fn write(&self, key: &str, state: &SeriesSet) -> Result<(), CoreError>;
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, CoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json.tmp"))
    }

    /// Load and decode the document under `key`, or `None` if it does not
    /// exist. Undecodable documents are [`CoreError::CorruptState`].
    pub fn read_document<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoreError> {
        let path = self.path_for(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let document = serde_json::from_str(&content).map_err(|e| {
            CoreError::CorruptState(format!("cannot parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded document");
        Ok(Some(document))
    }

    /// Atomically replace the document under `key`.
    pub fn write_document<T: Serialize + ?Sized>(
        &self,
        key: &str,
        document: &T,
    ) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        let tmp = self.temp_path_for(key);
        let content = serde_json::to_vec(document)
            .map_err(|e| CoreError::InvalidData(format!("cannot serialize {key}: {e}")))?;

        let result = write_synced(&tmp, &content).and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = result {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        // Make the rename itself durable. Directory handles cannot be opened
        // for syncing on every platform, so failure here is not fatal.
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        debug!(path = %path.display(), bytes = content.len(), "persisted document");
        Ok(())
    }
}

impl SeriesStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<SeriesSet>, CoreError> {
        self.read_document(key)
    }

    fn write(&self, key: &str, state: &SeriesSet) -> Result<(), CoreError> {
        self.write_document(key, state)
    }
}

fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}

fn validate_key(key: &str) -> Result<(), CoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidConfig(format!(
            "store key `{key}` must be non-empty and contain only [A-Za-z0-9_-]"
        )))
    }
}
