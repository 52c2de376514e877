//! Local disk storage backend

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::StorageBackend;
use crate::error::{CacheError, Result};

const ENTRY_EXTENSION: &str = "entry";

/// Local disk backend
///
/// Layout: `<base_path>/<hex(namespace)>/<sha256(key)>.entry`. Each file
/// holds a `u32` big-endian key length, the key, then the value. Writes go
/// through a temp file and a rename.
pub struct DiskBackend {
    base_path: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskBackend {
    /// Create a disk backend rooted at `base_path`
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;

        info!("Initialized disk cache storage at {:?}", base_path);

        Ok(Self {
            base_path,
            tmp_counter: AtomicU64::new(0),
        })
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.base_path.join(hex::encode(namespace.as_bytes()))
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.namespace_path(namespace)
            .join(format!("{}.{}", digest, ENTRY_EXTENSION))
    }

    /// Split a file into (key, value)
    fn split_record(path: &Path, data: Vec<u8>) -> Result<(String, Bytes)> {
        let data = Bytes::from(data);
        if data.len() < 4 {
            return Err(CacheError::StoreUnavailable(format!(
                "Truncated record at {:?}",
                path
            )));
        }
        let key_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + key_len {
            return Err(CacheError::StoreUnavailable(format!(
                "Truncated record key at {:?}",
                path
            )));
        }
        let key = String::from_utf8(data[4..4 + key_len].to_vec()).map_err(|_| {
            CacheError::StoreUnavailable(format!("Record key is not UTF-8 at {:?}", path))
        })?;
        Ok((key, data.slice(4 + key_len..)))
    }

    /// Read only the key header of a record, leaving the value on disk
    async fn read_key(path: &Path) -> Result<Option<String>> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let truncated = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                CacheError::StoreUnavailable(format!("Truncated record key at {:?}", path))
            }
            _ => e.into(),
        };

        let key_len = file.read_u32().await.map_err(truncated)? as usize;
        let mut key = vec![0u8; key_len];
        file.read_exact(&mut key).await.map_err(truncated)?;
        String::from_utf8(key).map(Some).map_err(|_| {
            CacheError::StoreUnavailable(format!("Record key is not UTF-8 at {:?}", path))
        })
    }

    async fn read_record(path: &Path) -> Result<Option<(String, Bytes)>> {
        match fs::read(path).await {
            Ok(data) => Self::split_record(path, data).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<Bytes>> {
        let path = self.entry_path(namespace, key);
        debug!("Reading cache record from {:?}", path);

        // Hash collisions are treated as misses
        Ok(Self::read_record(&path)
            .await?
            .filter(|(stored_key, _)| stored_key == key)
            .map(|(_, value)| value))
    }

    async fn write(&self, namespace: &str, key: &str, value: Bytes) -> Result<()> {
        let dir = self.namespace_path(namespace);
        fs::create_dir_all(&dir).await?;

        let key_len = u32::try_from(key.len())
            .map_err(|_| CacheError::InvalidRequest("Key too long".to_string()))?;
        let mut buf = BytesMut::with_capacity(4 + key.len() + value.len());
        buf.put_u32(key_len);
        buf.put_slice(key.as_bytes());
        buf.put_slice(&value);

        let path = self.entry_path(namespace, key);
        let tmp = dir.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&tmp, &buf).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("Wrote cache record to {:?}", path);
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> Result<bool> {
        let path = self.entry_path(namespace, key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>> {
        let dir = self.namespace_path(namespace);
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(key) = Self::read_key(&path).await? {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut reader = fs::read_dir(&self.base_path).await?;
        let mut names = Vec::new();

        while let Some(item) = reader.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = item.file_name();
            let decoded = dir_name
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|raw| String::from_utf8(raw).ok());
            match decoded {
                Some(name) => names.push(name),
                None => warn!("Ignoring foreign directory {:?} in cache storage", dir_name),
            }
        }

        names.sort();
        Ok(names)
    }

    async fn drop_namespace(&self, namespace: &str) -> Result<bool> {
        match fs::remove_dir_all(self.namespace_path(namespace)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
