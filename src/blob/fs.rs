//! On-disk blob store.
//!
//! Layout: `<root>/<hex(profile_id)>/<hex(node_id)>`. Node names routinely
//! contain `/` and `:`, hence the hex file names. Each file is an 8-byte
//! little-endian length followed by the bincode-encoded `BlobPayload`.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};

use crate::{Error, Result};
use super::{BlobKey, BlobPayload, BlobStore};

const LEN_PREFIX: usize = 8;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &BlobKey) -> PathBuf {
        self.root
            .join(hex::encode(key.profile_id.as_bytes()))
            .join(hex::encode(key.node_id.as_bytes()))
    }
}

pub fn encode(payload: &BlobPayload) -> Result<Vec<u8>> {
    let body = bincode::serialize(payload)?;
    let mut buf = BytesMut::with_capacity(LEN_PREFIX + body.len());
    buf.put_u64_le(body.len() as u64);
    buf.put_slice(&body);
    Ok(buf.to_vec())
}

pub fn decode(bytes: &[u8]) -> Result<BlobPayload> {
    let mut buf = bytes;
    if buf.remaining() < LEN_PREFIX {
        return Err(Error::StorageError(format!("blob of {} bytes has no length prefix", bytes.len())));
    }
    let len = buf.get_u64_le();
    if buf.remaining() as u64 != len {
        return Err(Error::StorageError(format!(
            "blob length prefix says {len} bytes, found {}",
            buf.remaining()
        )));
    }
    Ok(bincode::deserialize(buf)?)
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn save(&self, payload: &BlobPayload) -> Result<()> {
        let path = self.path_for(&payload.key());
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = encode(payload)?;
        // Write then rename so readers never see a half-written blob.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, key: &BlobKey) -> Result<Option<BlobPayload>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sparse_payload() -> BlobPayload {
        BlobPayload {
            profile_id: "profile-1".into(),
            node_id: "layer1/conv:0".into(),
            data: vec![0.5, -1.25, 3.0],
            inner_indices: Some(vec![0, 2, 5]),
            outer_indices: Some(vec![2, 3]),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let payload = sparse_payload();
        store.save(&payload).await.unwrap();

        let path = store.path_for(&payload.key());
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
        assert_eq!(store.load(&payload.key()).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert_eq!(store.load(&BlobKey::new("p", "nope")).await.unwrap(), None);
    }

    #[test]
    fn test_length_prefix() {
        let bytes = encode(&sparse_payload()).unwrap();
        let len = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        assert_eq!(len as usize, bytes.len() - 8);
    }

    #[test]
    fn test_truncated_blob_is_rejected() {
        let bytes = encode(&sparse_payload()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode(&bytes[..4]).is_err());
    }
}
