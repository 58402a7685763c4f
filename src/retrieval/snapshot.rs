//! Retriever snapshots: save / load the full engine state
//!
//! Layout:
//! - 4 bytes magic `BMSJ`
//! - u32 LE format version
//! - 32 byte BLAKE3 hash of the compressed payload
//! - zstd-compressed MessagePack of [`SnapshotData`]
//!
//! Written atomically via temp + fsync + rename. MessagePack is
//! self-describing, so arbitrary JSON metadata survives the round trip.

use crate::error::{Result, SnappyError};
use crate::retrieval::bm25::Bm25Params;
use crate::retrieval::document::Document;
use crate::retrieval::index::InvertedIndex;
use crate::retrieval::retriever::{Bm25Retriever, Corpus};
use crate::retrieval::tokenizer::TokenizerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

const SNAPSHOT_MAGIC: &[u8; 4] = b"BMSJ";
const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + blake3::OUT_LEN;
const COMPRESSION_LEVEL: i32 = 3;

/// Borrowed view written by `save`
#[derive(Serialize)]
struct SnapshotRef<'a> {
    k1: f64,
    b: f64,
    k: usize,
    tokenizer: &'a TokenizerConfig,
    documents: &'a [Document],
    index: &'a InvertedIndex,
}

/// Owned state read by `load`
#[derive(Deserialize)]
struct SnapshotData {
    k1: f64,
    b: f64,
    k: usize,
    tokenizer: TokenizerConfig,
    documents: Vec<Document>,
    index: InvertedIndex,
}

impl Bm25Retriever {
    /// Persist documents, index and parameters to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let params = self.params();
        let payload = self.with_corpus(|corpus| {
            rmp_serde::to_vec_named(&SnapshotRef {
                k1: params.k1,
                b: params.b,
                k: self.k(),
                tokenizer: self.tokenizer().config(),
                documents: &corpus.documents,
                index: &corpus.index,
            })
        });
        let payload = payload
            .map_err(|e| SnappyError::persistence(path, format!("encode failed: {}", e)))?;

        let compressed = zstd::encode_all(&payload[..], COMPRESSION_LEVEL)
            .map_err(|e| SnappyError::persistence(path, format!("compress failed: {}", e)))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + compressed.len());
        buf.extend_from_slice(SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(blake3::hash(&compressed).as_bytes());
        buf.extend_from_slice(&compressed);

        write_atomic(path, &buf)
            .map_err(|e| SnappyError::persistence(path, e.to_string()))?;
        tracing::info!(
            "Saved retriever snapshot ({} documents, {} bytes) to {}",
            self.len(),
            buf.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore a retriever saved with [`Bm25Retriever::save`]
    ///
    /// Missing, truncated, corrupt or incompatible files are errors; a
    /// partially restored retriever is never returned.
    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read(path)
            .map_err(|e| SnappyError::persistence(path, format!("read failed: {}", e)))?;

        if buf.len() < HEADER_LEN {
            return Err(SnappyError::persistence(path, "snapshot too small"));
        }
        if &buf[0..4] != SNAPSHOT_MAGIC {
            return Err(SnappyError::persistence(path, "bad snapshot magic"));
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&buf[4..8]);
        let version = u32::from_le_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(SnappyError::persistence(
                path,
                format!("unsupported snapshot version {}", version),
            ));
        }

        let checksum = &buf[8..HEADER_LEN];
        let compressed = &buf[HEADER_LEN..];
        if &blake3::hash(compressed).as_bytes()[..] != checksum {
            return Err(SnappyError::persistence(path, "checksum mismatch"));
        }

        let payload = zstd::decode_all(compressed)
            .map_err(|e| SnappyError::persistence(path, format!("decompress failed: {}", e)))?;
        let data: SnapshotData = rmp_serde::from_slice(&payload)
            .map_err(|e| SnappyError::persistence(path, format!("decode failed: {}", e)))?;

        let params = Bm25Params {
            k1: data.k1,
            b: data.b,
        };
        data.index
            .validate(data.documents.len())
            .map_err(|msg| SnappyError::persistence(path, msg))?;
        let mut corpus = Corpus::from_parts(data.documents, data.index)
            .map_err(|e| SnappyError::persistence(path, e.to_string()))?;
        corpus.index.recompute_average();

        let retriever = Self::from_corpus(params, data.k, data.tokenizer, corpus)
            .map_err(|e| SnappyError::persistence(path, e.to_string()))?;
        tracing::info!(
            "Loaded retriever snapshot ({} documents) from {}",
            retriever.len(),
            path.display()
        );
        Ok(retriever)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SnappyError::Io {
            source: e,
            context: format!("Failed to create snapshot directory: {}", parent.display()),
        })?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    let mut file = fs::File::create(temp_path).map_err(|e| SnappyError::Io {
        source: e,
        context: format!("Failed to create temp snapshot: {}", temp_path.display()),
    })?;
    file.write_all(data).map_err(|e| SnappyError::Io {
        source: e,
        context: format!("Failed to write snapshot: {}", temp_path.display()),
    })?;
    file.sync_all().map_err(|e| SnappyError::Io {
        source: e,
        context: format!("Failed to sync snapshot: {}", temp_path.display()),
    })?;
    drop(file);

    fs::rename(temp_path, path).map_err(|e| SnappyError::Io {
        source: e,
        context: format!(
            "Failed to rename snapshot into place: {} -> {}",
            temp_path.display(),
            path.display()
        ),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Bm25Retriever {
        let docs = vec![
            Document::with_id("tokyo", "東京は日本の首都です").with_metadata("id", 1),
            Document::with_id("kyoto", "京都は日本の古都です")
                .with_metadata("tags", serde_json::json!(["temple", {"era": 794}])),
            Document::with_id("fuji", "富士山は日本の山です"),
        ];
        Bm25Retriever::new(docs, 1.5, 0.5, 2).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("retriever.bm25");

        let original = sample();
        original.save(&path).unwrap();
        let loaded = Bm25Retriever::load(&path).unwrap();

        assert_eq!(loaded.params(), original.params());
        assert_eq!(loaded.k(), 2);
        assert_eq!(loaded.documents(), original.documents());
        for q in ["日本の首都", "古都", "東京", "nothing"] {
            assert_eq!(loaded.query(q, None).unwrap(), original.query(q, None).unwrap());
        }
    }

    #[test]
    fn test_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = Bm25Retriever::load(&temp.path().join("missing.bm25"));
        assert!(matches!(result, Err(SnappyError::Persistence { .. })));
    }

    #[test]
    fn test_bad_magic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.bm25");
        fs::write(&path, vec![0u8; 64]).unwrap();

        let err = Bm25Retriever::load(&path).unwrap_err();
        assert!(matches!(err, SnappyError::Persistence { .. }));
    }

    #[test]
    fn test_truncated_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short.bm25");
        fs::write(&path, b"BMSJ").unwrap();

        assert!(matches!(
            Bm25Retriever::load(&path),
            Err(SnappyError::Persistence { .. })
        ));
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("retriever.bm25");
        sample().save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = Bm25Retriever::load(&path).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("retriever.bm25");
        sample().save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let err = Bm25Retriever::load(&path).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("retriever.bm25");
        sample().save(&path).unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("retriever.bm25")]);
    }
}
