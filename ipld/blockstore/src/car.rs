// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use integer_encoding::{VarInt, VarIntReader, VarIntWriter};
use ipld_cid::CbCid;
use parking_lot::Mutex;

use crate::{BlockStore, Error};

/// Where a [`CidsIpld`] keeps its append-only data file and offset index.
#[derive(Debug, Clone)]
pub struct CarStoreConfig {
    pub car_path: PathBuf,
    pub index_path: PathBuf,
    /// Buffered pending-write bytes after which a `set` triggers an
    /// automatic flush to disk.
    pub flush_on: usize,
    pub writable: bool,
}

impl CarStoreConfig {
    pub fn new(repo_dir: impl Into<PathBuf>, writable: bool) -> Self {
        let repo_dir = repo_dir.into();
        Self {
            car_path: repo_dir.join("car"),
            index_path: repo_dir.join("car.cids"),
            flush_on: 4 << 20,
            writable,
        }
    }
}

struct Inner {
    file: File,
    /// Byte offset, within the CAR file, at which each stored CID's record
    /// begins (including its own length-prefix and CID bytes).
    index: HashMap<CbCid, u64>,
    pending: Vec<(CbCid, Vec<u8>)>,
    pending_bytes: usize,
}

/// CAR-backed [`BlockStore`]: appends `(cid, bytes)` records to a file and
/// keeps an in-memory/on-disk offset index so `get` is a single seek+read.
pub struct CidsIpld {
    config: CarStoreConfig,
    inner: Mutex<Inner>,
}

fn record_bytes(cid: &CbCid, data: &[u8]) -> Vec<u8> {
    let cid_bytes = cid.to_bytes();
    let mut body = Vec::with_capacity(cid_bytes.len() + data.len());
    body.extend_from_slice(&cid_bytes);
    body.extend_from_slice(data);
    let mut out = Vec::with_capacity(body.len() + 10);
    out.write_varint(body.len() as u64).expect("write to vec");
    out.extend_from_slice(&body);
    out
}

/// Scans the whole CAR file from the start, returning the offset index and
/// the length of the longest well-formed prefix of the file (bytes after
/// that point are a truncated trailing record and must be discarded).
fn rebuild_index(file: &mut File) -> Result<(HashMap<CbCid, u64>, u64), Error> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut index = HashMap::new();
    let mut offset: u64 = 0;
    loop {
        let record_start = offset;
        let len: u64 = match reader.read_varint() {
            Ok(len) => len,
            Err(_) => break, // EOF or partial varint: stop, truncate here.
        };
        let header_len = (len.required_space()) as u64;
        let mut body = vec![0u8; len as usize];
        if reader.read_exact(&mut body).is_err() {
            break; // partial record body: truncate at record_start.
        }
        let cid_len = match ipld_cid::Cid::try_from(body.as_slice()) {
            Ok(cid) => cid.to_bytes().len(),
            Err(_) => break,
        };
        match CbCid::from_bytes(&body[..cid_len]) {
            Ok(cid) => {
                index.entry(cid).or_insert(record_start);
            }
            Err(_) => break,
        }
        offset = record_start + header_len + len;
    }
    Ok((index, offset))
}

fn write_index(path: &std::path::Path, index: &HashMap<CbCid, u64>) -> Result<(), Error> {
    let mut out = Vec::with_capacity(index.len() * 48);
    for (cid, offset) in index {
        let bytes = cid.to_bytes();
        out.write_varint(bytes.len() as u64)?;
        out.extend_from_slice(&bytes);
        out.extend_from_slice(&offset.to_be_bytes());
    }
    std::fs::write(path, out)?;
    Ok(())
}

fn load_index(path: &std::path::Path) -> Result<HashMap<CbCid, u64>, Error> {
    let bytes = std::fs::read(path)?;
    let mut cursor = &bytes[..];
    let mut index = HashMap::new();
    while !cursor.is_empty() {
        let len = u64::decode_var(cursor)
            .ok_or_else(|| Error::CidsIndexCorrupt("bad varint".into()))?
            .0 as usize;
        let header_len = len.required_space();
        cursor = &cursor[header_len..];
        if cursor.len() < len + 8 {
            return Err(Error::CidsIndexCorrupt("truncated entry".into()));
        }
        let cid = CbCid::from_bytes(&cursor[..len])?;
        let offset = u64::from_be_bytes(cursor[len..len + 8].try_into().unwrap());
        index.insert(cid, offset);
        cursor = &cursor[len + 8..];
    }
    Ok(index)
}

impl CidsIpld {
    pub fn open(config: CarStoreConfig) -> Result<Self, Error> {
        if !config.writable && !config.car_path.exists() {
            return Err(Error::ReadOnlyMissing(config.car_path.display().to_string()));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(config.writable)
            .create(config.writable)
            .open(&config.car_path)?;
        let file_len = file.metadata()?.len();

        let index = if config.index_path.exists() {
            match load_index(&config.index_path) {
                Ok(idx) => {
                    let max_offset = idx.values().copied().max().unwrap_or(0);
                    if max_offset > file_len {
                        tracing::warn!("cids index stale, rebuilding");
                        rebuild_and_truncate(&mut file, &config)?
                    } else {
                        idx
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cids index corrupt, rebuilding");
                    rebuild_and_truncate(&mut file, &config)?
                }
            }
        } else {
            rebuild_and_truncate(&mut file, &config)?
        };

        Ok(CidsIpld {
            config,
            inner: Mutex::new(Inner {
                file,
                index,
                pending: Vec::new(),
                pending_bytes: 0,
            }),
        })
    }

    pub fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut Inner) -> Result<(), Error> {
        if inner.pending.is_empty() {
            return Ok(());
        }
        inner.file.seek(SeekFrom::End(0))?;
        let mut offset = inner.file.stream_position()?;
        let pending = std::mem::take(&mut inner.pending);
        for (cid, data) in pending {
            if inner.index.contains_key(&cid) {
                continue; // duplicate set: single entry in the file.
            }
            let record = record_bytes(&cid, &data);
            inner.file.write_all(&record)?;
            inner.index.insert(cid, offset);
            offset += record.len() as u64;
        }
        inner.file.flush()?;
        inner.pending_bytes = 0;
        write_index(&self.config.index_path, &inner.index)?;
        Ok(())
    }
}

fn rebuild_and_truncate(
    file: &mut File,
    config: &CarStoreConfig,
) -> Result<HashMap<CbCid, u64>, Error> {
    let (index, good_len) = rebuild_index(file)?;
    if config.writable {
        file.set_len(good_len)?;
        file.seek(SeekFrom::End(0))?;
        write_index(&config.index_path, &index)?;
    }
    Ok(index)
}

impl BlockStore for CidsIpld {
    fn contains(&self, cid: &CbCid) -> Result<bool, Error> {
        let inner = self.inner.lock();
        Ok(inner.index.contains_key(cid) || inner.pending.iter().any(|(c, _)| c == cid))
    }

    fn get(&self, cid: &CbCid) -> Result<Vec<u8>, Error> {
        let mut inner = self.inner.lock();
        if let Some((_, data)) = inner.pending.iter().find(|(c, _)| c == cid) {
            return Ok(data.clone());
        }
        let offset = *inner.index.get(cid).ok_or(Error::NotFound)?;
        inner.file.seek(SeekFrom::Start(offset))?;
        let len: u64 = inner.file.read_varint()?;
        let mut body = vec![0u8; len as usize];
        inner.file.read_exact(&mut body)?;
        let cid_len = ipld_cid::Cid::try_from(body.as_slice())
            .map_err(|_| Error::CidsIndexCorrupt("bad stored cid".into()))?
            .to_bytes()
            .len();
        Ok(body[cid_len..].to_vec())
    }

    fn set(&self, cid: &CbCid, bytes: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if inner.index.contains_key(cid) || inner.pending.iter().any(|(c, _)| c == cid) {
            return Ok(()); // duplicate set of the same CID is a no-op.
        }
        inner.pending_bytes += bytes.len();
        inner.pending.push((*cid, bytes.to_vec()));
        if inner.pending_bytes >= self.config.flush_on {
            self.flush_locked(&mut inner)?;
        }
        Ok(())
    }
}

impl Drop for CidsIpld {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "failed to flush cids store on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_flush_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CarStoreConfig::new(dir.path(), true);
        let cid_a = CbCid::hash(b"a");
        {
            let store = CidsIpld::open(cfg.clone()).unwrap();
            store.set(&cid_a, b"hello").unwrap();
            store.flush().unwrap();
        }
        let store = CidsIpld::open(cfg).unwrap();
        assert!(store.contains(&cid_a).unwrap());
        assert_eq!(store.get(&cid_a).unwrap(), b"hello");
    }

    #[test]
    fn readonly_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CarStoreConfig::new(dir.path(), false);
        assert!(matches!(CidsIpld::open(cfg), Err(Error::ReadOnlyMissing(_))));
    }

    #[test]
    fn duplicate_set_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CarStoreConfig::new(dir.path(), true);
        let store = CidsIpld::open(cfg).unwrap();
        let cid = store.set_cbor(&7u64).unwrap();
        store.set(&cid, &encoding::to_vec(&7u64).unwrap()).unwrap();
        store.flush().unwrap();
        assert_eq!(store.get_cbor::<u64>(&cid).unwrap(), 7);
    }

    #[test]
    fn index_rebuilt_when_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CarStoreConfig::new(dir.path(), true);
        let cid_a = CbCid::hash(b"a");
        {
            let store = CidsIpld::open(cfg.clone()).unwrap();
            store.set(&cid_a, b"hello").unwrap();
            store.flush().unwrap();
        }
        std::fs::remove_file(&cfg.index_path).unwrap();
        let store = CidsIpld::open(cfg).unwrap();
        assert_eq!(store.get(&cid_a).unwrap(), b"hello");
    }
}
