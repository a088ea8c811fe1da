//! Decoded-image cache shared by all patches of a source image.
//!
//! Entries live in memory until the in-memory bound is exceeded; with a spill
//! directory configured, the oldest entries are then written to disk and
//! reloaded transparently on the next `get`. Without a spill directory the
//! bound is ignored and the cache is memory-only. Nothing outlives the cache:
//! spilled files are removed on drop.

use crate::imaging::ImageObject;
use crate::types::{DatasetError, DatasetResult};
use ndarray::{Array2, Array3};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const SPILL_MAGIC: &[u8; 4] = b"PFC1";
const SPILL_VERSION: u32 = 1;
const HEADER_LEN: usize = 28;
const FLAG_GT: u32 = 1;
const FLAG_MASK: u32 = 2;

#[derive(Default)]
struct CacheState {
    resident: HashMap<String, Arc<ImageObject>>,
    /// Resident keys, oldest first.
    order: VecDeque<String>,
    spilled: HashMap<String, PathBuf>,
    next_file: usize,
}

pub struct DiskCache {
    state: RwLock<CacheState>,
    spill_dir: Option<PathBuf>,
    max_in_memory: usize,
}

impl Default for DiskCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("DiskCache")
            .field("resident", &state.resident.len())
            .field("spilled", &state.spilled.len())
            .field("spill_dir", &self.spill_dir)
            .field("max_in_memory", &self.max_in_memory)
            .finish()
    }
}

impl DiskCache {
    /// Memory-only cache without an entry bound.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            spill_dir: None,
            max_in_memory: usize::MAX,
        }
    }

    /// Cache keeping at most `max_in_memory` entries resident, spilling the rest under `dir`.
    pub fn with_spill(dir: impl Into<PathBuf>, max_in_memory: usize) -> DatasetResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| DatasetError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self {
            state: RwLock::new(CacheState::default()),
            spill_dir: Some(dir),
            max_in_memory: max_in_memory.max(1),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `value` under `key`; a later add for the same key wins.
    pub fn add(&self, key: impl Into<String>, value: ImageObject) -> DatasetResult<()> {
        let key = key.into();
        let mut state = self.write();
        if let Some(path) = state.spilled.remove(&key) {
            let _ = fs::remove_file(path);
        }
        state.order.retain(|k| k != &key);
        state.resident.insert(key.clone(), Arc::new(value));
        state.order.push_back(key);
        self.evict_overflow(&mut state)
    }

    /// Fetch the entry for `key`; unknown keys are a `CacheMiss`.
    pub fn get(&self, key: &str) -> DatasetResult<Arc<ImageObject>> {
        if let Some(hit) = self.read().resident.get(key) {
            return Ok(Arc::clone(hit));
        }
        let mut state = self.write();
        if let Some(hit) = state.resident.get(key) {
            return Ok(Arc::clone(hit));
        }
        let Some(path) = state.spilled.get(key).cloned() else {
            return Err(DatasetError::CacheMiss {
                key: key.to_string(),
            });
        };
        let obj = Arc::new(read_spill(&path)?);
        state.spilled.remove(key);
        let _ = fs::remove_file(&path);
        debug!(key, path = %path.display(), "reloaded spilled cache entry");
        state.resident.insert(key.to_string(), Arc::clone(&obj));
        state.order.push_back(key.to_string());
        self.evict_overflow(&mut state)?;
        Ok(obj)
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = self.read();
        state.resident.contains_key(key) || state.spilled.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let state = self.read();
        state.resident.len() + state.spilled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_len(&self) -> usize {
        self.read().resident.len()
    }

    pub fn clear(&self) {
        let mut state = self.write();
        for (_, path) in state.spilled.drain() {
            let _ = fs::remove_file(path);
        }
        state.resident.clear();
        state.order.clear();
    }

    fn evict_overflow(&self, state: &mut CacheState) -> DatasetResult<()> {
        let Some(dir) = self.spill_dir.as_deref() else {
            return Ok(());
        };
        while state.resident.len() > self.max_in_memory {
            let Some(oldest) = state.order.front().cloned() else {
                break;
            };
            let Some(obj) = state.resident.get(&oldest).map(Arc::clone) else {
                state.order.pop_front();
                continue;
            };
            let path = dir.join(format!("{:06}_{}.bin", state.next_file, sanitize(&oldest)));
            // The entry stays resident until its spill file is complete.
            if let Err(err) = write_spill(&path, &obj) {
                let _ = fs::remove_file(&path);
                return Err(err);
            }
            state.next_file += 1;
            state.order.pop_front();
            state.resident.remove(&oldest);
            debug!(key = %oldest, path = %path.display(), "spilled cache entry to disk");
            state.spilled.insert(oldest, path);
        }
        Ok(())
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        self.clear();
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn write_spill(path: &Path, obj: &ImageObject) -> DatasetResult<()> {
    let io_err = |e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let (rows, cols, channels) = obj.array.dim();
    let mut flags = 0u32;
    if obj.ground_truth.is_some() {
        flags |= FLAG_GT;
    }
    if obj.mask.is_some() {
        flags |= FLAG_MASK;
    }
    let name = obj.file.as_bytes();

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(SPILL_MAGIC);
    header[4..8].copy_from_slice(&SPILL_VERSION.to_le_bytes());
    header[8..12].copy_from_slice(&(rows as u32).to_le_bytes());
    header[12..16].copy_from_slice(&(cols as u32).to_le_bytes());
    header[16..20].copy_from_slice(&(channels as u32).to_le_bytes());
    header[20..24].copy_from_slice(&flags.to_le_bytes());
    header[24..28].copy_from_slice(&(name.len() as u32).to_le_bytes());

    let file = fs::File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);
    out.write_all(&header).map_err(io_err)?;
    out.write_all(name).map_err(io_err)?;
    let pixels: Vec<u8> = obj.array.iter().copied().collect();
    out.write_all(&pixels).map_err(io_err)?;
    for plane in [&obj.ground_truth, &obj.mask].into_iter().flatten() {
        let bytes: Vec<u8> = plane.iter().copied().collect();
        out.write_all(&bytes).map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}

fn read_spill(path: &Path) -> DatasetResult<ImageObject> {
    let raw = fs::read(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let corrupt = |msg: &str| DatasetError::Other(format!("corrupt cache file {}: {msg}", path.display()));
    if raw.len() < HEADER_LEN || &raw[0..4] != SPILL_MAGIC {
        return Err(corrupt("bad header"));
    }
    let word = |at: usize| {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&raw[at..at + 4]);
        u32::from_le_bytes(arr) as usize
    };
    if word(4) != SPILL_VERSION as usize {
        return Err(corrupt("unsupported version"));
    }
    let (rows, cols, channels, flags, name_len) = (word(8), word(12), word(16), word(20) as u32, word(24));
    let plane = rows * cols;
    let mut cursor = HEADER_LEN;
    let name = take(&raw, &mut cursor, name_len).ok_or_else(|| corrupt("truncated"))?;
    let file = String::from_utf8_lossy(name).into_owned();
    let pixels = take(&raw, &mut cursor, plane * channels).ok_or_else(|| corrupt("truncated"))?;
    let array = Array3::from_shape_vec((rows, cols, channels), pixels.to_vec()).map_err(|e| corrupt(&e.to_string()))?;
    let mut obj = ImageObject::new(file, array);
    if flags & FLAG_GT != 0 {
        let bytes = take(&raw, &mut cursor, plane).ok_or_else(|| corrupt("truncated"))?;
        obj.ground_truth =
            Some(Array2::from_shape_vec((rows, cols), bytes.to_vec()).map_err(|e| corrupt(&e.to_string()))?);
    }
    if flags & FLAG_MASK != 0 {
        let bytes = take(&raw, &mut cursor, plane).ok_or_else(|| corrupt("truncated"))?;
        obj.mask = Some(Array2::from_shape_vec((rows, cols), bytes.to_vec()).map_err(|e| corrupt(&e.to_string()))?);
    }
    Ok(obj)
}

fn take<'a>(raw: &'a [u8], cursor: &mut usize, len: usize) -> Option<&'a [u8]> {
    let end = cursor.checked_add(len)?;
    let bytes = raw.get(*cursor..end)?;
    *cursor = end;
    Some(bytes)
}
