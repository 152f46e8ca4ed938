// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Logical memory accounting and pooled allocation for scan buffers.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::errors::{Result, ScanError};

/// Tracks logical memory usage for a component and its ancestors.
///
/// Only records bytes explicitly reported by the caller; it does not reflect
/// allocator statistics. A limit of -1 means unlimited.
#[derive(Debug)]
pub struct MemTracker {
    label: String,
    limit: i64,
    parent: Option<Arc<MemTracker>>,
    current: AtomicI64,
    peak: AtomicI64,
}

impl MemTracker {
    /// Create a root tracker with no parent and no limit.
    pub fn new_root(label: impl Into<String>) -> MemTracker {
        Self::with_limit(label, -1)
    }

    /// Create a root tracker with a byte limit.
    pub fn with_limit(label: impl Into<String>, limit: i64) -> MemTracker {
        MemTracker {
            label: label.into(),
            limit,
            parent: None,
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        }
    }

    /// Create a child tracker charging into `parent`.
    pub fn new_child(label: impl Into<String>, limit: i64, parent: &Arc<MemTracker>) -> MemTracker {
        MemTracker {
            label: label.into(),
            limit,
            parent: Some(Arc::clone(parent)),
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Increase consumption for this tracker and all ancestors without a
    /// limit check.
    pub fn consume(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let new_value = current.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            current.update_peak(new_value);
            tracker = current.parent.as_deref();
        }
    }

    /// Try to increase consumption; on hitting any limit along the ancestor
    /// chain the whole attempt is rolled back and false is returned.
    pub fn try_consume(&self, bytes: i64) -> bool {
        if bytes <= 0 {
            return true;
        }
        let mut consumed: Vec<&MemTracker> = Vec::new();
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            let new_value = current.current.fetch_add(bytes, Ordering::AcqRel) + bytes;
            if current.limit >= 0 && new_value > current.limit {
                current.current.fetch_sub(bytes, Ordering::AcqRel);
                for t in consumed {
                    t.current.fetch_sub(bytes, Ordering::AcqRel);
                }
                return false;
            }
            current.update_peak(new_value);
            consumed.push(current);
            tracker = current.parent.as_deref();
        }
        true
    }

    /// Decrease consumption for this tracker and all ancestors.
    pub fn release(&self, bytes: i64) {
        if bytes <= 0 {
            return;
        }
        let mut tracker: Option<&MemTracker> = Some(self);
        while let Some(current) = tracker {
            current.current.fetch_sub(bytes, Ordering::AcqRel);
            tracker = current.parent.as_deref();
        }
    }

    /// Builds the fatal error reported when an allocation does not fit.
    pub fn limit_exceeded<T>(&self, detail: &str, size: i64) -> Result<T> {
        Err(ScanError::MemLimitExceeded(format!(
            "failed to allocate {} bytes for {} (tracker '{}' at {} of limit {})",
            size,
            detail,
            self.label,
            self.current(),
            self.limit
        )))
    }

    fn update_peak(&self, value: i64) {
        let mut prev = self.peak.load(Ordering::Relaxed);
        while value > prev {
            match self
                .peak
                .compare_exchange(prev, value, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Chunk ids are issued once per process so a [`PoolRef`] stays valid when
/// its backing chunk is transferred between pools.
static NEXT_CHUNK_ID: AtomicU32 = AtomicU32::new(1);

fn next_chunk_id() -> u32 {
    NEXT_CHUNK_ID.fetch_add(1, Ordering::Relaxed)
}

/// A position-independent reference to bytes held by a [`MemPool`] (or by a
/// pool the data was later transferred to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolRef {
    pub chunk: u32,
    pub offset: u32,
}

#[derive(Debug)]
struct Chunk {
    id: u32,
    data: Vec<u8>,
}

/// Bump arena for variable-length tuple payloads.
///
/// Allocations return [`PoolRef`]s; chunks never shrink or move their
/// contents, and `acquire_data` transfers whole chunks between pools, so a
/// ref taken from one pool resolves against whichever pool currently owns
/// the chunk. Decompression buffers are attached as refcounted [`Bytes`] so
/// their lifetime and accounting follow the pool.
#[derive(Debug)]
pub struct MemPool {
    tracker: Arc<MemTracker>,
    /// Sealed chunks, sorted by id; the active chunk is separate.
    chunks: Vec<Chunk>,
    active: Chunk,
    attached: Vec<Bytes>,
    attached_bytes: i64,
}

impl MemPool {
    pub fn new(tracker: Arc<MemTracker>) -> Self {
        MemPool {
            tracker,
            chunks: Vec::new(),
            active: Chunk {
                id: next_chunk_id(),
                data: Vec::new(),
            },
            attached: Vec::new(),
            attached_bytes: 0,
        }
    }

    pub fn mem_tracker(&self) -> &Arc<MemTracker> {
        &self.tracker
    }

    /// Copies `data` into the pool, returning a stable reference.
    pub fn allocate(&mut self, data: &[u8]) -> Result<PoolRef> {
        let r = self.try_reserve(data.len())?;
        self.active.data.extend_from_slice(data);
        Ok(r)
    }

    /// Reserves `len` zeroed bytes, returning a stable reference.
    pub fn allocate_zeroed(&mut self, len: usize) -> Result<PoolRef> {
        let r = self.try_reserve(len)?;
        self.active.data.resize(self.active.data.len() + len, 0);
        Ok(r)
    }

    fn try_reserve(&mut self, len: usize) -> Result<PoolRef> {
        if self.active.data.len() + len > u32::MAX as usize {
            return Err(general_err!("pool chunk exceeded 4 GiB"));
        }
        if !self.tracker.try_consume(len as i64) {
            return self.tracker.limit_exceeded("pool allocation", len as i64);
        }
        Ok(PoolRef {
            chunk: self.active.id,
            offset: self.active.data.len() as u32,
        })
    }

    /// Resolves a reference to `len` bytes. Returns `None` if the chunk does
    /// not belong to this pool.
    pub fn get(&self, r: PoolRef, len: usize) -> Option<&[u8]> {
        let chunk = if r.chunk == self.active.id {
            &self.active
        } else {
            let idx = self.chunks.binary_search_by_key(&r.chunk, |c| c.id).ok()?;
            &self.chunks[idx]
        };
        chunk.data.get(r.offset as usize..r.offset as usize + len)
    }

    /// Keeps a refcounted buffer (e.g. a decompressed page) alive for as
    /// long as this pool, charging its size here.
    pub fn attach_buffer(&mut self, buf: Bytes) {
        self.tracker.consume(buf.len() as i64);
        self.attached_bytes += buf.len() as i64;
        self.attached.push(buf);
    }

    /// Transfers all memory owned by `src` into this pool. References into
    /// `src` chunks remain valid and now resolve against `self`.
    pub fn acquire_data(&mut self, src: &mut MemPool) {
        let moved = src.total_allocated_bytes();
        src.tracker.release(moved);
        self.tracker.consume(moved);

        let fresh = Chunk {
            id: next_chunk_id(),
            data: Vec::new(),
        };
        let old_active = std::mem::replace(&mut src.active, fresh);
        self.chunks.append(&mut src.chunks);
        if !old_active.data.is_empty() {
            self.chunks.push(old_active);
        }
        self.chunks.sort_by_key(|c| c.id);
        self.attached.append(&mut src.attached);
        self.attached_bytes += src.attached_bytes;
        src.attached_bytes = 0;
    }

    /// Releases everything owned by the pool.
    pub fn free_all(&mut self) {
        let total = self.total_allocated_bytes();
        self.tracker.release(total);
        self.chunks.clear();
        self.active = Chunk {
            id: next_chunk_id(),
            data: Vec::new(),
        };
        self.attached.clear();
        self.attached_bytes = 0;
    }

    pub fn total_allocated_bytes(&self) -> i64 {
        let chunk_bytes: usize = self.chunks.iter().map(|c| c.data.len()).sum();
        chunk_bytes as i64 + self.active.data.len() as i64 + self.attached_bytes
    }
}

impl Drop for MemPool {
    fn drop(&mut self) {
        self.free_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_hierarchy() {
        let root = Arc::new(MemTracker::with_limit("root", 100));
        let child = MemTracker::new_child("child", -1, &root);
        assert!(child.try_consume(60));
        assert_eq!(root.current(), 60);
        assert!(!child.try_consume(50));
        assert_eq!(root.current(), 60);
        assert_eq!(child.current(), 60);
        child.release(60);
        assert_eq!(root.current(), 0);
        assert_eq!(root.peak(), 60);
    }

    #[test]
    fn test_pool_refs_survive_transfer() {
        let tracker = Arc::new(MemTracker::new_root("test"));
        let mut src = MemPool::new(Arc::clone(&tracker));
        let mut dst = MemPool::new(Arc::clone(&tracker));

        let a = src.allocate(b"hello").unwrap();
        let b = src.allocate(b"world").unwrap();
        assert_eq!(src.get(a, 5).unwrap(), b"hello");

        dst.acquire_data(&mut src);
        assert!(src.get(a, 5).is_none());
        assert_eq!(dst.get(a, 5).unwrap(), b"hello");
        assert_eq!(dst.get(b, 5).unwrap(), b"world");
        assert_eq!(src.total_allocated_bytes(), 0);
        assert_eq!(dst.total_allocated_bytes(), 10);

        // New allocations in the source land in a fresh chunk.
        let c = src.allocate(b"again").unwrap();
        assert_ne!(c.chunk, a.chunk);
        assert_eq!(src.get(c, 5).unwrap(), b"again");
    }

    #[test]
    fn test_pool_limit() {
        let tracker = Arc::new(MemTracker::with_limit("small", 8));
        let mut pool = MemPool::new(tracker);
        assert!(pool.allocate(b"12345678").is_ok());
        let err = pool.allocate(b"9").unwrap_err();
        assert!(matches!(err, ScanError::MemLimitExceeded(_)));
    }

    #[test]
    fn test_free_all_releases_accounting() {
        let tracker = Arc::new(MemTracker::new_root("test"));
        let mut pool = MemPool::new(Arc::clone(&tracker));
        pool.allocate(b"abc").unwrap();
        pool.attach_buffer(Bytes::from_static(b"attached"));
        assert_eq!(tracker.current(), 11);
        pool.free_all();
        assert_eq!(tracker.current(), 0);
    }
}
