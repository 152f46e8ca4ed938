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

//! Interfaces to the block-level I/O subsystem. The scanner only consumes
//! these; production deployments bind them to a distributed file system,
//! the in-memory implementations here back the tests.

use std::cell::RefCell;

use bytes::Bytes;

use crate::errors::Result;

/// A byte range of one file assigned to a reader. Allocation carries
/// placement hints only; no I/O happens until a stream is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub path: String,
    pub offset: u64,
    pub len: u64,
    pub disk_id: i32,
    pub try_cache: bool,
    pub expected_local: bool,
    pub mtime: i64,
}

/// Sequential, peekable access to the bytes of one scan range. Calls that
/// obtain bytes may block on I/O.
pub trait ByteStream {
    /// Returns exactly `n` bytes, advancing the stream. Fails with an EOF
    /// error if the range (or file) ends first.
    fn read_bytes(&mut self, n: usize) -> Result<Bytes>;

    /// Returns up to `n` bytes without advancing; fewer are returned at the
    /// end of the range.
    fn peek_bytes(&mut self, n: usize) -> Result<Bytes>;

    fn skip_bytes(&mut self, n: usize) -> Result<()>;

    /// True once every byte of the range has been returned.
    fn eof(&self) -> bool;

    /// Absolute file offset of the next byte.
    fn file_offset(&self) -> u64;

    fn scan_range(&self) -> &ScanRange;

    fn bytes_left(&self) -> u64;
}

/// Scan-range bookkeeping of the I/O subsystem.
pub trait IoManager {
    /// Registers a byte range for later reading; performs no I/O.
    fn allocate_scan_range(
        &self,
        path: &str,
        len: u64,
        offset: u64,
        disk_id: i32,
        try_cache: bool,
        expected_local: bool,
        mtime: i64,
    ) -> ScanRange {
        ScanRange {
            path: path.to_owned(),
            offset,
            len,
            disk_id,
            try_cache,
            expected_local,
            mtime,
        }
    }

    /// Hands ranges to the I/O layer. With `schedule_immediately` the
    /// ranges are read eagerly rather than on demand.
    fn add_scan_ranges(&self, ranges: Vec<ScanRange>, schedule_immediately: bool) -> Result<()>;

    /// Opens a stream over a previously added range.
    fn open_stream(&self, range: &ScanRange) -> Result<Box<dyn ByteStream>>;

    /// One-off synchronous read, used to stitch oversized footers.
    fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Bytes>;
}

// ----------------------------------------------------------------------
// In-memory implementations

/// Stream over a range of an in-memory file image.
pub struct InMemoryStream {
    file: Bytes,
    range: ScanRange,
    pos: u64,
}

impl InMemoryStream {
    pub fn new(file: Bytes, range: ScanRange) -> Self {
        let pos = range.offset;
        Self { file, range, pos }
    }

    fn range_end(&self) -> u64 {
        // The catalog's file length may be stale; never read past the
        // actual data.
        (self.range.offset + self.range.len).min(self.file.len() as u64)
    }
}

impl ByteStream for InMemoryStream {
    fn read_bytes(&mut self, n: usize) -> Result<Bytes> {
        if self.pos + n as u64 > self.range_end() {
            return Err(eof_err!(
                "incomplete read of {} bytes at offset {} (range ends at {})",
                n,
                self.pos,
                self.range_end()
            ));
        }
        let start = self.pos as usize;
        self.pos += n as u64;
        Ok(self.file.slice(start..start + n))
    }

    fn peek_bytes(&mut self, n: usize) -> Result<Bytes> {
        let available = (self.range_end() - self.pos).min(n as u64) as usize;
        let start = self.pos as usize;
        Ok(self.file.slice(start..start + available))
    }

    fn skip_bytes(&mut self, n: usize) -> Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    fn eof(&self) -> bool {
        self.pos >= self.range_end()
    }

    fn file_offset(&self) -> u64 {
        self.pos
    }

    fn scan_range(&self) -> &ScanRange {
        &self.range
    }

    fn bytes_left(&self) -> u64 {
        self.range_end().saturating_sub(self.pos)
    }
}

/// I/O manager over a single in-memory file image.
pub struct InMemoryIoManager {
    path: String,
    file: Bytes,
    added: RefCell<Vec<ScanRange>>,
}

impl InMemoryIoManager {
    pub fn new(path: impl Into<String>, file: Bytes) -> Self {
        Self {
            path: path.into(),
            file,
            added: RefCell::new(Vec::new()),
        }
    }

    pub fn file_len(&self) -> u64 {
        self.file.len() as u64
    }

    /// Ranges handed to `add_scan_ranges` so far.
    pub fn added_ranges(&self) -> Vec<ScanRange> {
        self.added.borrow().clone()
    }
}

impl IoManager for InMemoryIoManager {
    fn add_scan_ranges(&self, ranges: Vec<ScanRange>, _schedule_immediately: bool) -> Result<()> {
        self.added.borrow_mut().extend(ranges);
        Ok(())
    }

    fn open_stream(&self, range: &ScanRange) -> Result<Box<dyn ByteStream>> {
        if range.path != self.path {
            return Err(general_err!("unknown file '{}'", range.path));
        }
        Ok(Box::new(InMemoryStream::new(self.file.clone(), range.clone())))
    }

    fn read_range(&self, path: &str, offset: u64, len: u64) -> Result<Bytes> {
        if path != self.path {
            return Err(general_err!("unknown file '{}'", path));
        }
        let end = offset + len;
        if end > self.file.len() as u64 {
            return Err(eof_err!(
                "read of [{}, {}) past end of {} byte file",
                offset,
                end,
                self.file.len()
            ));
        }
        Ok(self.file.slice(offset as usize..end as usize))
    }
}
