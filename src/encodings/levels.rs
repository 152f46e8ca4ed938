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

//! Decoder for definition and repetition level streams.
//!
//! Levels are unsigned 8-bit integers because the maximum supported nesting
//! depth is 100. Decoded levels are cached in batches so the hot
//! materialization loops read from a plain byte array.

use bytes::Bytes;

use crate::basic::Encoding;
use crate::errors::{Result, ScanError};
use crate::memory::MemTracker;
use crate::util::bit_util::{ceil, num_required_bits, read_num_bytes_u32, MsbBitReader};

use super::rle::RleDecoder;

/// Sentinel for a level that could not be decoded.
pub const INVALID_LEVEL: i16 = -1;

/// Which of the two level streams a decoder reads; selects the error kind
/// reported on a bad level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    Def,
    Rep,
}

enum LevelEncoding {
    Rle(RleDecoder),
    /// Deprecated Parquet v1 encoding: pure bit-packed levels, most
    /// significant bit first.
    BitPacked(MsbBitReader, u8),
}

/// Decoder for one of the two level streams of a data page. Optionally
/// decodes and caches level values in batches.
pub struct LevelDecoder {
    kind: LevelKind,
    inner: Option<LevelEncoding>,
    max_level: i16,
    /// Number of remaining values in the current data page, for error
    /// context.
    num_buffered_values: usize,

    /// Separate allocation from the page buffer so it can be held across
    /// page boundaries; sized to the scan batch size and reused for the
    /// whole scan.
    cached_levels: Vec<u8>,
    num_cached_levels: usize,
    cached_level_idx: usize,
}

impl LevelDecoder {
    pub fn new(kind: LevelKind) -> Self {
        Self {
            kind,
            inner: None,
            max_level: 0,
            num_buffered_values: 0,
            cached_levels: Vec::new(),
            num_cached_levels: 0,
            cached_level_idx: 0,
        }
    }

    /// Allocates the level cache, once; later calls must pass the same size.
    /// The allocation is charged to `tracker`.
    pub fn init_cache(&mut self, cache_size: usize, tracker: &MemTracker) -> Result<()> {
        self.num_cached_levels = 0;
        self.cached_level_idx = 0;
        if !self.cached_levels.is_empty() {
            debug_assert_eq!(self.cached_levels.len(), cache_size);
            return Ok(());
        }
        if !tracker.try_consume(cache_size as i64) {
            return tracker.limit_exceeded("level cache", cache_size as i64);
        }
        self.cached_levels = vec![0; cache_size];
        Ok(())
    }

    /// Initializes the decoder for one data page. Advances `data` past the
    /// RLE length prefix and the level run bytes so that on return `data`
    /// starts at the next section of the page.
    pub fn init(
        &mut self,
        encoding: Encoding,
        max_level: i16,
        num_buffered_values: usize,
        data: &mut Bytes,
    ) -> Result<()> {
        self.max_level = max_level;
        self.num_buffered_values = num_buffered_values;
        self.num_cached_levels = 0;
        self.cached_level_idx = 0;

        // There is no level data to read, e.g. a required field.
        if max_level == 0 {
            self.inner = None;
            return Ok(());
        }

        let bit_width = num_required_bits(max_level as u64);
        let num_bytes = match encoding {
            Encoding::RLE => {
                if data.len() < 4 {
                    return Err(ScanError::CorruptRleBytes(format!(
                        "missing RLE length prefix, {} bytes left in page",
                        data.len()
                    )));
                }
                let rle_len = read_num_bytes_u32(4, data) as usize;
                if rle_len > data.len() - 4 {
                    return Err(ScanError::CorruptRleBytes(format!(
                        "RLE levels of {} bytes exceed the {} remaining page bytes",
                        rle_len,
                        data.len() - 4
                    )));
                }
                let mut decoder = RleDecoder::new(bit_width);
                decoder.set_data(data.slice(4..4 + rle_len));
                self.inner = Some(LevelEncoding::Rle(decoder));
                4 + rle_len
            }
            Encoding::BIT_PACKED => {
                let num_bytes = ceil(num_buffered_values * bit_width as usize, 8);
                if num_bytes > data.len() {
                    return Err(ScanError::CorruptRleBytes(format!(
                        "bit-packed levels of {} bytes exceed the {} remaining page bytes",
                        num_bytes,
                        data.len()
                    )));
                }
                self.inner = Some(LevelEncoding::BitPacked(
                    MsbBitReader::new(data.slice(..num_bytes)),
                    bit_width,
                ));
                num_bytes
            }
            other => {
                return Err(ScanError::UnsupportedEncoding(format!(
                    "level encoding {other}"
                )))
            }
        };
        *data = data.slice(num_bytes..);
        Ok(())
    }

    /// Returns the next level, or [`INVALID_LEVEL`] on a decode error. Only
    /// used by the non-batched reader path; the batched path goes through
    /// the cache.
    pub fn read_level(&mut self) -> i16 {
        let level = match &mut self.inner {
            None => return 0,
            Some(LevelEncoding::Rle(decoder)) => decoder.get::<u8>(),
            Some(LevelEncoding::BitPacked(reader, bit_width)) => {
                reader.get_value::<u8>(*bit_width as usize)
            }
        };
        match level {
            Some(l) if (l as i16) <= self.max_level => l as i16,
            _ => INVALID_LEVEL,
        }
    }

    /// Decodes and caches the next `batch_size` levels, resetting the cache
    /// cursor. Fails if a level was encountered with a value greater than
    /// the maximum or if the level stream underflowed.
    pub fn cache_next_batch(&mut self, batch_size: usize) -> Result<()> {
        debug_assert!(batch_size <= self.cached_levels.len());
        self.cached_level_idx = 0;
        match &mut self.inner {
            None => {
                // No levels to read; the cache was zero-initialized, so hand
                // out those values.
                debug_assert_eq!(self.max_level, 0);
                self.num_cached_levels = batch_size;
                Ok(())
            }
            Some(inner) => {
                let cache = &mut self.cached_levels[..batch_size];
                let decoded = match inner {
                    LevelEncoding::Rle(decoder) => decoder.get_batch(cache)?,
                    LevelEncoding::BitPacked(reader, bit_width) => {
                        reader.get_batch(cache, *bit_width as usize)
                    }
                };
                self.num_cached_levels = decoded;
                if decoded < batch_size || cache[..decoded].iter().any(|&l| l as i16 > self.max_level)
                {
                    self.num_cached_levels = 0;
                    return Err(self.decoding_error());
                }
                Ok(())
            }
        }
    }

    fn decoding_error(&self) -> ScanError {
        let detail = format!(
            "could not decode levels for page with {} buffered values (max level {})",
            self.num_buffered_values, self.max_level
        );
        match self.kind {
            LevelKind::Def => ScanError::DefLevelError(detail),
            LevelKind::Rep => ScanError::RepLevelError(detail),
        }
    }

    #[inline]
    pub fn cache_has_next(&self) -> bool {
        self.cached_level_idx < self.num_cached_levels
    }

    #[inline]
    pub fn cache_get_next(&mut self) -> i16 {
        debug_assert!(self.cache_has_next());
        let level = self.cached_levels[self.cached_level_idx];
        self.cached_level_idx += 1;
        level as i16
    }

    #[inline]
    pub fn cache_skip_levels(&mut self, num_levels: usize) {
        debug_assert!(self.cached_level_idx + num_levels <= self.num_cached_levels);
        self.cached_level_idx += num_levels;
    }

    #[inline]
    pub fn cache_remaining(&self) -> usize {
        self.num_cached_levels - self.cached_level_idx
    }

    #[inline]
    pub fn cache_curr_idx(&self) -> usize {
        self.cached_level_idx
    }
}
