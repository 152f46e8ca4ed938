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

//! Bit-level reading utilities for RLE and bit-packed streams.

use bytes::Bytes;

/// Returns the ceiling of `value` / `divisor`.
#[inline]
pub fn ceil(value: usize, divisor: usize) -> usize {
    value / divisor + usize::from(value % divisor != 0)
}

/// Returns the number of bits needed to represent `x`, i.e.
/// `ceil(log2(x + 1))`. Zero needs zero bits.
#[inline]
pub fn num_required_bits(x: u64) -> u8 {
    (64 - x.leading_zeros()) as u8
}

/// Reads up to 4 little-endian bytes from `src` into a `u32`.
///
/// # Panics
///
/// Panics if `size > 4` or `src` is shorter than `size`.
#[inline]
pub fn read_num_bytes_u32(size: usize, src: &[u8]) -> u32 {
    assert!(size <= 4 && size <= src.len());
    let mut buf = [0u8; 4];
    buf[..size].copy_from_slice(&src[..size]);
    u32::from_le_bytes(buf)
}

/// Values that can be produced from the low bits of a `u64` read out of a
/// bit-packed stream.
pub trait FromU64: Copy + Default {
    fn from_u64(v: u64) -> Self;
}

macro_rules! from_u64_impl {
    ($($t:ty),*) => {
        $(impl FromU64 for $t {
            #[inline]
            fn from_u64(v: u64) -> Self {
                v as $t
            }
        })*
    };
}

from_u64_impl!(u8, u16, u32, u64, i16, i32, i64, usize);

impl FromU64 for bool {
    #[inline]
    fn from_u64(v: u64) -> Self {
        v != 0
    }
}

/// Reads values of arbitrary bit width from a byte buffer, least-significant
/// bit first within each byte, matching Parquet's RLE/bit-packing hybrid.
#[derive(Debug, Default, Clone)]
pub struct BitReader {
    data: Bytes,
    /// Next bit to read, counted from the start of `data`.
    bit_offset: usize,
}

impl BitReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, bit_offset: 0 }
    }

    pub fn reset(&mut self, data: Bytes) {
        self.data = data;
        self.bit_offset = 0;
    }

    /// Number of complete bytes consumed so far.
    pub fn byte_offset(&self) -> usize {
        ceil(self.bit_offset, 8)
    }

    /// Reads a `num_bits` wide value, or `None` on stream underflow.
    /// `num_bits` must be at most 64.
    pub fn get_value<T: FromU64>(&mut self, num_bits: usize) -> Option<T> {
        debug_assert!(num_bits <= 64);
        let end = self.bit_offset.checked_add(num_bits)?;
        if end > self.data.len() * 8 {
            return None;
        }
        let mut v: u64 = 0;
        for i in 0..num_bits {
            let bit = self.bit_offset + i;
            let byte = self.data[bit / 8];
            v |= (((byte >> (bit % 8)) & 1) as u64) << i;
        }
        self.bit_offset = end;
        Some(T::from_u64(v))
    }

    /// Reads up to `batch.len()` values of width `num_bits`, returning the
    /// number actually read before the stream ran out.
    pub fn get_batch<T: FromU64>(&mut self, batch: &mut [T], num_bits: usize) -> usize {
        for (i, out) in batch.iter_mut().enumerate() {
            match self.get_value(num_bits) {
                Some(v) => *out = v,
                None => return i,
            }
        }
        batch.len()
    }

    /// Reads a byte-aligned value of `num_bytes` little-endian bytes,
    /// advancing past any partially consumed byte first.
    pub fn get_aligned(&mut self, num_bytes: usize) -> Option<u64> {
        debug_assert!(num_bytes <= 8);
        let byte_start = ceil(self.bit_offset, 8);
        if byte_start + num_bytes > self.data.len() {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..num_bytes].copy_from_slice(&self.data[byte_start..byte_start + num_bytes]);
        self.bit_offset = (byte_start + num_bytes) * 8;
        Some(u64::from_le_bytes(buf))
    }

    /// Reads an unsigned LEB128/VLQ encoded u64 from the byte-aligned
    /// position.
    pub fn get_vlq_int(&mut self) -> Option<u64> {
        let mut v: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.get_aligned(1)? as u8;
            v |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Some(v);
            }
        }
        None
    }

    /// Skips `num_values` values of width `num_bits`; returns the number
    /// actually skipped.
    pub fn skip(&mut self, num_values: usize, num_bits: usize) -> usize {
        let remaining = (self.data.len() * 8).saturating_sub(self.bit_offset) / num_bits.max(1);
        let to_skip = remaining.min(num_values);
        self.bit_offset += to_skip * num_bits;
        to_skip
    }
}

/// Reads values of arbitrary bit width most-significant-bit first, the
/// layout of the deprecated Parquet BIT_PACKED level encoding. Everything
/// else in the format packs LSB first and uses [`BitReader`].
#[derive(Debug, Default, Clone)]
pub struct MsbBitReader {
    data: Bytes,
    bit_offset: usize,
}

impl MsbBitReader {
    pub fn new(data: Bytes) -> Self {
        Self { data, bit_offset: 0 }
    }

    /// Reads a `num_bits` wide value, or `None` on stream underflow.
    pub fn get_value<T: FromU64>(&mut self, num_bits: usize) -> Option<T> {
        debug_assert!(num_bits <= 64);
        let end = self.bit_offset.checked_add(num_bits)?;
        if end > self.data.len() * 8 {
            return None;
        }
        let mut v: u64 = 0;
        for i in 0..num_bits {
            let bit = self.bit_offset + i;
            let byte = self.data[bit / 8];
            v = (v << 1) | (((byte >> (7 - bit % 8)) & 1) as u64);
        }
        self.bit_offset = end;
        Some(T::from_u64(v))
    }

    /// Reads up to `batch.len()` values of width `num_bits`, returning the
    /// number actually read before the stream ran out.
    pub fn get_batch<T: FromU64>(&mut self, batch: &mut [T], num_bits: usize) -> usize {
        for (i, out) in batch.iter_mut().enumerate() {
            match self.get_value(num_bits) {
                Some(v) => *out = v,
                None => return i,
            }
        }
        batch.len()
    }
}
