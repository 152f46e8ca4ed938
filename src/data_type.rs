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

//! Slot value types and their PLAIN decoding.
//!
//! Each type implements [`ParquetValue`]: decoding one value from the PLAIN
//! (or FIXED_LEN) encoded byte stream of a data page, and writing itself
//! into a fixed-width tuple slot. Variable-length payloads are copied into
//! the batch's [`MemPool`] and the slot stores a stable pool reference.

use bytes::Bytes;

use crate::errors::{Result, ScanError};
use crate::memory::{MemPool, PoolRef};

/// Byte width of a pool-backed string slot: chunk id + offset + length.
pub const STRING_SLOT_SIZE: usize = 12;

/// Byte width of a timestamp slot: nanos of day + Julian day.
pub const TIMESTAMP_SLOT_SIZE: usize = 12;

fn underflow(what: &str) -> ScanError {
    ScanError::CorruptPlainValue(format!("{what} ran past the end of the page"))
}

/// Type-specific rewrite applied between decoding a value and writing its
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conversion {
    #[default]
    None,
    /// CHAR(n): right-pad with ASCII spaces to n bytes, truncating longer
    /// values. The slot is a fixed n-byte inline slot.
    PadChar(usize),
    /// Legacy Hive timestamps: the stored value is UTC, shift it to local
    /// time.
    LocalizeUtc,
}

/// A value decodable from the PLAIN encoding and writable into a tuple slot.
pub trait ParquetValue: Clone + Default {
    /// Decodes one value starting at `data[offset..]`, returning the value
    /// and the number of bytes consumed. `fixed_len_size` is the declared
    /// byte length for FIXED_LEN_BYTE_ARRAY values and ignored otherwise.
    fn decode(data: &Bytes, offset: usize, fixed_len_size: i32) -> Result<(Self, usize)>;

    /// Byte width of this value's tuple slot.
    fn slot_byte_size(fixed_len_size: i32) -> usize;

    /// Writes the value into `slot` (exactly `slot_byte_size` bytes),
    /// copying any variable-length payload into `pool`.
    fn write_slot(&self, slot: &mut [u8], pool: &mut MemPool) -> Result<()>;

    /// Writes the value after applying `conversion`. Only the types a
    /// conversion exists for override this.
    fn write_converted(
        &self,
        conversion: Conversion,
        slot: &mut [u8],
        pool: &mut MemPool,
    ) -> Result<()> {
        match conversion {
            Conversion::None => self.write_slot(slot, pool),
            other => Err(general_err!("conversion {:?} is not defined for this type", other)),
        }
    }
}

macro_rules! fixed_width_value {
    ($t:ty, $width:expr, $what:expr) => {
        impl ParquetValue for $t {
            fn decode(data: &Bytes, offset: usize, _fixed_len_size: i32) -> Result<(Self, usize)> {
                let bytes = data
                    .get(offset..offset + $width)
                    .ok_or_else(|| underflow($what))?;
                Ok((<$t>::from_le_bytes(bytes.try_into().unwrap()), $width))
            }

            fn slot_byte_size(_fixed_len_size: i32) -> usize {
                $width
            }

            fn write_slot(&self, slot: &mut [u8], _pool: &mut MemPool) -> Result<()> {
                slot.copy_from_slice(&self.to_le_bytes());
                Ok(())
            }
        }
    };
}

fixed_width_value!(i32, 4, "INT32 value");
fixed_width_value!(i64, 8, "INT64 value");
fixed_width_value!(f32, 4, "FLOAT value");
fixed_width_value!(f64, 8, "DOUBLE value");

/// TINYINT values are stored widened to INT32 physical; decoding truncates.
impl ParquetValue for i8 {
    fn decode(data: &Bytes, offset: usize, fixed_len_size: i32) -> Result<(Self, usize)> {
        let (v, n) = i32::decode(data, offset, fixed_len_size)?;
        Ok((v as i8, n))
    }

    fn slot_byte_size(_fixed_len_size: i32) -> usize {
        1
    }

    fn write_slot(&self, slot: &mut [u8], _pool: &mut MemPool) -> Result<()> {
        slot.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

/// SMALLINT values are stored widened to INT32 physical; decoding truncates.
impl ParquetValue for i16 {
    fn decode(data: &Bytes, offset: usize, fixed_len_size: i32) -> Result<(Self, usize)> {
        let (v, n) = i32::decode(data, offset, fixed_len_size)?;
        Ok((v as i16, n))
    }

    fn slot_byte_size(_fixed_len_size: i32) -> usize {
        2
    }

    fn write_slot(&self, slot: &mut [u8], _pool: &mut MemPool) -> Result<()> {
        slot.copy_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

/// An INT96 timestamp: nanoseconds within the day plus a Julian day number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampValue {
    pub nanos_of_day: i64,
    pub julian_day: i32,
}

impl TimestampValue {
    const JULIAN_UNIX_EPOCH: i64 = 2_440_588;
    const NANOS_PER_DAY: i64 = 86_400 * 1_000_000_000;

    /// Seconds and subsecond nanos since the Unix epoch.
    pub fn to_unix(&self) -> (i64, u32) {
        let days = self.julian_day as i64 - Self::JULIAN_UNIX_EPOCH;
        let secs = days * 86_400 + self.nanos_of_day.div_euclid(1_000_000_000);
        (secs, self.nanos_of_day.rem_euclid(1_000_000_000) as u32)
    }

    /// Shifts the wall-clock value by `offset_secs`.
    pub fn shift_secs(&self, offset_secs: i64) -> TimestampValue {
        let total = self.nanos_of_day + offset_secs * 1_000_000_000;
        TimestampValue {
            nanos_of_day: total.rem_euclid(Self::NANOS_PER_DAY),
            julian_day: (self.julian_day as i64 + total.div_euclid(Self::NANOS_PER_DAY)) as i32,
        }
    }
}

impl ParquetValue for TimestampValue {
    fn decode(data: &Bytes, offset: usize, _fixed_len_size: i32) -> Result<(Self, usize)> {
        let bytes = data
            .get(offset..offset + 12)
            .ok_or_else(|| underflow("INT96 timestamp"))?;
        Ok((
            TimestampValue {
                nanos_of_day: i64::from_le_bytes(bytes[..8].try_into().unwrap()),
                julian_day: i32::from_le_bytes(bytes[8..].try_into().unwrap()),
            },
            12,
        ))
    }

    fn slot_byte_size(_fixed_len_size: i32) -> usize {
        TIMESTAMP_SLOT_SIZE
    }

    fn write_slot(&self, slot: &mut [u8], _pool: &mut MemPool) -> Result<()> {
        slot[..8].copy_from_slice(&self.nanos_of_day.to_le_bytes());
        slot[8..].copy_from_slice(&self.julian_day.to_le_bytes());
        Ok(())
    }

    fn write_converted(
        &self,
        conversion: Conversion,
        slot: &mut [u8],
        pool: &mut MemPool,
    ) -> Result<()> {
        match conversion {
            Conversion::None => self.write_slot(slot, pool),
            Conversion::LocalizeUtc => {
                use chrono::{Local, Offset, TimeZone};
                let (secs, nanos) = self.to_unix();
                let shifted = match chrono::DateTime::from_timestamp(secs, nanos) {
                    Some(utc) => {
                        let offset = Local
                            .offset_from_utc_datetime(&utc.naive_utc())
                            .fix()
                            .local_minus_utc() as i64;
                        self.shift_secs(offset)
                    }
                    None => *self,
                };
                shifted.write_slot(slot, pool)
            }
            other => Err(general_err!(
                "conversion {:?} is not defined for timestamps",
                other
            )),
        }
    }
}

/// A BYTE_ARRAY value: a zero-copy view into the page buffer. The backing
/// buffer is refcounted, so the view stays valid after the page reader moves
/// on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArray {
    data: Bytes,
}

impl ByteArray {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for ByteArray {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl From<&str> for ByteArray {
    fn from(s: &str) -> Self {
        Self {
            data: Bytes::copy_from_slice(s.as_bytes()),
        }
    }
}

/// Encodes a pool reference plus length into a string slot.
pub fn write_string_slot(slot: &mut [u8], r: PoolRef, len: usize) {
    slot[..4].copy_from_slice(&r.chunk.to_le_bytes());
    slot[4..8].copy_from_slice(&r.offset.to_le_bytes());
    slot[8..12].copy_from_slice(&(len as u32).to_le_bytes());
}

/// Decodes a string slot back into a pool reference and length.
pub fn read_string_slot(slot: &[u8]) -> (PoolRef, usize) {
    let chunk = u32::from_le_bytes(slot[..4].try_into().unwrap());
    let offset = u32::from_le_bytes(slot[4..8].try_into().unwrap());
    let len = u32::from_le_bytes(slot[8..12].try_into().unwrap());
    (PoolRef { chunk, offset }, len as usize)
}

impl ParquetValue for ByteArray {
    fn decode(data: &Bytes, offset: usize, _fixed_len_size: i32) -> Result<(Self, usize)> {
        let len_bytes = data
            .get(offset..offset + 4)
            .ok_or_else(|| underflow("BYTE_ARRAY length"))?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        if offset + 4 + len > data.len() {
            return Err(underflow("BYTE_ARRAY value"));
        }
        Ok((
            ByteArray {
                data: data.slice(offset + 4..offset + 4 + len),
            },
            4 + len,
        ))
    }

    fn slot_byte_size(_fixed_len_size: i32) -> usize {
        STRING_SLOT_SIZE
    }

    fn write_slot(&self, slot: &mut [u8], pool: &mut MemPool) -> Result<()> {
        let r = pool.allocate(&self.data)?;
        write_string_slot(slot, r, self.data.len());
        Ok(())
    }

    fn write_converted(
        &self,
        conversion: Conversion,
        slot: &mut [u8],
        pool: &mut MemPool,
    ) -> Result<()> {
        match conversion {
            Conversion::None => self.write_slot(slot, pool),
            Conversion::PadChar(len) => {
                debug_assert_eq!(slot.len(), len);
                let unpadded = len.min(self.data.len());
                slot[..unpadded].copy_from_slice(&self.data[..unpadded]);
                slot[unpadded..].fill(b' ');
                Ok(())
            }
            other => Err(general_err!("conversion {:?} is not defined for strings", other)),
        }
    }
}

macro_rules! decimal_value {
    ($name:ident, $int:ty, $width:expr) => {
        /// Decimal stored as big-endian two's-complement unscaled bytes.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub $int);

        impl ParquetValue for $name {
            fn decode(data: &Bytes, offset: usize, fixed_len_size: i32) -> Result<(Self, usize)> {
                let len = fixed_len_size as usize;
                debug_assert!(len <= $width);
                let bytes = data
                    .get(offset..offset + len)
                    .ok_or_else(|| underflow("decimal value"))?;
                let mut v: $int = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
                    -1
                } else {
                    0
                };
                for &b in bytes {
                    v = (v << 8) | (b as $int & 0xFF);
                }
                Ok(($name(v), len))
            }

            fn slot_byte_size(_fixed_len_size: i32) -> usize {
                $width
            }

            fn write_slot(&self, slot: &mut [u8], _pool: &mut MemPool) -> Result<()> {
                slot.copy_from_slice(&self.0.to_le_bytes());
                Ok(())
            }
        }
    };
}

decimal_value!(Decimal32, i32, 4);
decimal_value!(Decimal64, i64, 8);
decimal_value!(Decimal128, i128, 16);

/// Byte width of the FIXED_LEN_BYTE_ARRAY holding a decimal of the given
/// precision: the smallest length whose two's-complement range covers
/// `10^precision - 1`.
pub fn decimal_size(precision: i32) -> i32 {
    debug_assert!(precision > 0 && precision <= 38);
    // ceil((log2(10) * precision + 1) / 8)
    ((10f64.log2() * precision as f64 + 1.0) / 8.0).ceil() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_decode() {
        let data = Bytes::copy_from_slice(&(-42i32).to_le_bytes());
        let (v, n) = i32::decode(&data, 0, -1).unwrap();
        assert_eq!((v, n), (-42, 4));
        let (v, _) = i8::decode(&data, 0, -1).unwrap();
        assert_eq!(v, -42i8);
    }

    #[test]
    fn test_decode_underflow() {
        let data = Bytes::from_static(&[1, 2]);
        assert!(matches!(
            i32::decode(&data, 0, -1),
            Err(ScanError::CorruptPlainValue(_))
        ));
    }

    #[test]
    fn test_byte_array_decode_is_view() {
        let mut raw = 5u32.to_le_bytes().to_vec();
        raw.extend_from_slice(b"hello more");
        let data = Bytes::from(raw);
        let (v, n) = ByteArray::decode(&data, 0, -1).unwrap();
        assert_eq!(n, 9);
        assert_eq!(v.as_bytes(), b"hello");
    }

    #[test]
    fn test_byte_array_length_underflow() {
        let data = Bytes::copy_from_slice(&100u32.to_le_bytes());
        assert!(ByteArray::decode(&data, 0, -1).is_err());
    }

    #[test]
    fn test_decimal_sign_extension() {
        // -1 encoded in 2 big-endian bytes.
        let data = Bytes::from_static(&[0xFF, 0xFF]);
        let (v, n) = Decimal64::decode(&data, 0, 2).unwrap();
        assert_eq!((v.0, n), (-1, 2));

        let data = Bytes::from_static(&[0x01, 0x00]);
        let (v, _) = Decimal64::decode(&data, 0, 2).unwrap();
        assert_eq!(v.0, 256);
    }

    #[test]
    fn test_decimal_size() {
        assert_eq!(decimal_size(1), 1);
        assert_eq!(decimal_size(2), 1);
        assert_eq!(decimal_size(9), 4);
        assert_eq!(decimal_size(18), 8);
        assert_eq!(decimal_size(38), 16);
    }

    #[test]
    fn test_timestamp_shift() {
        let ts = TimestampValue {
            nanos_of_day: 3_600_000_000_000,
            julian_day: 2_440_588,
        };
        let shifted = ts.shift_secs(-7200);
        assert_eq!(shifted.julian_day, 2_440_587);
        assert_eq!(shifted.nanos_of_day, 23 * 3_600_000_000_000);
    }

    #[test]
    fn test_char_padding() {
        use crate::memory::MemTracker;
        use std::sync::Arc;
        let mut pool = MemPool::new(Arc::new(MemTracker::new_root("test")));

        let mut slot = [0u8; 5];
        ByteArray::from("ab")
            .write_converted(Conversion::PadChar(5), &mut slot, &mut pool)
            .unwrap();
        assert_eq!(&slot, b"ab   ");

        ByteArray::from("abcdef")
            .write_converted(Conversion::PadChar(5), &mut slot, &mut pool)
            .unwrap();
        assert_eq!(&slot, b"abcde");
    }

    #[test]
    fn test_string_slot_round_trip() {
        let mut slot = [0u8; STRING_SLOT_SIZE];
        let r = PoolRef {
            chunk: 7,
            offset: 1234,
        };
        write_string_slot(&mut slot, r, 99);
        assert_eq!(read_string_slot(&slot), (r, 99));
    }
}
