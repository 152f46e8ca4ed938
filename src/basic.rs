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

//! Rust mappings for the enums of the Parquet Thrift definition. Thrift
//! structs are handled in [`crate::format`]. Refer to the
//! [`parquet.thrift`](https://github.com/apache/parquet-format/blob/master/src/main/thrift/parquet.thrift)
//! file to see raw definitions.

use std::fmt;

use crate::errors::{Result, ScanError};

// ----------------------------------------------------------------------
// Mirrors thrift enum `Type`

/// Physical types supported by Parquet.
///
/// These types are intended to be used in combination with the encodings to
/// control the on-disk storage format. For example INT16 is not included as
/// a type since a good encoding of INT32 would handle this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Type {
    BOOLEAN,
    INT32,
    INT64,
    /// Deprecated, only used by legacy writers for timestamps.
    INT96,
    FLOAT,
    DOUBLE,
    BYTE_ARRAY,
    FIXED_LEN_BYTE_ARRAY,
}

impl TryFrom<i32> for Type {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::BOOLEAN,
            1 => Self::INT32,
            2 => Self::INT64,
            3 => Self::INT96,
            4 => Self::FLOAT,
            5 => Self::DOUBLE,
            6 => Self::BYTE_ARRAY,
            7 => Self::FIXED_LEN_BYTE_ARRAY,
            _ => return Err(general_err!("unexpected physical type {}", val)),
        })
    }
}

impl From<Type> for i32 {
    fn from(t: Type) -> i32 {
        match t {
            Type::BOOLEAN => 0,
            Type::INT32 => 1,
            Type::INT64 => 2,
            Type::INT96 => 3,
            Type::FLOAT => 4,
            Type::DOUBLE => 5,
            Type::BYTE_ARRAY => 6,
            Type::FIXED_LEN_BYTE_ARRAY => 7,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::BOOLEAN => write!(f, "boolean"),
            Type::INT32 => write!(f, "int32"),
            Type::INT64 => write!(f, "int64"),
            Type::INT96 => write!(f, "int96"),
            Type::FLOAT => write!(f, "float"),
            Type::DOUBLE => write!(f, "double"),
            Type::BYTE_ARRAY => write!(f, "byte_array"),
            Type::FIXED_LEN_BYTE_ARRAY => write!(f, "fixed_len_byte_array"),
        }
    }
}

// ----------------------------------------------------------------------
// Mirrors thrift enum `ConvertedType`

/// Common types (converted types) used by frameworks on top of the physical
/// types. This is only metadata; apart from `DECIMAL` it is not needed to
/// read the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ConvertedType {
    UTF8,
    MAP,
    MAP_KEY_VALUE,
    LIST,
    ENUM,
    /// A decimal value stored as big-endian two's-complement unscaled bytes,
    /// accompanied by a precision and scale in the schema element.
    DECIMAL,
    DATE,
    TIME_MILLIS,
    TIME_MICROS,
    TIMESTAMP_MILLIS,
    TIMESTAMP_MICROS,
    UINT_8,
    UINT_16,
    UINT_32,
    UINT_64,
    INT_8,
    INT_16,
    INT_32,
    INT_64,
    JSON,
    BSON,
    INTERVAL,
}

impl TryFrom<i32> for ConvertedType {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::UTF8,
            1 => Self::MAP,
            2 => Self::MAP_KEY_VALUE,
            3 => Self::LIST,
            4 => Self::ENUM,
            5 => Self::DECIMAL,
            6 => Self::DATE,
            7 => Self::TIME_MILLIS,
            8 => Self::TIME_MICROS,
            9 => Self::TIMESTAMP_MILLIS,
            10 => Self::TIMESTAMP_MICROS,
            11 => Self::UINT_8,
            12 => Self::UINT_16,
            13 => Self::UINT_32,
            14 => Self::UINT_64,
            15 => Self::INT_8,
            16 => Self::INT_16,
            17 => Self::INT_32,
            18 => Self::INT_64,
            19 => Self::JSON,
            20 => Self::BSON,
            21 => Self::INTERVAL,
            _ => return Err(general_err!("unexpected converted type {}", val)),
        })
    }
}

impl From<ConvertedType> for i32 {
    fn from(t: ConvertedType) -> i32 {
        match t {
            ConvertedType::UTF8 => 0,
            ConvertedType::MAP => 1,
            ConvertedType::MAP_KEY_VALUE => 2,
            ConvertedType::LIST => 3,
            ConvertedType::ENUM => 4,
            ConvertedType::DECIMAL => 5,
            ConvertedType::DATE => 6,
            ConvertedType::TIME_MILLIS => 7,
            ConvertedType::TIME_MICROS => 8,
            ConvertedType::TIMESTAMP_MILLIS => 9,
            ConvertedType::TIMESTAMP_MICROS => 10,
            ConvertedType::UINT_8 => 11,
            ConvertedType::UINT_16 => 12,
            ConvertedType::UINT_32 => 13,
            ConvertedType::UINT_64 => 14,
            ConvertedType::INT_8 => 15,
            ConvertedType::INT_16 => 16,
            ConvertedType::INT_32 => 17,
            ConvertedType::INT_64 => 18,
            ConvertedType::JSON => 19,
            ConvertedType::BSON => 20,
            ConvertedType::INTERVAL => 21,
        }
    }
}

// ----------------------------------------------------------------------
// Mirrors thrift enum `FieldRepetitionType`

/// Representation of field repetition in schema elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Repetition {
    /// Field is required (can not be null) and each record has exactly one
    /// value.
    REQUIRED,
    /// Field is optional (can be null) and each record has zero or one
    /// values.
    OPTIONAL,
    /// Field is repeated and can contain zero or more values.
    REPEATED,
}

impl TryFrom<i32> for Repetition {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::REQUIRED,
            1 => Self::OPTIONAL,
            2 => Self::REPEATED,
            _ => return Err(general_err!("unexpected repetition type {}", val)),
        })
    }
}

impl From<Repetition> for i32 {
    fn from(t: Repetition) -> i32 {
        match t {
            Repetition::REQUIRED => 0,
            Repetition::OPTIONAL => 1,
            Repetition::REPEATED => 2,
        }
    }
}

impl fmt::Display for Repetition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repetition::REQUIRED => write!(f, "required"),
            Repetition::OPTIONAL => write!(f, "optional"),
            Repetition::REPEATED => write!(f, "repeated"),
        }
    }
}

// ----------------------------------------------------------------------
// Mirrors thrift enum `Encoding`

/// Encodings supported by Parquet. Not all encodings are valid for all
/// types; this scanner decodes PLAIN, PLAIN_DICTIONARY, RLE and BIT_PACKED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Encoding {
    PLAIN,
    /// Deprecated dictionary encoding: the dictionary page is PLAIN encoded,
    /// the data page holds RLE-encoded dictionary indices with a one-byte
    /// bit-width prefix.
    PLAIN_DICTIONARY,
    /// Group-packed run length / bit-packed hybrid, used for definition and
    /// repetition levels.
    RLE,
    /// Deprecated bit-packed encoding for levels, MSB first.
    BIT_PACKED,
    DELTA_BINARY_PACKED,
    DELTA_LENGTH_BYTE_ARRAY,
    DELTA_BYTE_ARRAY,
    RLE_DICTIONARY,
    BYTE_STREAM_SPLIT,
}

impl TryFrom<i32> for Encoding {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::PLAIN,
            2 => Self::PLAIN_DICTIONARY,
            3 => Self::RLE,
            4 => Self::BIT_PACKED,
            5 => Self::DELTA_BINARY_PACKED,
            6 => Self::DELTA_LENGTH_BYTE_ARRAY,
            7 => Self::DELTA_BYTE_ARRAY,
            8 => Self::RLE_DICTIONARY,
            9 => Self::BYTE_STREAM_SPLIT,
            _ => return Err(general_err!("unexpected encoding {}", val)),
        })
    }
}

impl From<Encoding> for i32 {
    fn from(e: Encoding) -> i32 {
        match e {
            Encoding::PLAIN => 0,
            Encoding::PLAIN_DICTIONARY => 2,
            Encoding::RLE => 3,
            Encoding::BIT_PACKED => 4,
            Encoding::DELTA_BINARY_PACKED => 5,
            Encoding::DELTA_LENGTH_BYTE_ARRAY => 6,
            Encoding::DELTA_BYTE_ARRAY => 7,
            Encoding::RLE_DICTIONARY => 8,
            Encoding::BYTE_STREAM_SPLIT => 9,
        }
    }
}

impl Encoding {
    /// Whether this scanner can decode columns carrying this encoding.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Encoding::PLAIN | Encoding::PLAIN_DICTIONARY | Encoding::RLE | Encoding::BIT_PACKED
        )
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Encoding::PLAIN => write!(f, "PLAIN"),
            Encoding::PLAIN_DICTIONARY => write!(f, "PLAIN_DICTIONARY"),
            Encoding::RLE => write!(f, "RLE"),
            Encoding::BIT_PACKED => write!(f, "BIT_PACKED"),
            Encoding::DELTA_BINARY_PACKED => write!(f, "DELTA_BINARY_PACKED"),
            Encoding::DELTA_LENGTH_BYTE_ARRAY => write!(f, "DELTA_LENGTH_BYTE_ARRAY"),
            Encoding::DELTA_BYTE_ARRAY => write!(f, "DELTA_BYTE_ARRAY"),
            Encoding::RLE_DICTIONARY => write!(f, "RLE_DICTIONARY"),
            Encoding::BYTE_STREAM_SPLIT => write!(f, "BYTE_STREAM_SPLIT"),
        }
    }
}

// ----------------------------------------------------------------------
// Mirrors thrift enum `CompressionCodec`

/// Supported block compression codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Compression {
    UNCOMPRESSED,
    SNAPPY,
    GZIP,
    LZO,
    BROTLI,
    LZ4,
    ZSTD,
}

impl TryFrom<i32> for Compression {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::UNCOMPRESSED,
            1 => Self::SNAPPY,
            2 => Self::GZIP,
            3 => Self::LZO,
            4 => Self::BROTLI,
            5 => Self::LZ4,
            6 => Self::ZSTD,
            _ => return Err(general_err!("unexpected compression codec {}", val)),
        })
    }
}

impl From<Compression> for i32 {
    fn from(c: Compression) -> i32 {
        match c {
            Compression::UNCOMPRESSED => 0,
            Compression::SNAPPY => 1,
            Compression::GZIP => 2,
            Compression::LZO => 3,
            Compression::BROTLI => 4,
            Compression::LZ4 => 5,
            Compression::ZSTD => 6,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Compression::UNCOMPRESSED => write!(f, "UNCOMPRESSED"),
            Compression::SNAPPY => write!(f, "SNAPPY"),
            Compression::GZIP => write!(f, "GZIP"),
            Compression::LZO => write!(f, "LZO"),
            Compression::BROTLI => write!(f, "BROTLI"),
            Compression::LZ4 => write!(f, "LZ4"),
            Compression::ZSTD => write!(f, "ZSTD"),
        }
    }
}

// ----------------------------------------------------------------------
// Mirrors thrift enum `PageType`

/// Types of pages found in column chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum PageType {
    DATA_PAGE,
    INDEX_PAGE,
    DICTIONARY_PAGE,
    DATA_PAGE_V2,
}

impl TryFrom<i32> for PageType {
    type Error = ScanError;
    fn try_from(val: i32) -> Result<Self> {
        Ok(match val {
            0 => Self::DATA_PAGE,
            1 => Self::INDEX_PAGE,
            2 => Self::DICTIONARY_PAGE,
            3 => Self::DATA_PAGE_V2,
            _ => return Err(general_err!("unexpected page type {}", val)),
        })
    }
}

impl From<PageType> for i32 {
    fn from(t: PageType) -> i32 {
        match t {
            PageType::DATA_PAGE => 0,
            PageType::INDEX_PAGE => 1,
            PageType::DICTIONARY_PAGE => 2,
            PageType::DATA_PAGE_V2 => 3,
        }
    }
}
