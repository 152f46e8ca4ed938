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

//! Common scanner errors and macros.

use std::error::Error;
use std::{io, result, str};

/// Scanner error enumeration.
///
/// Decoder-level failures (`CorruptPlainValue`, `DictDecodeFailure`, ...) are
/// captured in the scanner's `parse_status` without unwinding the inner
/// loops; the assembler checks `parse_status` at loop exits and either
/// propagates or logs depending on `abort_on_error`.
#[derive(Debug)]
pub enum ScanError {
    /// General error, returned when code violates the normal workflow of
    /// reading Parquet files.
    General(String),
    /// IO-related failure, e.g. when there are not enough bytes to decode.
    Eof(String),

    // Footer / magic problems; fatal to this file.
    /// File is too short to be a Parquet file.
    FileTooShort(String),
    /// Trailing magic number mismatch.
    BadMagic(String),
    /// The catalog's file length is larger than the bytes the storage layer
    /// could supply.
    StaleMetadataFileTooShort(String),

    // Feature gaps; fatal.
    /// File metadata version above the supported Parquet version.
    UnsupportedVersion(String),
    /// Column uses an encoding outside PLAIN / PLAIN_DICTIONARY / RLE /
    /// BIT_PACKED.
    UnsupportedEncoding(String),
    /// Column uses a codec outside UNCOMPRESSED / SNAPPY / GZIP.
    UnsupportedCompression(String),

    // Metadata/data consistency; fatal for the file.
    /// Column metadata disagrees with the data pages (e.g. more or fewer
    /// values than `column.num_values`).
    ColumnMetadataInvalid(String),
    /// Rows read from a row group disagree with `row_group.num_rows`.
    GroupRowCountError(String),
    /// Column chunks of one row group declare differing `num_values`.
    NumColValsError(String),
    /// Page header could not be deserialized before the stream ended.
    HeaderEof(String),

    // Decode failures; captured in `parse_status`.
    /// PLAIN-encoded value ran off the end of the page.
    CorruptPlainValue(String),
    /// Dictionary index stream underflowed or indexed out of range.
    DictDecodeFailure(String),
    /// Dictionary page malformed (bad header, wrong entry count, ...).
    CorruptDictionary(String),
    /// RLE length prefix negative or past the page end.
    CorruptRleBytes(String),
    /// Definition level above the column's maximum, or level bitstream
    /// underflow.
    DefLevelError(String),
    /// Repetition level above the column's maximum, or level bitstream
    /// underflow.
    RepLevelError(String),
    /// Bit-packed boolean stream underflowed.
    InvalidBool(String),

    // Schema-resolution failures.
    /// File schema does not match any recognized array/map encoding for the
    /// requested path.
    UnrecognizedSchema(String),
    /// Schema element carries an unexpected converted type.
    BadConvertedType(String),
    /// Decimal metadata present on a non-decimal column (or vice versa).
    IncompatibleDecimal(String),
    /// Decimal precision in the file disagrees with the table.
    WrongPrecision(String),
    /// Decimal precision missing from the file schema.
    MissingPrecision(String),

    /// Memory limit exceeded; always fatal.
    MemLimitExceeded(String),

    // Control flow; not errors.
    /// The query was cancelled.
    Cancelled,
    /// The scan node's row limit was reached.
    LimitReached,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ScanError::General(message) => write!(fmt, "Parquet scan error: {message}"),
            ScanError::Eof(message) => write!(fmt, "EOF: {message}"),
            ScanError::FileTooShort(message) => write!(fmt, "File too short: {message}"),
            ScanError::BadMagic(message) => write!(fmt, "Bad magic number: {message}"),
            ScanError::StaleMetadataFileTooShort(message) => {
                write!(fmt, "Stale metadata, file too short: {message}")
            }
            ScanError::UnsupportedVersion(message) => {
                write!(fmt, "Unsupported file version: {message}")
            }
            ScanError::UnsupportedEncoding(message) => {
                write!(fmt, "Unsupported encoding: {message}")
            }
            ScanError::UnsupportedCompression(message) => {
                write!(fmt, "Unsupported compression: {message}")
            }
            ScanError::ColumnMetadataInvalid(message) => {
                write!(fmt, "Invalid column metadata: {message}")
            }
            ScanError::GroupRowCountError(message) => {
                write!(fmt, "Row group row count mismatch: {message}")
            }
            ScanError::NumColValsError(message) => {
                write!(fmt, "Column value count mismatch: {message}")
            }
            ScanError::HeaderEof(message) => write!(fmt, "Page header EOF: {message}"),
            ScanError::CorruptPlainValue(message) => {
                write!(fmt, "Corrupt PLAIN value: {message}")
            }
            ScanError::DictDecodeFailure(message) => {
                write!(fmt, "Dictionary decode failure: {message}")
            }
            ScanError::CorruptDictionary(message) => {
                write!(fmt, "Corrupt dictionary: {message}")
            }
            ScanError::CorruptRleBytes(message) => write!(fmt, "Corrupt RLE bytes: {message}"),
            ScanError::DefLevelError(message) => {
                write!(fmt, "Definition level error: {message}")
            }
            ScanError::RepLevelError(message) => {
                write!(fmt, "Repetition level error: {message}")
            }
            ScanError::InvalidBool(message) => write!(fmt, "Invalid bool column: {message}"),
            ScanError::UnrecognizedSchema(message) => {
                write!(fmt, "Unrecognized schema: {message}")
            }
            ScanError::BadConvertedType(message) => {
                write!(fmt, "Bad converted type: {message}")
            }
            ScanError::IncompatibleDecimal(message) => {
                write!(fmt, "Incompatible decimal metadata: {message}")
            }
            ScanError::WrongPrecision(message) => write!(fmt, "Wrong precision: {message}"),
            ScanError::MissingPrecision(message) => {
                write!(fmt, "Missing precision: {message}")
            }
            ScanError::MemLimitExceeded(message) => {
                write!(fmt, "Memory limit exceeded: {message}")
            }
            ScanError::Cancelled => write!(fmt, "Cancelled"),
            ScanError::LimitReached => write!(fmt, "Limit reached"),
        }
    }
}

impl Error for ScanError {}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> ScanError {
        ScanError::Eof(e.to_string())
    }
}

impl From<snap::Error> for ScanError {
    fn from(e: snap::Error) -> ScanError {
        ScanError::General(format!("snappy: {e}"))
    }
}

impl From<str::Utf8Error> for ScanError {
    fn from(e: str::Utf8Error) -> ScanError {
        ScanError::General(format!("invalid utf8: {e}"))
    }
}

impl ScanError {
    /// True for control-flow outcomes that must never be reported as scan
    /// failures.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, ScanError::Cancelled | ScanError::LimitReached)
    }
}

/// A specialized `Result` for scanner errors.
pub type Result<T, E = ScanError> = result::Result<T, E>;

// ----------------------------------------------------------------------
// Convenient macros for different errors

macro_rules! general_err {
    ($fmt:expr) => (crate::errors::ScanError::General($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (crate::errors::ScanError::General(format!($fmt, $($args),*)));
}

macro_rules! eof_err {
    ($fmt:expr) => (crate::errors::ScanError::Eof($fmt.to_owned()));
    ($fmt:expr, $($args:expr),*) => (crate::errors::ScanError::Eof(format!($fmt, $($args),*)));
}
