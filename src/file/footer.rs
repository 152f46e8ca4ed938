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

//! Locating and decoding the file footer, and selecting the row groups a
//! split is responsible for.

use bytes::Bytes;

use crate::errors::{Result, ScanError};
use crate::format::{ColumnMetaData, FileMetaData, RowGroup};
use crate::scan::io::{ByteStream, IoManager};
use crate::thrift::ThriftSliceInputProtocol;

use super::{FOOTER_SIZE, PARQUET_CURRENT_VERSION, PARQUET_MAGIC};

/// Decodes the file metadata from the footer range.
///
/// The planner issues a footer range spanning the last
/// [`FOOTER_RANGE_SIZE`](super::FOOTER_RANGE_SIZE) bytes of the file
/// (clamped to the file length). When the metadata turns out to be larger
/// than that range, a second synchronous read fetches the full metadata.
pub fn process_footer(
    stream: &mut dyn ByteStream,
    io: &dyn IoManager,
    filename: &str,
    file_len: u64,
) -> Result<FileMetaData> {
    if file_len < 12 {
        return Err(ScanError::FileTooShort(format!(
            "file '{}' has an invalid file length: {}",
            filename, file_len
        )));
    }

    // Read the whole advertised range; coming up short means the catalog's
    // file length is ahead of what storage actually holds.
    let range_len = stream.scan_range().len as usize;
    let buffer = match stream.read_bytes(range_len) {
        Ok(buffer) => buffer,
        Err(_) => {
            // The stream could not supply the advertised range: the
            // catalog's file metadata is stale.
            return Err(ScanError::StaleMetadataFileTooShort(format!(
                "metadata for file '{}' states a file size of {} bytes but the storage layer returned fewer",
                filename, file_len
            )));
        }
    };
    if buffer.len() < FOOTER_SIZE {
        return Err(ScanError::FileTooShort(format!(
            "file '{}' is invalid: missing metadata",
            filename
        )));
    }

    let magic = &buffer[buffer.len() - PARQUET_MAGIC.len()..];
    if magic != PARQUET_MAGIC {
        return Err(ScanError::BadMagic(format!(
            "file '{}' is invalid: magic bytes are {:?}",
            filename, magic
        )));
    }

    // The metadata size is a 4-byte little-endian value immediately before
    // the magic.
    let metadata_size =
        u32::from_le_bytes(buffer[buffer.len() - 8..buffer.len() - 4].try_into().unwrap()) as u64;
    let buffered_metadata_len = (buffer.len() - FOOTER_SIZE) as u64;

    let metadata_bytes: Bytes = if metadata_size > buffered_metadata_len {
        // The metadata is bigger than the footer range guess; issue the
        // actual footer read.
        let metadata_start = file_len
            .checked_sub(FOOTER_SIZE as u64 + metadata_size)
            .ok_or_else(|| {
                general_err!(
                    "file '{}' is invalid: metadata size {} bytes exceeds the {} byte file",
                    filename,
                    metadata_size,
                    file_len
                )
            })?;
        io.read_range(filename, metadata_start, metadata_size)?
    } else {
        let metadata_end = buffer.len() - FOOTER_SIZE;
        buffer.slice(metadata_end - metadata_size as usize..metadata_end)
    };

    let mut prot = ThriftSliceInputProtocol::new(&metadata_bytes);
    let metadata = FileMetaData::read_from(&mut prot).map_err(|e| {
        general_err!(
            "file '{}' has invalid file metadata at file offset {}: {}",
            filename,
            file_len - FOOTER_SIZE as u64 - metadata_size,
            e
        )
    })?;

    if metadata.version > PARQUET_CURRENT_VERSION {
        return Err(ScanError::UnsupportedVersion(format!(
            "file '{}' is of an unsupported version: {}",
            filename, metadata.version
        )));
    }
    Ok(metadata)
}

/// Start of a column chunk: the dictionary page when present, else the
/// first data page.
pub fn column_start_offset(column: &ColumnMetaData) -> i64 {
    match column.dictionary_page_offset {
        Some(offset) => {
            debug_assert!(offset < column.data_page_offset);
            offset
        }
        None => column.data_page_offset,
    }
}

/// File offset of the middle of the row group. A row group is processed by
/// the split its mid point falls into; other splits owning other row groups
/// pick up the rest.
pub fn row_group_mid_offset(row_group: &RowGroup) -> i64 {
    let start_offset = column_start_offset(&row_group.columns[0].meta_data);
    let last_column = &row_group.columns[row_group.columns.len() - 1].meta_data;
    let end_offset = column_start_offset(last_column) + last_column.total_compressed_size;
    start_offset + (end_offset - start_offset) / 2
}

/// Validates that every column chunk of the row group lies within the file
/// and that dictionary pages precede data pages.
pub fn validate_column_offsets(
    filename: &str,
    file_len: u64,
    row_group: &RowGroup,
) -> Result<()> {
    for (i, column) in row_group.columns.iter().enumerate() {
        let meta = &column.meta_data;
        let mut col_start = meta.data_page_offset;
        if let Some(dict_offset) = meta.dictionary_page_offset {
            if dict_offset >= col_start {
                return Err(ScanError::ColumnMetadataInvalid(format!(
                    "file '{}': metadata is corrupt. Dictionary page (offset={}) must come before any data pages (offset={})",
                    filename, dict_offset, col_start
                )));
            }
            col_start = dict_offset;
        }
        let col_len = meta.total_compressed_size;
        let col_end = col_start + col_len;
        if col_end <= 0 || col_end as u64 > file_len {
            return Err(ScanError::ColumnMetadataInvalid(format!(
                "file '{}': metadata is corrupt. Column {} has invalid column offsets (offset={}, size={}, file_size={})",
                filename, i, col_start, col_len, file_len
            )));
        }
    }
    Ok(())
}
