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

//! Encoders and synthetic file builders used by the test suites. The
//! production crate only reads Parquet; everything here exists to produce
//! byte-exact inputs for those readers.

use bytes::Bytes;

use crate::basic::{Compression, Encoding, PageType, Repetition, Type};
use crate::compression::create_codec;
use crate::data_type::TimestampValue;
use crate::format::{
    ColumnChunk, ColumnMetaData, DataPageHeader, DictionaryPageHeader, FileMetaData, PageHeader,
    RowGroup, SchemaElement, Statistics,
};
use crate::thrift::ThriftCompactOutputProtocol;
use crate::util::bit_util::{ceil, num_required_bits};

// ----------------------------------------------------------------------
// Bit-level writers

/// Writes values LSB-first at a fixed bit width.
#[derive(Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_pos: usize,
}

impl BitWriter {
    pub fn put_value(&mut self, v: u64, num_bits: usize) {
        for i in 0..num_bits {
            let bit = self.bit_pos + i;
            if bit / 8 == self.buf.len() {
                self.buf.push(0);
            }
            if (v >> i) & 1 == 1 {
                self.buf[bit / 8] |= 1 << (bit % 8);
            }
        }
        self.bit_pos += num_bits;
    }

    pub fn put_aligned(&mut self, v: u64, num_bytes: usize) {
        if self.bit_pos % 8 != 0 {
            self.bit_pos += 8 - self.bit_pos % 8;
        }
        self.buf.resize(self.bit_pos / 8, 0);
        self.buf.extend_from_slice(&v.to_le_bytes()[..num_bytes]);
        self.bit_pos = self.buf.len() * 8;
    }

    pub fn put_vlq(&mut self, mut v: u64) {
        debug_assert_eq!(self.bit_pos % 8, 0);
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
        self.bit_pos = self.buf.len() * 8;
    }

    pub fn consume(self) -> Vec<u8> {
        self.buf
    }
}

/// RLE/bit-packing hybrid encoder. Repeated runs are only emitted when the
/// pending literal group is byte-exact, so padding can only occur at the
/// very end of the stream.
pub struct RleEncoder {
    bit_width: u8,
    values: Vec<u64>,
}

impl RleEncoder {
    pub fn new(bit_width: u8) -> Self {
        Self {
            bit_width,
            values: Vec::new(),
        }
    }

    pub fn put(&mut self, v: u64) {
        self.values.push(v);
    }

    pub fn consume(self) -> Vec<u8> {
        let mut writer = BitWriter::default();
        let mut pending: Vec<u64> = Vec::new();
        let mut i = 0;
        while i < self.values.len() {
            let v = self.values[i];
            let mut run = 1;
            while i + run < self.values.len() && self.values[i + run] == v {
                run += 1;
            }
            if run >= 8 && pending.len() % 8 == 0 {
                Self::flush_literals(&mut writer, &pending, self.bit_width);
                pending.clear();
                writer.put_vlq((run as u64) << 1);
                writer.put_aligned(v, ceil(self.bit_width as usize, 8));
                i += run;
            } else {
                pending.push(v);
                i += 1;
            }
        }
        Self::flush_literals(&mut writer, &pending, self.bit_width);
        writer.consume()
    }

    fn flush_literals(writer: &mut BitWriter, literals: &[u64], bit_width: u8) {
        if literals.is_empty() {
            return;
        }
        let groups = ceil(literals.len(), 8);
        writer.put_vlq(((groups as u64) << 1) | 1);
        for &v in literals {
            writer.put_value(v, bit_width as usize);
        }
        for _ in literals.len()..groups * 8 {
            writer.put_value(0, bit_width as usize);
        }
    }
}

// ----------------------------------------------------------------------
// Level and value encoders

/// RLE level section as it appears in a v1 data page: 4-byte LE length
/// prefix followed by the runs.
pub fn rle_levels(bit_width: u8, levels: &[u8]) -> Bytes {
    let mut encoder = RleEncoder::new(bit_width);
    for &l in levels {
        encoder.put(l as u64);
    }
    let body = encoder.consume();
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&body);
    out.into()
}

/// Deprecated BIT_PACKED level section, packed most significant bit first
/// (unlike everything else in the format, which is LSB first).
pub fn bit_packed_levels(bit_width: u8, levels: &[u8]) -> Bytes {
    let width = bit_width as usize;
    let mut out = vec![0u8; ceil(levels.len() * width, 8)];
    for (i, &level) in levels.iter().enumerate() {
        for b in 0..width {
            if (level >> (width - 1 - b)) & 1 == 1 {
                let bit = i * width + b;
                out[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
    }
    out.into()
}

/// Dict-encoded data page value section: one bit-width byte plus RLE runs of
/// indices.
pub fn rle_dict_indices(bit_width: u8, indices: &[u64]) -> Vec<u8> {
    let mut encoder = RleEncoder::new(bit_width);
    for &idx in indices {
        encoder.put(idx);
    }
    let mut out = vec![bit_width];
    out.extend_from_slice(&encoder.consume());
    out
}

pub fn plain_encode_i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn plain_encode_i64s(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn plain_encode_strings(values: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        out.extend_from_slice(&(v.len() as u32).to_le_bytes());
        out.extend_from_slice(v.as_bytes());
    }
    out
}

pub fn plain_encode_bools(values: &[bool]) -> Vec<u8> {
    let mut writer = BitWriter::default();
    for &v in values {
        writer.put_value(v as u64, 1);
    }
    writer.consume()
}

pub fn plain_encode_timestamps(values: &[TimestampValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        out.extend_from_slice(&v.nanos_of_day.to_le_bytes());
        out.extend_from_slice(&v.julian_day.to_le_bytes());
    }
    out
}

// ----------------------------------------------------------------------
// Page and file builders

/// A fully encoded page: thrift header plus (possibly compressed) body.
pub struct PageSpec {
    pub header: PageHeader,
    pub body: Vec<u8>,
    pub is_dict: bool,
}

fn compress_body(codec: Compression, raw: Vec<u8>) -> (i32, i32, Vec<u8>) {
    let uncompressed = raw.len() as i32;
    match codec {
        Compression::UNCOMPRESSED => (uncompressed, uncompressed, raw),
        other => {
            let mut compressor = create_codec(other).unwrap().unwrap();
            let mut out = Vec::new();
            compressor.compress(&raw, &mut out).unwrap();
            (uncompressed, out.len() as i32, out)
        }
    }
}

/// Builds a v1 data page. Levels are RLE encoded at the widths implied by
/// the maxima; `value_bytes` is the already-encoded value section.
pub fn make_data_page(
    num_values: usize,
    max_def: i16,
    def_levels: &[u8],
    max_rep: i16,
    rep_levels: &[u8],
    encoding: Encoding,
    value_bytes: &[u8],
    codec: Compression,
) -> PageSpec {
    let mut raw = Vec::new();
    if max_rep > 0 {
        raw.extend_from_slice(&rle_levels(num_required_bits(max_rep as u64), rep_levels));
    }
    if max_def > 0 {
        raw.extend_from_slice(&rle_levels(num_required_bits(max_def as u64), def_levels));
    }
    raw.extend_from_slice(value_bytes);
    let (uncompressed_page_size, compressed_page_size, body) = compress_body(codec, raw);
    PageSpec {
        header: PageHeader {
            type_: Some(PageType::DATA_PAGE),
            uncompressed_page_size,
            compressed_page_size,
            data_page_header: Some(DataPageHeader {
                num_values: num_values as i32,
                encoding,
                definition_level_encoding: Encoding::RLE,
                repetition_level_encoding: Encoding::RLE,
            }),
            dictionary_page_header: None,
        },
        body,
        is_dict: false,
    }
}

/// Builds a dictionary page. When `with_header` is false the
/// `dictionary_page_header` field is omitted, mimicking the impala 1.1
/// writer bug.
pub fn make_dict_page(
    dict_bytes: &[u8],
    num_values: usize,
    codec: Compression,
    with_header: bool,
) -> PageSpec {
    let (uncompressed_page_size, compressed_page_size, body) =
        compress_body(codec, dict_bytes.to_vec());
    PageSpec {
        header: PageHeader {
            type_: Some(PageType::DICTIONARY_PAGE),
            uncompressed_page_size,
            compressed_page_size,
            data_page_header: None,
            dictionary_page_header: with_header.then_some(DictionaryPageHeader {
                num_values: num_values as i32,
                encoding: Encoding::PLAIN_DICTIONARY,
                is_sorted: Some(false),
            }),
        },
        body,
        is_dict: true,
    }
}

/// Serializes pages into a contiguous column chunk image.
pub fn pages_to_bytes(pages: &[PageSpec]) -> Bytes {
    let mut buf = Vec::new();
    for page in pages {
        let mut prot = ThriftCompactOutputProtocol::new();
        page.header.write_to(&mut prot);
        buf.extend_from_slice(&prot.into_inner());
        buf.extend_from_slice(&page.body);
    }
    buf.into()
}

/// Column chunk metadata for a chunk starting at offset zero of its own
/// stream.
pub fn column_chunk_meta(type_: Type, codec: Compression, num_values: i64) -> ColumnMetaData {
    ColumnMetaData {
        type_,
        encodings: vec![Encoding::PLAIN, Encoding::RLE],
        path_in_schema: Vec::new(),
        codec,
        num_values,
        total_uncompressed_size: 0,
        total_compressed_size: 0,
        data_page_offset: 0,
        index_page_offset: None,
        dictionary_page_offset: None,
        statistics: None,
    }
}

/// A stream over a whole in-memory column chunk.
pub fn stream_over(bytes: Bytes) -> Box<dyn crate::scan::io::ByteStream> {
    let range = crate::scan::io::ScanRange {
        path: "test".to_owned(),
        offset: 0,
        len: bytes.len() as u64,
        disk_id: 0,
        try_cache: false,
        expected_local: true,
        mtime: 0,
    };
    Box::new(crate::scan::io::InMemoryStream::new(bytes, range))
}

/// One column chunk of one row group, as handed to [`FileBuilder`].
pub struct ColumnChunkSpec {
    pub type_: Type,
    pub path_in_schema: Vec<String>,
    pub codec: Compression,
    pub num_values: i64,
    pub pages: Vec<PageSpec>,
    pub statistics: Option<Statistics>,
}

/// A leaf column helper for [`schema_elements`].
pub fn leaf(name: &str, type_: Type, repetition: Repetition) -> SchemaElement {
    SchemaElement {
        type_: Some(type_),
        repetition_type: Some(repetition),
        name: name.to_owned(),
        ..Default::default()
    }
}

/// A group schema element with `num_children` children.
pub fn group(name: &str, repetition: Repetition, num_children: i32) -> SchemaElement {
    SchemaElement {
        repetition_type: Some(repetition),
        name: name.to_owned(),
        num_children: Some(num_children),
        ..Default::default()
    }
}

/// Flattened schema with the implicit root prepended.
pub fn schema_elements(fields: Vec<SchemaElement>, num_root_children: i32) -> Vec<SchemaElement> {
    let mut schema = vec![SchemaElement {
        name: "schema".to_owned(),
        num_children: Some(num_root_children),
        ..Default::default()
    }];
    schema.extend(fields);
    schema
}

/// Assembles a complete Parquet file image from encoded column chunks.
pub struct FileBuilder {
    pub schema: Vec<SchemaElement>,
    pub created_by: Option<String>,
    /// Per row group: the row count and one chunk per leaf column.
    pub row_groups: Vec<(i64, Vec<ColumnChunkSpec>)>,
    /// Extra bytes appended to `created_by` padding of the metadata, to
    /// inflate the footer for stitching tests.
    pub metadata_padding: usize,
}

impl FileBuilder {
    pub fn new(schema: Vec<SchemaElement>) -> Self {
        Self {
            schema,
            created_by: Some("impala version 2.3.0".to_owned()),
            row_groups: Vec::new(),
            metadata_padding: 0,
        }
    }

    pub fn build(self) -> Bytes {
        let mut buf: Vec<u8> = b"PAR1".to_vec();
        let mut row_groups = Vec::new();
        let mut num_rows_total = 0i64;

        for (num_rows, chunks) in self.row_groups {
            num_rows_total += num_rows;
            let mut columns = Vec::new();
            let mut total_byte_size = 0i64;
            for chunk in chunks {
                let chunk_start = buf.len() as i64;
                let mut dictionary_page_offset = None;
                let mut data_page_offset = None;
                for page in &chunk.pages {
                    let page_offset = buf.len() as i64;
                    if page.is_dict {
                        dictionary_page_offset.get_or_insert(page_offset);
                    } else {
                        data_page_offset.get_or_insert(page_offset);
                    }
                    let mut prot = ThriftCompactOutputProtocol::new();
                    page.header.write_to(&mut prot);
                    buf.extend_from_slice(&prot.into_inner());
                    buf.extend_from_slice(&page.body);
                }
                let total_compressed_size = buf.len() as i64 - chunk_start;
                total_byte_size += total_compressed_size;
                columns.push(ColumnChunk {
                    file_path: None,
                    file_offset: chunk_start,
                    meta_data: ColumnMetaData {
                        type_: chunk.type_,
                        encodings: chunk
                            .pages
                            .iter()
                            .filter_map(|p| p.header.data_page_header.as_ref())
                            .map(|h| h.encoding)
                            .collect(),
                        path_in_schema: chunk.path_in_schema,
                        codec: chunk.codec,
                        num_values: chunk.num_values,
                        total_uncompressed_size: total_compressed_size,
                        total_compressed_size,
                        data_page_offset: data_page_offset.unwrap_or(buf.len() as i64),
                        index_page_offset: None,
                        dictionary_page_offset,
                        statistics: chunk.statistics,
                    },
                });
            }
            row_groups.push(RowGroup {
                columns,
                total_byte_size,
                num_rows,
            });
        }

        let created_by = self.created_by.map(|mut s| {
            s.extend(std::iter::repeat(' ').take(self.metadata_padding));
            s
        });
        let metadata = FileMetaData {
            version: 1,
            schema: self.schema,
            num_rows: num_rows_total,
            row_groups,
            created_by,
        };
        let mut prot = ThriftCompactOutputProtocol::new();
        metadata.write_to(&mut prot);
        let metadata_bytes = prot.into_inner();
        buf.extend_from_slice(&metadata_bytes);
        buf.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(b"PAR1");
        buf.into()
    }
}
