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

//! Decoded Parquet metadata structures with hand-written Thrift
//! compact-protocol codecs. Field ids follow `parquet.thrift`; fields this
//! scanner does not consume (key/value metadata, sorting columns, page
//! indexes) are skipped on read and never written.

use crate::basic::{Compression, ConvertedType, Encoding, PageType, Repetition, Type};
use crate::errors::{Result, ScanError};
use crate::thrift::{FieldType, ThriftCompactOutputProtocol, ThriftSliceInputProtocol};

fn missing(strukt: &str, field: &str) -> ScanError {
    general_err!("required field {}.{} missing from thrift data", strukt, field)
}

// ----------------------------------------------------------------------
// SchemaElement

/// One entry of the flattened schema tree stored in the file footer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaElement {
    pub type_: Option<Type>,
    /// Length of FIXED_LEN_BYTE_ARRAY values.
    pub type_length: Option<i32>,
    /// Absent only for the root of the schema.
    pub repetition_type: Option<Repetition>,
    pub name: String,
    /// Absent or zero for leaves.
    pub num_children: Option<i32>,
    pub converted_type: Option<ConvertedType>,
    pub scale: Option<i32>,
    pub precision: Option<i32>,
}

impl SchemaElement {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut element = SchemaElement::default();
        let mut name = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => element.type_ = Some(Type::try_from(prot.read_i32()?)?),
                (_, 2) => element.type_length = Some(prot.read_i32()?),
                (_, 3) => {
                    element.repetition_type = Some(Repetition::try_from(prot.read_i32()?)?)
                }
                (_, 4) => name = Some(prot.read_string()?),
                (_, 5) => element.num_children = Some(prot.read_i32()?),
                (_, 6) => {
                    element.converted_type = Some(ConvertedType::try_from(prot.read_i32()?)?)
                }
                (_, 7) => element.scale = Some(prot.read_i32()?),
                (_, 8) => element.precision = Some(prot.read_i32()?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        element.name = name.ok_or_else(|| missing("SchemaElement", "name"))?;
        Ok(element)
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        if let Some(t) = self.type_ {
            last = out.write_field_begin(FieldType::I32, 1, last);
            out.write_i32(i32::from(t));
        }
        if let Some(len) = self.type_length {
            last = out.write_field_begin(FieldType::I32, 2, last);
            out.write_i32(len);
        }
        if let Some(r) = self.repetition_type {
            last = out.write_field_begin(FieldType::I32, 3, last);
            out.write_i32(i32::from(r));
        }
        last = out.write_field_begin(FieldType::Binary, 4, last);
        out.write_binary(self.name.as_bytes());
        if let Some(n) = self.num_children {
            last = out.write_field_begin(FieldType::I32, 5, last);
            out.write_i32(n);
        }
        if let Some(c) = self.converted_type {
            last = out.write_field_begin(FieldType::I32, 6, last);
            out.write_i32(i32::from(c));
        }
        if let Some(s) = self.scale {
            last = out.write_field_begin(FieldType::I32, 7, last);
            out.write_i32(s);
        }
        if let Some(p) = self.precision {
            out.write_field_begin(FieldType::I32, 8, last);
            out.write_i32(p);
        }
        out.write_stop();
    }
}

// ----------------------------------------------------------------------
// Statistics

/// Per column chunk min/max statistics. Only the deprecated `min`/`max`
/// fields are consumed, matching the writers this scanner trusts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    pub max: Option<Vec<u8>>,
    pub min: Option<Vec<u8>>,
    pub null_count: Option<i64>,
    pub distinct_count: Option<i64>,
}

impl Statistics {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut stats = Statistics::default();
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => stats.max = Some(prot.read_binary()?.to_vec()),
                (_, 2) => stats.min = Some(prot.read_binary()?.to_vec()),
                (_, 3) => stats.null_count = Some(prot.read_i64()?),
                (_, 4) => stats.distinct_count = Some(prot.read_i64()?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(stats)
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        if let Some(max) = &self.max {
            last = out.write_field_begin(FieldType::Binary, 1, last);
            out.write_binary(max);
        }
        if let Some(min) = &self.min {
            out.write_field_begin(FieldType::Binary, 2, last);
            out.write_binary(min);
        }
        out.write_stop();
    }
}

// ----------------------------------------------------------------------
// ColumnMetaData / ColumnChunk / RowGroup

/// Metadata for one column chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetaData {
    pub type_: Type,
    pub encodings: Vec<Encoding>,
    pub path_in_schema: Vec<String>,
    pub codec: Compression,
    pub num_values: i64,
    pub total_uncompressed_size: i64,
    pub total_compressed_size: i64,
    pub data_page_offset: i64,
    pub index_page_offset: Option<i64>,
    pub dictionary_page_offset: Option<i64>,
    pub statistics: Option<Statistics>,
}

impl ColumnMetaData {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut type_ = None;
        let mut encodings = Vec::new();
        let mut path_in_schema = Vec::new();
        let mut codec = None;
        let mut num_values = None;
        let mut total_uncompressed_size = None;
        let mut total_compressed_size = None;
        let mut data_page_offset = None;
        let mut index_page_offset = None;
        let mut dictionary_page_offset = None;
        let mut statistics = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => type_ = Some(Type::try_from(prot.read_i32()?)?),
                (_, 2) => {
                    let list = prot.read_list_begin()?;
                    for _ in 0..list.size {
                        encodings.push(Encoding::try_from(prot.read_i32()?)?);
                    }
                }
                (_, 3) => {
                    let list = prot.read_list_begin()?;
                    for _ in 0..list.size {
                        path_in_schema.push(prot.read_string()?);
                    }
                }
                (_, 4) => codec = Some(Compression::try_from(prot.read_i32()?)?),
                (_, 5) => num_values = Some(prot.read_i64()?),
                (_, 6) => total_uncompressed_size = Some(prot.read_i64()?),
                (_, 7) => total_compressed_size = Some(prot.read_i64()?),
                (_, 9) => data_page_offset = Some(prot.read_i64()?),
                (_, 10) => index_page_offset = Some(prot.read_i64()?),
                (_, 11) => dictionary_page_offset = Some(prot.read_i64()?),
                (_, 12) => statistics = Some(Statistics::read_from(prot)?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(ColumnMetaData {
            type_: type_.ok_or_else(|| missing("ColumnMetaData", "type"))?,
            encodings,
            path_in_schema,
            codec: codec.ok_or_else(|| missing("ColumnMetaData", "codec"))?,
            num_values: num_values.ok_or_else(|| missing("ColumnMetaData", "num_values"))?,
            total_uncompressed_size: total_uncompressed_size
                .ok_or_else(|| missing("ColumnMetaData", "total_uncompressed_size"))?,
            total_compressed_size: total_compressed_size
                .ok_or_else(|| missing("ColumnMetaData", "total_compressed_size"))?,
            data_page_offset: data_page_offset
                .ok_or_else(|| missing("ColumnMetaData", "data_page_offset"))?,
            index_page_offset,
            dictionary_page_offset,
            statistics,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(i32::from(self.type_));
        last = out.write_field_begin(FieldType::List, 2, last);
        out.write_list_begin(FieldType::I32, self.encodings.len());
        for &e in &self.encodings {
            out.write_i32(i32::from(e));
        }
        last = out.write_field_begin(FieldType::List, 3, last);
        out.write_list_begin(FieldType::Binary, self.path_in_schema.len());
        for p in &self.path_in_schema {
            out.write_binary(p.as_bytes());
        }
        last = out.write_field_begin(FieldType::I32, 4, last);
        out.write_i32(i32::from(self.codec));
        last = out.write_field_begin(FieldType::I64, 5, last);
        out.write_i64(self.num_values);
        last = out.write_field_begin(FieldType::I64, 6, last);
        out.write_i64(self.total_uncompressed_size);
        last = out.write_field_begin(FieldType::I64, 7, last);
        out.write_i64(self.total_compressed_size);
        last = out.write_field_begin(FieldType::I64, 9, last);
        out.write_i64(self.data_page_offset);
        if let Some(offset) = self.index_page_offset {
            last = out.write_field_begin(FieldType::I64, 10, last);
            out.write_i64(offset);
        }
        if let Some(offset) = self.dictionary_page_offset {
            last = out.write_field_begin(FieldType::I64, 11, last);
            out.write_i64(offset);
        }
        if let Some(stats) = &self.statistics {
            out.write_field_begin(FieldType::Struct, 12, last);
            stats.write_to(out);
        }
        out.write_stop();
    }
}

/// One column chunk of one row group.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChunk {
    pub file_path: Option<String>,
    pub file_offset: i64,
    pub meta_data: ColumnMetaData,
}

impl ColumnChunk {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut file_path = None;
        let mut file_offset = None;
        let mut meta_data = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => file_path = Some(prot.read_string()?),
                (_, 2) => file_offset = Some(prot.read_i64()?),
                (_, 3) => meta_data = Some(ColumnMetaData::read_from(prot)?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(ColumnChunk {
            file_path,
            file_offset: file_offset.ok_or_else(|| missing("ColumnChunk", "file_offset"))?,
            meta_data: meta_data.ok_or_else(|| missing("ColumnChunk", "meta_data"))?,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        if let Some(path) = &self.file_path {
            last = out.write_field_begin(FieldType::Binary, 1, last);
            out.write_binary(path.as_bytes());
        }
        last = out.write_field_begin(FieldType::I64, 2, last);
        out.write_i64(self.file_offset);
        out.write_field_begin(FieldType::Struct, 3, last);
        self.meta_data.write_to(out);
        out.write_stop();
    }
}

/// A horizontal partition of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    pub columns: Vec<ColumnChunk>,
    pub total_byte_size: i64,
    pub num_rows: i64,
}

impl RowGroup {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut columns = Vec::new();
        let mut total_byte_size = None;
        let mut num_rows = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => {
                    let list = prot.read_list_begin()?;
                    for _ in 0..list.size {
                        columns.push(ColumnChunk::read_from(prot)?);
                    }
                }
                (_, 2) => total_byte_size = Some(prot.read_i64()?),
                (_, 3) => num_rows = Some(prot.read_i64()?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(RowGroup {
            columns,
            total_byte_size: total_byte_size
                .ok_or_else(|| missing("RowGroup", "total_byte_size"))?,
            num_rows: num_rows.ok_or_else(|| missing("RowGroup", "num_rows"))?,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::List, 1, last);
        out.write_list_begin(FieldType::Struct, self.columns.len());
        for column in &self.columns {
            column.write_to(out);
        }
        last = out.write_field_begin(FieldType::I64, 2, last);
        out.write_i64(self.total_byte_size);
        out.write_field_begin(FieldType::I64, 3, last);
        out.write_i64(self.num_rows);
        out.write_stop();
    }
}

// ----------------------------------------------------------------------
// FileMetaData

/// Decoded file footer metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FileMetaData {
    pub version: i32,
    /// Flattened schema tree, depth first.
    pub schema: Vec<SchemaElement>,
    pub num_rows: i64,
    pub row_groups: Vec<RowGroup>,
    pub created_by: Option<String>,
}

impl FileMetaData {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut version = None;
        let mut schema = Vec::new();
        let mut num_rows = None;
        let mut row_groups = Vec::new();
        let mut created_by = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => version = Some(prot.read_i32()?),
                (_, 2) => {
                    let list = prot.read_list_begin()?;
                    for _ in 0..list.size {
                        schema.push(SchemaElement::read_from(prot)?);
                    }
                }
                (_, 3) => num_rows = Some(prot.read_i64()?),
                (_, 4) => {
                    let list = prot.read_list_begin()?;
                    for _ in 0..list.size {
                        row_groups.push(RowGroup::read_from(prot)?);
                    }
                }
                (_, 6) => created_by = Some(prot.read_string()?),
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(FileMetaData {
            version: version.ok_or_else(|| missing("FileMetaData", "version"))?,
            schema,
            num_rows: num_rows.ok_or_else(|| missing("FileMetaData", "num_rows"))?,
            row_groups,
            created_by,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(self.version);
        last = out.write_field_begin(FieldType::List, 2, last);
        out.write_list_begin(FieldType::Struct, self.schema.len());
        for element in &self.schema {
            element.write_to(out);
        }
        last = out.write_field_begin(FieldType::I64, 3, last);
        out.write_i64(self.num_rows);
        last = out.write_field_begin(FieldType::List, 4, last);
        out.write_list_begin(FieldType::Struct, self.row_groups.len());
        for row_group in &self.row_groups {
            row_group.write_to(out);
        }
        if let Some(created_by) = &self.created_by {
            out.write_field_begin(FieldType::Binary, 6, last);
            out.write_binary(created_by.as_bytes());
        }
        out.write_stop();
    }
}

// ----------------------------------------------------------------------
// Page headers

/// Header of a v1 data page.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub definition_level_encoding: Encoding,
    pub repetition_level_encoding: Encoding,
}

impl DataPageHeader {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut num_values = None;
        let mut encoding = None;
        let mut definition_level_encoding = None;
        let mut repetition_level_encoding = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => num_values = Some(prot.read_i32()?),
                (_, 2) => encoding = Some(Encoding::try_from(prot.read_i32()?)?),
                (_, 3) => {
                    definition_level_encoding = Some(Encoding::try_from(prot.read_i32()?)?)
                }
                (_, 4) => {
                    repetition_level_encoding = Some(Encoding::try_from(prot.read_i32()?)?)
                }
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(DataPageHeader {
            num_values: num_values.ok_or_else(|| missing("DataPageHeader", "num_values"))?,
            encoding: encoding.ok_or_else(|| missing("DataPageHeader", "encoding"))?,
            definition_level_encoding: definition_level_encoding
                .ok_or_else(|| missing("DataPageHeader", "definition_level_encoding"))?,
            repetition_level_encoding: repetition_level_encoding
                .ok_or_else(|| missing("DataPageHeader", "repetition_level_encoding"))?,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(self.num_values);
        last = out.write_field_begin(FieldType::I32, 2, last);
        out.write_i32(i32::from(self.encoding));
        last = out.write_field_begin(FieldType::I32, 3, last);
        out.write_i32(i32::from(self.definition_level_encoding));
        out.write_field_begin(FieldType::I32, 4, last);
        out.write_i32(i32::from(self.repetition_level_encoding));
        out.write_stop();
    }
}

/// Header of a dictionary page.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub is_sorted: Option<bool>,
}

impl DictionaryPageHeader {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut num_values = None;
        let mut encoding = None;
        let mut is_sorted = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => num_values = Some(prot.read_i32()?),
                (_, 2) => encoding = Some(Encoding::try_from(prot.read_i32()?)?),
                (_, 3) => is_sorted = field.bool_val,
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(DictionaryPageHeader {
            num_values: num_values
                .ok_or_else(|| missing("DictionaryPageHeader", "num_values"))?,
            encoding: encoding.ok_or_else(|| missing("DictionaryPageHeader", "encoding"))?,
            is_sorted,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(self.num_values);
        last = out.write_field_begin(FieldType::I32, 2, last);
        out.write_i32(i32::from(self.encoding));
        if let Some(sorted) = self.is_sorted {
            out.write_bool_field(3, last, sorted);
        }
        out.write_stop();
    }
}

/// Common page header preceding every page body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageHeader {
    pub type_: Option<PageType>,
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub data_page_header: Option<DataPageHeader>,
    pub dictionary_page_header: Option<DictionaryPageHeader>,
}

impl PageHeader {
    pub fn read_from(prot: &mut ThriftSliceInputProtocol<'_>) -> Result<Self> {
        let mut type_ = None;
        let mut uncompressed_page_size = None;
        let mut compressed_page_size = None;
        let mut data_page_header = None;
        let mut dictionary_page_header = None;
        let mut last_field_id = 0i16;
        loop {
            let field = prot.read_field_begin(last_field_id)?;
            match (field.field_type, field.id) {
                (FieldType::Stop, _) => break,
                (_, 1) => type_ = Some(PageType::try_from(prot.read_i32()?)?),
                (_, 2) => uncompressed_page_size = Some(prot.read_i32()?),
                (_, 3) => compressed_page_size = Some(prot.read_i32()?),
                (_, 5) => data_page_header = Some(DataPageHeader::read_from(prot)?),
                (_, 7) => {
                    dictionary_page_header = Some(DictionaryPageHeader::read_from(prot)?)
                }
                (field_type, _) => {
                    if field.bool_val.is_none() {
                        prot.skip(field_type)?;
                    }
                }
            }
            last_field_id = field.id;
        }
        Ok(PageHeader {
            type_,
            uncompressed_page_size: uncompressed_page_size
                .ok_or_else(|| missing("PageHeader", "uncompressed_page_size"))?,
            compressed_page_size: compressed_page_size
                .ok_or_else(|| missing("PageHeader", "compressed_page_size"))?,
            data_page_header,
            dictionary_page_header,
        })
    }

    pub fn write_to(&self, out: &mut ThriftCompactOutputProtocol) {
        let mut last = 0i16;
        if let Some(t) = self.type_ {
            last = out.write_field_begin(FieldType::I32, 1, last);
            out.write_i32(i32::from(t));
        }
        last = out.write_field_begin(FieldType::I32, 2, last);
        out.write_i32(self.uncompressed_page_size);
        last = out.write_field_begin(FieldType::I32, 3, last);
        out.write_i32(self.compressed_page_size);
        if let Some(header) = &self.data_page_header {
            last = out.write_field_begin(FieldType::Struct, 5, last);
            header.write_to(out);
        }
        if let Some(header) = &self.dictionary_page_header {
            out.write_field_begin(FieldType::Struct, 7, last);
            header.write_to(out);
        }
        out.write_stop();
    }
}
