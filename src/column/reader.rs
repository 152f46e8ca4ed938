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

//! Scalar column readers.
//!
//! A reader consumes one def/rep level pair at a time; the current levels
//! are exposed and the corresponding value (if defined) can be copied into a
//! tuple slot. The batched entry points materialize up to a scratch batch of
//! tuples at once, reading levels through the level caches.

use bytes::Bytes;

use crate::basic::{Encoding, Type};
use crate::data_type::{
    decimal_size, ByteArray, Conversion, Decimal128, Decimal32, Decimal64, ParquetValue,
    TimestampValue,
};
use crate::encodings::decoding::DictDecoder;
use crate::encodings::levels::{LevelDecoder, LevelKind};
use crate::errors::{Result, ScanError};
use crate::file::page_reader::{Page, PageReader};
use crate::file::version::requires_skipped_dictionary_header_check;
use crate::format::ColumnMetaData;
use crate::memory::MemPool;
use crate::scan::context::ScannerCtx;
use crate::scan::descriptors::{set_null, ColumnType, SlotDescriptor};
use crate::scan::io::ByteStream;
use crate::schema::tree::SchemaNode;

use super::collection::CollectionColumnReader;
use super::{INVALID_LEVEL, INVALID_POS, ROW_GROUP_END};

/// State common to every column reader: the schema node's level bounds, the
/// bound slots, and the current position in the level streams.
#[derive(Debug, Clone)]
pub struct ReaderBase {
    /// The raw schema entry of the column's node.
    pub element: crate::format::SchemaElement,
    pub column_name: String,
    /// Index into the flat column list of each row group; -1 for collection
    /// readers.
    pub col_idx: i32,
    pub max_def_level: i16,
    pub max_rep_level: i16,
    /// Definition level at which the nearest enclosing repeated field is
    /// empty.
    pub ira_def_level: i16,
    pub slot: Option<SlotDescriptor>,
    /// The slot for the synthesized item position, if any. Only one reader
    /// per tuple has this set.
    pub pos_slot: Option<SlotDescriptor>,
    pub def_level: i16,
    pub rep_level: i16,
    /// Next value for the position slot; -1 while no collection is open.
    pub pos_current_value: i64,
}

impl ReaderBase {
    pub(crate) fn new(node: &SchemaNode, slot: Option<SlotDescriptor>) -> Self {
        ReaderBase {
            element: node.element.clone(),
            column_name: node.element.name.clone(),
            col_idx: node.col_idx,
            max_def_level: node.max_def_level,
            max_rep_level: node.max_rep_level,
            ira_def_level: node.def_level_of_immediate_repeated_ancestor,
            slot,
            pos_slot: None,
            def_level: INVALID_LEVEL,
            // rep_level is always valid and equal to 0 if the column is not
            // in a collection.
            rep_level: if node.max_rep_level == 0 {
                0
            } else {
                INVALID_LEVEL
            },
            pos_current_value: INVALID_POS,
        }
    }

    #[inline]
    pub fn row_group_at_end(&self) -> bool {
        self.rep_level == ROW_GROUP_END
    }

    fn set_row_group_end(&mut self) {
        self.rep_level = ROW_GROUP_END;
        self.def_level = INVALID_LEVEL;
        self.pos_current_value = INVALID_POS;
    }
}

/// Page-level machinery shared by the typed scalar readers and the boolean
/// reader: the page stream, the two level decoders and the value counters.
pub struct ScalarReaderCore {
    pub base: ReaderBase,
    physical_type: Type,
    def_levels: LevelDecoder,
    rep_levels: LevelDecoder,
    page_reader: Option<PageReader>,
    pub metadata: Option<ColumnMetaData>,
    pub num_buffered_values: usize,
    pub num_values_read: i64,
    pub page_encoding: Encoding,
    /// Pool the previous page's buffer is released into at each page
    /// boundary; the scanner drains it into the scratch batch's pool so the
    /// output batch ends up owning the memory.
    pub decompressed_pool: MemPool,
    prev_page_buf: Option<Bytes>,
}

impl ScalarReaderCore {
    fn new(node: &SchemaNode, slot: Option<SlotDescriptor>, ctx: &ScannerCtx) -> Self {
        debug_assert!(node.col_idx >= 0, "scalar readers read materialized columns");
        ScalarReaderCore {
            base: ReaderBase::new(node, slot),
            physical_type: node
                .element
                .type_
                .expect("leaf schema nodes carry a physical type"),
            def_levels: LevelDecoder::new(LevelKind::Def),
            rep_levels: LevelDecoder::new(LevelKind::Rep),
            page_reader: None,
            metadata: None,
            num_buffered_values: 0,
            num_values_read: 0,
            page_encoding: Encoding::PLAIN,
            decompressed_pool: MemPool::new(ctx.mem_tracker.clone()),
            prev_page_buf: None,
        }
    }

    /// Binds the reader to one row group's column chunk. Called once per row
    /// group.
    fn reset(
        &mut self,
        metadata: &ColumnMetaData,
        stream: Box<dyn ByteStream>,
        ctx: &ScannerCtx,
    ) -> Result<()> {
        self.num_buffered_values = 0;
        self.num_values_read = 0;
        self.page_encoding = Encoding::PLAIN;
        self.prev_page_buf = None;
        self.base.def_level = INVALID_LEVEL;
        self.base.rep_level = if self.base.max_rep_level == 0 {
            0
        } else {
            INVALID_LEVEL
        };
        self.base.pos_current_value = INVALID_POS;
        self.def_levels
            .init_cache(ctx.options.batch_size, &ctx.level_cache_tracker)?;
        self.rep_levels
            .init_cache(ctx.options.batch_size, &ctx.level_cache_tracker)?;
        self.page_reader = Some(PageReader::new(
            stream,
            metadata.codec,
            self.physical_type,
            self.base.column_name.clone(),
            ctx.options.max_page_header_size,
            requires_skipped_dictionary_header_check(&ctx.file_version),
            self.base.slot.is_some(),
        )?);
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    /// Advances to the next data page, feeding dictionary pages to
    /// `on_dict`. Returns the value section of the new page, or `None` when
    /// the column chunk is exhausted.
    fn read_data_page(
        &mut self,
        ctx: &ScannerCtx,
        on_dict: &mut dyn FnMut(Bytes, Option<i32>, Encoding) -> Result<()>,
    ) -> Result<Option<Bytes>> {
        let page_reader = self
            .page_reader
            .as_mut()
            .ok_or_else(|| general_err!("column reader was not reset for this row group"))?;
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| general_err!("column reader was not reset for this row group"))?;
        loop {
            debug_assert_eq!(self.num_buffered_values, 0);
            if self.num_values_read == metadata.num_values {
                return Ok(None);
            }
            if self.num_values_read > metadata.num_values {
                ctx.log_or_return(ScanError::ColumnMetadataInvalid(format!(
                    "column '{}' declares {} values but the data pages contain more",
                    self.base.column_name, metadata.num_values
                )))?;
                return Ok(None);
            }
            match page_reader.next_page()? {
                None => {
                    // The data pages contain fewer values than stated in
                    // the column metadata.
                    ctx.log_or_return(ScanError::ColumnMetadataInvalid(format!(
                        "column '{}' declares {} values but the data pages contain only {}",
                        self.base.column_name, metadata.num_values, self.num_values_read
                    )))?;
                    return Ok(None);
                }
                Some(Page::Dictionary {
                    buf,
                    num_values,
                    encoding,
                }) => {
                    on_dict(buf, num_values, encoding)?;
                    continue;
                }
                Some(Page::Data { buf, header }) => {
                    if header.encoding != Encoding::PLAIN
                        && header.encoding != Encoding::PLAIN_DICTIONARY
                    {
                        return Err(ScanError::UnsupportedEncoding(format!(
                            "unexpected encoding {} for data page of column '{}'",
                            header.encoding, self.base.column_name
                        )));
                    }
                    if header.num_values < 0 {
                        return Err(ScanError::ColumnMetadataInvalid(format!(
                            "data page of column '{}' declares {} values",
                            self.base.column_name, header.num_values
                        )));
                    }
                    // The previous page is complete; pass its memory
                    // downstream.
                    if let Some(prev) = self.prev_page_buf.take() {
                        self.decompressed_pool.attach_buffer(prev);
                    }
                    self.num_buffered_values = header.num_values as usize;
                    self.num_values_read += header.num_values as i64;
                    self.prev_page_buf = Some(buf.clone());

                    let mut data = buf;
                    self.rep_levels.init(
                        header.repetition_level_encoding,
                        self.base.max_rep_level,
                        self.num_buffered_values,
                        &mut data,
                    )?;
                    self.def_levels.init(
                        header.definition_level_encoding,
                        self.base.max_def_level,
                        self.num_buffered_values,
                        &mut data,
                    )?;
                    self.page_encoding = header.encoding;
                    return Ok(Some(data));
                }
            }
        }
    }

    /// Consumes the next def/rep level pair from the level streams.
    /// Assumes a page with buffered values is current.
    fn advance_levels<const ADVANCE_REP: bool>(&mut self, ctx: &mut ScannerCtx) -> bool {
        if !ADVANCE_REP {
            debug_assert_eq!(self.base.max_rep_level, 0);
        }
        self.num_buffered_values -= 1;

        // The definition level stream is absent if the column and all
        // containing structs are required.
        self.base.def_level = if self.base.max_def_level == 0 {
            0
        } else {
            self.def_levels.read_level()
        };
        if self.base.max_def_level > 0 && self.base.def_level == INVALID_LEVEL {
            ctx.merge_status(ScanError::DefLevelError(format!(
                "could not read definition level of column '{}'",
                self.base.column_name
            )));
            return false;
        }

        if ADVANCE_REP && self.base.max_rep_level > 0 {
            self.base.rep_level = self.rep_levels.read_level();
            if self.base.rep_level == INVALID_LEVEL {
                ctx.merge_status(ScanError::RepLevelError(format!(
                    "could not read repetition level of column '{}'",
                    self.base.column_name
                )));
                return false;
            }
            // Reset the position counter at the start of a new parent
            // collection.
            if self.base.rep_level <= self.base.max_rep_level - 1 {
                self.base.pos_current_value = 0;
            }
        }
        true
    }
}

// ----------------------------------------------------------------------
// ScalarColumnReader

/// Reader for a single materialized column. If `MATERIALIZED` is false the
/// reader only consumes levels, which is used for counting readers and
/// columns dropped from the request.
pub struct ScalarColumnReader<V: ParquetValue, const MATERIALIZED: bool> {
    core: ScalarReaderCore,
    dict: Option<DictDecoder<V>>,
    /// Value section of the current PLAIN page and the decode cursor into
    /// it.
    data: Bytes,
    data_offset: usize,
    conversion: Conversion,
    /// Declared byte length for FIXED_LEN_BYTE_ARRAY values, -1 otherwise.
    fixed_len_size: i32,
}

impl<V: ParquetValue, const MATERIALIZED: bool> ScalarColumnReader<V, MATERIALIZED> {
    pub fn new(
        node: &SchemaNode,
        slot: Option<SlotDescriptor>,
        conversion: Conversion,
        fixed_len_size: i32,
        ctx: &ScannerCtx,
    ) -> Self {
        debug_assert!(MATERIALIZED == slot.is_some());
        ScalarColumnReader {
            core: ScalarReaderCore::new(node, slot, ctx),
            dict: None,
            data: Bytes::new(),
            data_offset: 0,
            conversion,
            fixed_len_size,
        }
    }

    pub fn base(&self) -> &ReaderBase {
        &self.core.base
    }

    pub fn base_mut(&mut self) -> &mut ReaderBase {
        &mut self.core.base
    }

    pub fn core(&self) -> &ScalarReaderCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ScalarReaderCore {
        &mut self.core
    }

    pub fn reset(
        &mut self,
        metadata: &ColumnMetaData,
        stream: Box<dyn ByteStream>,
        ctx: &ScannerCtx,
    ) -> Result<()> {
        self.dict = None;
        self.data = Bytes::new();
        self.data_offset = 0;
        self.core.reset(metadata, stream, ctx)
    }

    fn read_data_page(&mut self, ctx: &mut ScannerCtx) -> Result<()> {
        let fixed_len_size = self.fixed_len_size;
        let dict = &mut self.dict;
        let mut dict_bufs: Vec<Bytes> = Vec::new();
        let data = self.core.read_data_page(ctx, &mut |buf, num_values, _encoding| {
            let decoder = dict.get_or_insert_with(DictDecoder::new);
            decoder.reset(buf.clone(), fixed_len_size)?;
            if let Some(expected) = num_values {
                if decoder.num_entries() != expected as usize {
                    return Err(ScanError::CorruptDictionary(format!(
                        "expected {} entries but data contained {} entries",
                        expected,
                        decoder.num_entries()
                    )));
                }
            }
            dict_bufs.push(buf);
            Ok(())
        })?;
        // Dictionary buffers are retained by the scanner-wide pool until
        // close.
        for buf in dict_bufs {
            ctx.dictionary_pool.attach_buffer(buf);
        }
        if let Some(data) = data {
            if self.core.page_encoding == Encoding::PLAIN_DICTIONARY {
                match self.dict.as_mut() {
                    Some(decoder) => decoder.set_data(data)?,
                    None if MATERIALIZED => {
                        return Err(ScanError::CorruptDictionary(format!(
                            "column '{}' has a dict-encoded page but no dictionary page",
                            self.core.base.column_name
                        )))
                    }
                    None => {}
                }
            } else {
                self.data = data;
                self.data_offset = 0;
            }
        }
        Ok(())
    }

    /// Moves to the next page. Returns false at row-group end or on error
    /// (with `parse_status` set).
    fn next_page(&mut self, ctx: &mut ScannerCtx) -> bool {
        if let Err(e) = self.read_data_page(ctx) {
            ctx.merge_status(e);
            return false;
        }
        if self.core.num_buffered_values == 0 {
            self.core.base.set_row_group_end();
            return false;
        }
        true
    }

    /// Advances to the next def/rep pair, reading a new page if the current
    /// one is exhausted.
    pub fn next_levels<const ADVANCE_REP: bool>(&mut self, ctx: &mut ScannerCtx) -> bool {
        if self.core.num_buffered_values == 0 && !self.next_page(ctx) {
            return ctx.parse_status_ok();
        }
        self.core.advance_levels::<ADVANCE_REP>(ctx)
    }

    /// Writes the current value (or null) into `tuple` and advances. Only
    /// called when a value is defined, i.e. `def_level >= ira_def_level`.
    pub fn read_value<const IN_COLLECTION: bool>(
        &mut self,
        pool: &mut MemPool,
        tuple: &mut [u8],
        ctx: &mut ScannerCtx,
    ) -> bool {
        debug_assert!(self.core.base.def_level >= 0);
        debug_assert!(self.core.base.def_level >= self.core.base.ira_def_level);
        if MATERIALIZED {
            if self.core.base.def_level >= self.core.base.max_def_level {
                let ok = if self.core.page_encoding == Encoding::PLAIN_DICTIONARY {
                    self.read_slot::<true>(tuple, pool, ctx)
                } else {
                    self.read_slot::<false>(tuple, pool, ctx)
                };
                if !ok {
                    return false;
                }
            } else {
                let null_indicator = self.core.base.slot.as_ref().unwrap().null_indicator;
                set_null(tuple, null_indicator);
            }
        }
        self.next_levels::<IN_COLLECTION>(ctx)
    }

    /// Batched materialization of up to `max_values` tuples. Drives page
    /// reads and level caching; the inner loop is specialized on whether
    /// the page is dict encoded.
    pub fn read_value_batch<const IN_COLLECTION: bool>(
        &mut self,
        pool: &mut MemPool,
        max_values: usize,
        tuple_size: usize,
        tuple_mem: &mut [u8],
        num_values: &mut usize,
        ctx: &mut ScannerCtx,
    ) -> bool {
        // Repetition levels are only present if this column is nested in a
        // collection type.
        debug_assert_eq!(IN_COLLECTION, self.core.base.max_rep_level > 0);

        let mut val_count = 0;
        let mut continue_execution = true;
        while val_count < max_values && !self.core.base.row_group_at_end() && continue_execution {
            // Read the next page if necessary.
            if self.core.num_buffered_values == 0 {
                if !self.next_page(ctx) {
                    continue_execution = ctx.parse_status_ok();
                    continue;
                }
            }

            // Fill the level caches if they are empty.
            let level_batch_size = ctx.options.batch_size.min(self.core.num_buffered_values);
            if !self.core.def_levels.cache_has_next() {
                if let Err(e) = self.core.def_levels.cache_next_batch(level_batch_size) {
                    ctx.merge_status(e);
                }
            }
            // The repetition levels are only needed for populating the
            // position slot since this batch materializes top-level tuples.
            if IN_COLLECTION
                && self.core.base.pos_slot.is_some()
                && !self.core.rep_levels.cache_has_next()
            {
                if let Err(e) = self.core.rep_levels.cache_next_batch(level_batch_size) {
                    ctx.merge_status(e);
                }
            }
            if !ctx.parse_status_ok() {
                return false;
            }

            // This special case is most efficiently handled here directly.
            if !MATERIALIZED && !IN_COLLECTION {
                let vals_to_add = self
                    .core
                    .def_levels
                    .cache_remaining()
                    .min(max_values - val_count);
                val_count += vals_to_add;
                self.core.def_levels.cache_skip_levels(vals_to_add);
                self.core.num_buffered_values -= vals_to_add;
                continue;
            }

            let cache_start_idx = self.core.def_levels.cache_curr_idx();
            let tuple_mem_remaining = &mut tuple_mem[val_count * tuple_size..];
            let remaining_val_capacity = max_values - val_count;
            let mut ret_val_count = 0;
            continue_execution = if self.core.page_encoding == Encoding::PLAIN_DICTIONARY {
                self.materialize_value_batch::<IN_COLLECTION, true>(
                    pool,
                    remaining_val_capacity,
                    tuple_size,
                    tuple_mem_remaining,
                    &mut ret_val_count,
                    ctx,
                )
            } else {
                self.materialize_value_batch::<IN_COLLECTION, false>(
                    pool,
                    remaining_val_capacity,
                    tuple_size,
                    tuple_mem_remaining,
                    &mut ret_val_count,
                    ctx,
                )
            };
            val_count += ret_val_count;
            self.core.num_buffered_values -=
                self.core.def_levels.cache_curr_idx() - cache_start_idx;
        }
        *num_values = val_count;
        continue_execution
    }

    /// Inner loop of `read_value_batch`: walks the level caches in lockstep
    /// with the value stream. Assumes a data page with remaining values is
    /// current and the caches are populated.
    fn materialize_value_batch<const IN_COLLECTION: bool, const IS_DICT_ENCODED: bool>(
        &mut self,
        pool: &mut MemPool,
        max_values: usize,
        tuple_size: usize,
        tuple_mem: &mut [u8],
        num_values: &mut usize,
        ctx: &mut ScannerCtx,
    ) -> bool {
        debug_assert!(MATERIALIZED || IN_COLLECTION);
        debug_assert!(self.core.num_buffered_values > 0);

        let ira_def_level = self.core.base.ira_def_level;
        let max_def_level = self.core.base.max_def_level;
        let max_rep_level = self.core.base.max_rep_level;
        let pos_offset = self.core.base.pos_slot.as_ref().map(|s| s.tuple_offset);
        let null_indicator = self.core.base.slot.as_ref().map(|s| s.null_indicator);

        let mut val_count = 0;
        while self.core.def_levels.cache_has_next() {
            let def_level = self.core.def_levels.cache_get_next();

            if IN_COLLECTION {
                if def_level < ira_def_level {
                    // A containing repeated field is empty or NULL; skip
                    // the value but consume the repetition level.
                    if pos_offset.is_some() {
                        self.core.rep_levels.cache_get_next();
                    }
                    continue;
                }
                if let Some(pos_offset) = pos_offset {
                    let rep_level = self.core.rep_levels.cache_get_next();
                    if rep_level <= max_rep_level - 1 {
                        self.core.base.pos_current_value = 0;
                    }
                    let tuple = &mut tuple_mem[val_count * tuple_size..][..tuple_size];
                    tuple[pos_offset..pos_offset + 8]
                        .copy_from_slice(&self.core.base.pos_current_value.to_le_bytes());
                    self.core.base.pos_current_value += 1;
                }
            }

            if MATERIALIZED {
                let tuple = &mut tuple_mem[val_count * tuple_size..][..tuple_size];
                if def_level >= max_def_level {
                    if !self.read_slot::<IS_DICT_ENCODED>(tuple, pool, ctx) {
                        return false;
                    }
                } else {
                    set_null(tuple, null_indicator.unwrap());
                }
            }

            val_count += 1;
            if val_count == max_values {
                break;
            }
        }
        *num_values = val_count;
        true
    }

    /// Decodes the next value into the tuple's slot, applying any
    /// type-specific conversion through a scratch value.
    fn read_slot<const IS_DICT_ENCODED: bool>(
        &mut self,
        tuple: &mut [u8],
        pool: &mut MemPool,
        ctx: &mut ScannerCtx,
    ) -> bool {
        let (slot_offset, slot_size) = {
            let slot = self.core.base.slot.as_ref().unwrap();
            (slot.tuple_offset, slot.slot_type.slot_byte_size())
        };
        let value: V = if IS_DICT_ENCODED {
            debug_assert_eq!(self.core.page_encoding, Encoding::PLAIN_DICTIONARY);
            let Some(dict) = self.dict.as_mut() else {
                ctx.merge_status(ScanError::DictDecodeFailure(format!(
                    "column '{}' has no dictionary",
                    self.core.base.column_name
                )));
                return false;
            };
            let mut v = V::default();
            if let Err(e) = dict.get_value(&mut v) {
                ctx.merge_status(e);
                return false;
            }
            v
        } else {
            debug_assert_eq!(self.core.page_encoding, Encoding::PLAIN);
            match V::decode(&self.data, self.data_offset, self.fixed_len_size) {
                Ok((v, consumed)) => {
                    self.data_offset += consumed;
                    v
                }
                Err(e) => {
                    ctx.merge_status(e);
                    return false;
                }
            }
        };
        let slot = &mut tuple[slot_offset..slot_offset + slot_size];
        if let Err(e) = value.write_converted(self.conversion, slot, pool) {
            ctx.merge_status(e);
            return false;
        }
        true
    }
}

// ----------------------------------------------------------------------
// BoolColumnReader

/// Reader for BOOLEAN columns. Physical booleans are bit-packed 1-bit
/// values; dictionary encoding is not allowed.
pub struct BoolColumnReader {
    core: ScalarReaderCore,
    bool_values: crate::util::bit_util::BitReader,
}

impl BoolColumnReader {
    pub fn new(node: &SchemaNode, slot: Option<SlotDescriptor>, ctx: &ScannerCtx) -> Self {
        debug_assert!(matches!(
            slot.as_ref().map(|s| &s.slot_type),
            None | Some(ColumnType::Boolean)
        ));
        BoolColumnReader {
            core: ScalarReaderCore::new(node, slot, ctx),
            bool_values: Default::default(),
        }
    }

    pub fn base(&self) -> &ReaderBase {
        &self.core.base
    }

    pub fn base_mut(&mut self) -> &mut ReaderBase {
        &mut self.core.base
    }

    pub fn core(&self) -> &ScalarReaderCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut ScalarReaderCore {
        &mut self.core
    }

    pub fn reset(
        &mut self,
        metadata: &ColumnMetaData,
        stream: Box<dyn ByteStream>,
        ctx: &ScannerCtx,
    ) -> Result<()> {
        self.bool_values = Default::default();
        self.core.reset(metadata, stream, ctx)
    }

    fn read_data_page(&mut self, ctx: &mut ScannerCtx) -> Result<()> {
        // The page reader rejects dictionary pages for booleans before the
        // callback can run.
        let data = self.core.read_data_page(ctx, &mut |_, _, _| {
            Err(general_err!("dictionary page on a boolean column"))
        })?;
        if let Some(data) = data {
            if self.core.page_encoding != Encoding::PLAIN {
                return Err(ScanError::UnsupportedEncoding(format!(
                    "unexpected encoding {} for boolean column '{}'",
                    self.core.page_encoding, self.core.base.column_name
                )));
            }
            self.bool_values.reset(data);
        }
        Ok(())
    }

    fn next_page(&mut self, ctx: &mut ScannerCtx) -> bool {
        if let Err(e) = self.read_data_page(ctx) {
            ctx.merge_status(e);
            return false;
        }
        if self.core.num_buffered_values == 0 {
            self.core.base.set_row_group_end();
            return false;
        }
        true
    }

    pub fn next_levels<const ADVANCE_REP: bool>(&mut self, ctx: &mut ScannerCtx) -> bool {
        if self.core.num_buffered_values == 0 && !self.next_page(ctx) {
            return ctx.parse_status_ok();
        }
        self.core.advance_levels::<ADVANCE_REP>(ctx)
    }

    pub fn read_value<const IN_COLLECTION: bool>(
        &mut self,
        _pool: &mut MemPool,
        tuple: &mut [u8],
        ctx: &mut ScannerCtx,
    ) -> bool {
        debug_assert!(self.core.base.def_level >= 0);
        let slot = self.core.base.slot.as_ref().unwrap();
        if self.core.base.def_level >= self.core.base.max_def_level {
            let offset = slot.tuple_offset;
            match self.bool_values.get_value::<bool>(1) {
                Some(v) => tuple[offset] = v as u8,
                None => {
                    ctx.merge_status(ScanError::InvalidBool(format!(
                        "bit-packed boolean stream of column '{}' underflowed",
                        self.core.base.column_name
                    )));
                    return false;
                }
            }
        } else {
            set_null(tuple, slot.null_indicator);
        }
        self.next_levels::<IN_COLLECTION>(ctx)
    }
}

// ----------------------------------------------------------------------
// The closed reader enum

/// A column reader bound to one requested column, dispatched over the slot's
/// logical type. `Counting` consumes levels without materializing values.
pub enum ColumnReader {
    Bool(BoolColumnReader),
    TinyInt(ScalarColumnReader<i8, true>),
    SmallInt(ScalarColumnReader<i16, true>),
    Int(ScalarColumnReader<i32, true>),
    BigInt(ScalarColumnReader<i64, true>),
    Float(ScalarColumnReader<f32, true>),
    Double(ScalarColumnReader<f64, true>),
    Timestamp(ScalarColumnReader<TimestampValue, true>),
    String(ScalarColumnReader<ByteArray, true>),
    Decimal32(ScalarColumnReader<Decimal32, true>),
    Decimal64(ScalarColumnReader<Decimal64, true>),
    Decimal128(ScalarColumnReader<Decimal128, true>),
    Counting(ScalarColumnReader<i8, false>),
    Collection(CollectionColumnReader),
}

macro_rules! for_all_readers {
    ($self:expr, $r:ident => $e:expr) => {
        match $self {
            ColumnReader::Bool($r) => $e,
            ColumnReader::TinyInt($r) => $e,
            ColumnReader::SmallInt($r) => $e,
            ColumnReader::Int($r) => $e,
            ColumnReader::BigInt($r) => $e,
            ColumnReader::Float($r) => $e,
            ColumnReader::Double($r) => $e,
            ColumnReader::Timestamp($r) => $e,
            ColumnReader::String($r) => $e,
            ColumnReader::Decimal32($r) => $e,
            ColumnReader::Decimal64($r) => $e,
            ColumnReader::Decimal128($r) => $e,
            ColumnReader::Counting($r) => $e,
            ColumnReader::Collection($r) => $e,
        }
    };
}

/// Dispatch over the typed scalar readers, with a catch-all for the
/// boolean and collection readers.
macro_rules! for_scalar_readers {
    ($self:expr, $r:ident => $e:expr) => {
        match $self {
            ColumnReader::TinyInt($r) => $e,
            ColumnReader::SmallInt($r) => $e,
            ColumnReader::Int($r) => $e,
            ColumnReader::BigInt($r) => $e,
            ColumnReader::Float($r) => $e,
            ColumnReader::Double($r) => $e,
            ColumnReader::Timestamp($r) => $e,
            ColumnReader::String($r) => $e,
            ColumnReader::Decimal32($r) => $e,
            ColumnReader::Decimal64($r) => $e,
            ColumnReader::Decimal128($r) => $e,
            ColumnReader::Counting($r) => $e,
            _ => {}
        }
    };
}

/// Dispatch over every reader with its own page stream (everything but
/// collections).
macro_rules! for_leaf_readers {
    ($self:expr, $r:ident => $e:expr, $c:ident => $ce:expr) => {
        match $self {
            ColumnReader::Collection($c) => $ce,
            ColumnReader::Bool($r) => $e,
            ColumnReader::TinyInt($r) => $e,
            ColumnReader::SmallInt($r) => $e,
            ColumnReader::Int($r) => $e,
            ColumnReader::BigInt($r) => $e,
            ColumnReader::Float($r) => $e,
            ColumnReader::Double($r) => $e,
            ColumnReader::Timestamp($r) => $e,
            ColumnReader::String($r) => $e,
            ColumnReader::Decimal32($r) => $e,
            ColumnReader::Decimal64($r) => $e,
            ColumnReader::Decimal128($r) => $e,
            ColumnReader::Counting($r) => $e,
        }
    };
}

impl ColumnReader {
    pub fn base(&self) -> &ReaderBase {
        for_all_readers!(self, r => r.base())
    }

    pub fn base_mut(&mut self) -> &mut ReaderBase {
        for_all_readers!(self, r => r.base_mut())
    }

    pub fn def_level(&self) -> i16 {
        self.base().def_level
    }

    pub fn rep_level(&self) -> i16 {
        self.base().rep_level
    }

    pub fn max_def_level(&self) -> i16 {
        self.base().max_def_level
    }

    pub fn max_rep_level(&self) -> i16 {
        self.base().max_rep_level
    }

    pub fn def_level_of_immediate_repeated_ancestor(&self) -> i16 {
        self.base().ira_def_level
    }

    pub fn row_group_at_end(&self) -> bool {
        self.base().row_group_at_end()
    }

    pub fn is_collection_reader(&self) -> bool {
        matches!(self, ColumnReader::Collection(_))
    }

    pub fn as_collection(&self) -> Option<&CollectionColumnReader> {
        match self {
            ColumnReader::Collection(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut CollectionColumnReader> {
        match self {
            ColumnReader::Collection(c) => Some(c),
            _ => None,
        }
    }

    /// Whether this reader must be advanced once with `next_levels` before
    /// the batched entry points may be used. The typed scalar readers use
    /// an optimized `read_value_batch` that must not be seeded.
    pub fn needs_seeding_for_batched_reading(&self) -> bool {
        matches!(self, ColumnReader::Bool(_) | ColumnReader::Collection(_))
    }

    pub fn set_pos_slot(&mut self, slot: SlotDescriptor) {
        let base = self.base_mut();
        debug_assert!(base.pos_slot.is_none());
        base.pos_slot = Some(slot);
    }

    pub fn has_pos_slot(&self) -> bool {
        self.base().pos_slot.is_some()
    }

    /// Writes the parent collection position into the position slot and
    /// advances the counter.
    pub fn read_position(&mut self, tuple: &mut [u8]) {
        let base = self.base_mut();
        debug_assert!(base.pos_current_value >= 0);
        let offset = base.pos_slot.as_ref().map(|s| s.tuple_offset);
        if let Some(offset) = offset {
            tuple[offset..offset + 8].copy_from_slice(&base.pos_current_value.to_le_bytes());
            base.pos_current_value += 1;
        }
    }

    /// Binds a leaf reader to a row group's column chunk. Collection
    /// readers have no chunk of their own; their children are bound
    /// individually.
    pub fn reset(
        &mut self,
        metadata: &ColumnMetaData,
        stream: Box<dyn ByteStream>,
        ctx: &ScannerCtx,
    ) -> Result<()> {
        for_leaf_readers!(self, r => r.reset(metadata, stream, ctx), _c => {
            Err(general_err!("collection readers are not bound to a column chunk"))
        })
    }

    /// Advances to the next def/rep pair (the beginning of the next
    /// collection for collection readers).
    pub fn next_levels(&mut self, ctx: &mut ScannerCtx) -> bool {
        for_leaf_readers!(self, r => r.next_levels::<true>(ctx), c => c.next_levels(ctx))
    }

    /// Reads the current value into `tuple` and advances.
    pub fn read_value(&mut self, pool: &mut MemPool, tuple: &mut [u8], ctx: &mut ScannerCtx) -> bool {
        for_leaf_readers!(self, r => r.read_value::<true>(pool, tuple, ctx),
            c => c.read_value(pool, tuple, ctx))
    }

    /// As `read_value` but without repetition levels; only valid for
    /// columns not in collections.
    pub fn read_non_repeated_value(
        &mut self,
        pool: &mut MemPool,
        tuple: &mut [u8],
        ctx: &mut ScannerCtx,
    ) -> bool {
        for_leaf_readers!(self, r => r.read_value::<false>(pool, tuple, ctx),
            c => c.read_value(pool, tuple, ctx))
    }

    /// Batched read of up to `max_values` values of a column nested in a
    /// collection.
    pub fn read_value_batch(
        &mut self,
        pool: &mut MemPool,
        max_values: usize,
        tuple_size: usize,
        tuple_mem: &mut [u8],
        num_values: &mut usize,
        ctx: &mut ScannerCtx,
    ) -> bool {
        for_scalar_readers!(self, r => return r.read_value_batch::<true>(
            pool, max_values, tuple_size, tuple_mem, num_values, ctx));
        self.read_batch_fallback::<true>(pool, max_values, tuple_size, tuple_mem, num_values, ctx)
    }

    /// Batched read of up to `max_values` values of a top-level column.
    pub fn read_non_repeated_value_batch(
        &mut self,
        pool: &mut MemPool,
        max_values: usize,
        tuple_size: usize,
        tuple_mem: &mut [u8],
        num_values: &mut usize,
        ctx: &mut ScannerCtx,
    ) -> bool {
        for_scalar_readers!(self, r => return r.read_value_batch::<false>(
            pool, max_values, tuple_size, tuple_mem, num_values, ctx));
        self.read_batch_fallback::<false>(pool, max_values, tuple_size, tuple_mem, num_values, ctx)
    }

    /// Value-at-a-time batch loop for readers without an optimized batched
    /// implementation (boolean and collection readers). These must have
    /// been seeded with `next_levels`.
    fn read_batch_fallback<const REPEATED: bool>(
        &mut self,
        pool: &mut MemPool,
        max_values: usize,
        tuple_size: usize,
        tuple_mem: &mut [u8],
        num_values: &mut usize,
        ctx: &mut ScannerCtx,
    ) -> bool {
        let mut val_count = 0;
        let mut continue_execution = true;
        while val_count < max_values && !self.row_group_at_end() && continue_execution {
            let tuple = &mut tuple_mem[val_count * tuple_size..][..tuple_size];
            if REPEATED {
                if self.def_level() < self.def_level_of_immediate_repeated_ancestor() {
                    // A containing repeated field is empty or NULL.
                    continue_execution = self.next_levels(ctx);
                    continue;
                }
                if self.has_pos_slot() {
                    self.read_position(tuple);
                }
                continue_execution = self.read_value(pool, tuple, ctx);
            } else {
                continue_execution = self.read_non_repeated_value(pool, tuple, ctx);
            }
            val_count += 1;
        }
        *num_values = val_count;
        continue_execution
    }

    /// Per-leaf value accounting used for end-of-row-group validation.
    pub fn leaf_state(&self) -> Option<LeafReaderState> {
        for_leaf_readers!(self, r => {
            let core = r.core();
            Some(LeafReaderState {
                col_idx: core.base.col_idx,
                num_buffered_values: core.num_buffered_values,
                num_values_read: core.num_values_read,
            })
        }, _c => None)
    }

    /// Moves the decompression buffers accumulated since the last call into
    /// `dst`, normally the scratch batch's pool.
    pub fn transfer_decompressed_buffers(&mut self, dst: &mut MemPool) {
        for_leaf_readers!(self, r => dst.acquire_data(&mut r.core_mut().decompressed_pool), c => {
            for child in &mut c.children {
                child.transfer_decompressed_buffers(dst);
            }
        })
    }
}

/// Snapshot of a leaf reader's value accounting.
pub struct LeafReaderState {
    pub col_idx: i32,
    pub num_buffered_values: usize,
    pub num_values_read: i64,
}

/// Creates the appropriate reader for `node` bound to `slot_desc` (or a
/// counting reader when there is no slot to fill).
pub fn create_reader(
    node: &SchemaNode,
    is_collection_field: bool,
    slot_desc: Option<SlotDescriptor>,
    ctx: &ScannerCtx,
) -> ColumnReader {
    if is_collection_field {
        return ColumnReader::Collection(CollectionColumnReader::new(node, slot_desc));
    }
    let Some(slot) = slot_desc else {
        // Counting scalar values: only rep and def levels are read, so the
        // value type does not matter.
        return ColumnReader::Counting(ScalarColumnReader::new(
            node,
            None,
            Conversion::None,
            -1,
            ctx,
        ));
    };
    match slot.slot_type.clone() {
        ColumnType::Boolean => ColumnReader::Bool(BoolColumnReader::new(node, Some(slot), ctx)),
        ColumnType::TinyInt => ColumnReader::TinyInt(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::None,
            -1,
            ctx,
        )),
        ColumnType::SmallInt => ColumnReader::SmallInt(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::None,
            -1,
            ctx,
        )),
        ColumnType::Int => {
            ColumnReader::Int(ScalarColumnReader::new(node, Some(slot), Conversion::None, -1, ctx))
        }
        ColumnType::BigInt => ColumnReader::BigInt(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::None,
            -1,
            ctx,
        )),
        ColumnType::Float => ColumnReader::Float(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::None,
            -1,
            ctx,
        )),
        ColumnType::Double => ColumnReader::Double(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::None,
            -1,
            ctx,
        )),
        ColumnType::Timestamp => {
            // All known writer versions store unconverted UTC values, so the
            // conversion is keyed on the writing application alone.
            let conversion = if ctx.options.convert_legacy_hive_parquet_utc_timestamps
                && ctx.file_version.application == "parquet-mr"
            {
                Conversion::LocalizeUtc
            } else {
                Conversion::None
            };
            ColumnReader::Timestamp(ScalarColumnReader::new(node, Some(slot), conversion, -1, ctx))
        }
        ColumnType::String | ColumnType::Varchar(_) => ColumnReader::String(
            ScalarColumnReader::new(node, Some(slot), Conversion::None, -1, ctx),
        ),
        ColumnType::Char(len) => ColumnReader::String(ScalarColumnReader::new(
            node,
            Some(slot),
            Conversion::PadChar(len as usize),
            -1,
            ctx,
        )),
        ColumnType::Decimal { precision, .. } => {
            let fixed_len_size = decimal_size(precision);
            match slot.slot_type.slot_byte_size() {
                4 => ColumnReader::Decimal32(ScalarColumnReader::new(
                    node,
                    Some(slot),
                    Conversion::None,
                    fixed_len_size,
                    ctx,
                )),
                8 => ColumnReader::Decimal64(ScalarColumnReader::new(
                    node,
                    Some(slot),
                    Conversion::None,
                    fixed_len_size,
                    ctx,
                )),
                _ => ColumnReader::Decimal128(ScalarColumnReader::new(
                    node,
                    Some(slot),
                    Conversion::None,
                    fixed_len_size,
                    ctx,
                )),
            }
        }
        ColumnType::Array(_) | ColumnType::Map(_, _) | ColumnType::Struct(_) => {
            unreachable!("complex slots are handled by collection readers")
        }
    }
}
