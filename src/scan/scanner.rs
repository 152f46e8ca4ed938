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

//! The scanner: one instance per byte split. Decodes the footer, builds the
//! reader tree for the requested columns, and assembles every row group
//! whose mid point falls inside the split into filtered output batches.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::basic::{Compression, ConvertedType, Type};
use crate::column::reader::{create_reader, ColumnReader, LeafReaderState};
use crate::data_type::decimal_size;
use crate::errors::{Result, ScanError};
use crate::file::footer::{
    column_start_offset, process_footer, row_group_mid_offset, validate_column_offsets,
};
use crate::file::version::FileVersion;
use crate::file::{FOOTER_RANGE_SIZE, MAX_DICT_HEADER_SIZE};
use crate::format::{ColumnMetaData, FileMetaData, RowGroup};
use crate::memory::MemTracker;
use crate::scan::batch::{RowBatch, ScratchBatch};
use crate::scan::conjuncts::{eval_conjuncts, ConjunctEval, StatsConjunctEval, TupleRow};
use crate::scan::context::{ScanOptions, ScannerCtx};
use crate::scan::descriptors::{
    set_null, slot_bytes_mut, ColumnDesc, ColumnType, SlotDescriptor, TupleDescriptor,
};
use crate::scan::filter::{FilterContext, FilterEvaluator};
use crate::scan::io::IoManager;
use crate::schema::resolver::SchemaResolver;
use crate::schema::tree::{build_schema_tree, SchemaNode};

/// One scan request: the file, the byte split this scanner owns, and the
/// request-side descriptors.
pub struct ScanRequest {
    pub path: String,
    pub file_len: u64,
    pub split_offset: u64,
    pub split_len: u64,
    pub tuple_desc: Arc<TupleDescriptor>,
    pub table_cols: Vec<ColumnDesc>,
    pub num_partition_keys: usize,
    /// Template the output tuples start from, carrying partition-key
    /// values. Extended with NULLs for requested columns missing from the
    /// file.
    pub template_tuple: Option<Vec<u8>>,
    pub limit: Option<i64>,
}

/// Columnar scanner for one split of one Parquet file.
pub struct ParquetScanner<'a> {
    ctx: ScannerCtx,
    io: &'a dyn IoManager,
    request: ScanRequest,
    conjuncts: Vec<Box<dyn ConjunctEval>>,
    stats_conjuncts: Vec<Box<dyn StatsConjunctEval>>,
    filters: FilterEvaluator,

    file_metadata: Option<FileMetaData>,
    schema: Option<SchemaNode>,
    column_readers: Vec<ColumnReader>,
    template_tuple: Option<Vec<u8>>,
    scratch: ScratchBatch,
    current_batch: Option<RowBatch>,
    output: Vec<RowBatch>,
}

impl<'a> ParquetScanner<'a> {
    pub fn new(
        io: &'a dyn IoManager,
        request: ScanRequest,
        options: ScanOptions,
        conjuncts: Vec<Box<dyn ConjunctEval>>,
        stats_conjuncts: Vec<Box<dyn StatsConjunctEval>>,
        filters: Vec<FilterContext>,
        mem_tracker: Arc<MemTracker>,
    ) -> Self {
        let mut ctx = ScannerCtx::new(options, request.path.clone(), mem_tracker);
        ctx.limit = request.limit;
        let filters = FilterEvaluator::new(filters, ctx.options.parquet_min_filter_reject_ratio);
        let scratch = ScratchBatch::new(
            request.tuple_desc.byte_size,
            ctx.options.batch_size,
            ctx.mem_tracker.clone(),
        );
        let template_tuple = request.template_tuple.clone();
        ParquetScanner {
            ctx,
            io,
            request,
            conjuncts,
            stats_conjuncts,
            filters,
            file_metadata: None,
            schema: None,
            column_readers: Vec::new(),
            template_tuple,
            scratch,
            current_batch: None,
            output: Vec::new(),
        }
    }

    pub fn ctx(&self) -> &ScannerCtx {
        &self.ctx
    }

    /// Runs the whole split to completion, returning the output batches.
    pub fn process_split(&mut self) -> Result<Vec<RowBatch>> {
        debug_assert!(self.ctx.parse_status_ok());
        let eosr = self.process_footer_phase()?;
        if !eosr {
            self.create_column_readers_phase()?;
            self.process_row_groups()?;
        }
        self.close();
        Ok(std::mem::take(&mut self.output))
    }

    /// Decodes the footer. Returns true when the split is already complete:
    /// a pure-count scan served from the metadata, or an empty file.
    fn process_footer_phase(&mut self) -> Result<bool> {
        let file_len = self.request.file_len;
        let footer_len = FOOTER_RANGE_SIZE.min(file_len);
        let range = self.io.allocate_scan_range(
            &self.request.path,
            footer_len,
            file_len.saturating_sub(footer_len),
            -1,
            false,
            false,
            0,
        );
        let mut stream = self.io.open_stream(&range)?;
        let metadata = process_footer(stream.as_mut(), self.io, &self.request.path, file_len)?;
        self.ctx.file_version = metadata
            .created_by
            .as_deref()
            .map(FileVersion::parse)
            .unwrap_or_default();

        if self.request.tuple_desc.slots.is_empty() {
            // No materialized slots, e.g. count(*) over the table: serve
            // the scan from the metadata alone.
            let mut remaining = metadata.num_rows;
            while remaining > 0 && !self.ctx.reached_limit() {
                let n = (self.ctx.options.batch_size as i64).min(remaining);
                let batch = self.current_batch_mut();
                batch.add_empty_rows(n as usize);
                remaining -= n;
                self.ctx.rows_returned += n;
                self.flush_current_batch();
            }
            return Ok(true);
        }
        if metadata.num_rows == 0 {
            return Ok(true);
        }
        if metadata.row_groups.is_empty() {
            return Err(general_err!(
                "invalid file: '{}' has no row groups",
                self.request.path
            ));
        }
        let schema = build_schema_tree(&metadata.schema)?;
        if schema.children.is_empty() {
            return Err(general_err!(
                "invalid file: '{}' has no columns",
                self.request.path
            ));
        }
        self.schema = Some(schema);
        self.file_metadata = Some(metadata);
        Ok(false)
    }

    fn create_column_readers_phase(&mut self) -> Result<()> {
        let schema = self.schema.as_ref().unwrap();
        let resolver = SchemaResolver::new(
            schema,
            &self.request.table_cols,
            self.request.num_partition_keys,
            self.ctx.options.parquet_fallback_schema_resolution,
            &self.ctx.filename,
        );
        let mut template = self.template_tuple.take();
        let readers = Self::create_column_readers(
            &resolver,
            &self.request.tuple_desc,
            true,
            self.request.num_partition_keys,
            &self.ctx,
            &mut template,
        )?;
        self.template_tuple = template;
        self.column_readers = readers;
        debug!(
            file = %self.ctx.filename,
            num_columns = self.column_readers.len(),
            "created column readers"
        );
        Ok(())
    }

    /// Creates the readers materializing `tuple_desc`, recursing into
    /// collection items. Requested fields missing from the file NULL the
    /// slot in this level's template tuple.
    fn create_column_readers(
        resolver: &SchemaResolver<'_>,
        tuple_desc: &TupleDescriptor,
        is_top_level: bool,
        num_partition_keys: usize,
        ctx: &ScannerCtx,
        template: &mut Option<Vec<u8>>,
    ) -> Result<Vec<ColumnReader>> {
        let mut readers = Vec::new();
        // Each tuple can have at most one position slot; process it last.
        let mut pos_slot: Option<SlotDescriptor> = None;
        for slot in &tuple_desc.slots {
            if is_top_level && slot.col_pos < num_partition_keys {
                continue;
            }
            let resolution = resolver.resolve_path(&slot.col_path)?;
            if resolution.missing_field {
                let template = template.get_or_insert_with(|| vec![0u8; tuple_desc.byte_size]);
                set_null(template, slot.null_indicator);
                continue;
            }
            if resolution.pos_field {
                debug_assert!(pos_slot.is_none(), "one position slot per tuple");
                pos_slot = Some(slot.clone());
                continue;
            }
            let node = resolution.node.unwrap();
            let mut reader =
                create_reader(node, slot.slot_type.is_collection(), Some(slot.clone()), ctx);
            if let Some(collection) = reader.as_collection_mut() {
                let item_desc = slot.collection_item_descriptor.clone().ok_or_else(|| {
                    general_err!("collection slot '{}' has no item descriptor", slot.id)
                })?;
                let mut item_template = None;
                collection.children = Self::create_column_readers(
                    resolver,
                    &item_desc,
                    false,
                    0,
                    ctx,
                    &mut item_template,
                )?;
                collection.set_item_template(item_template);
            }
            readers.push(reader);
        }

        if readers.is_empty() {
            // Either count(*) over a collection, or no requested column
            // appears in this file. A single counting reader drives the
            // number of tuples to output.
            readers.push(Self::create_counting_reader(resolver, tuple_desc, ctx)?);
        }
        if let Some(pos_slot) = pos_slot {
            readers[0].set_pos_slot(pos_slot);
        }
        Ok(readers)
    }

    /// Creates a reader that counts tuples without reading any values.
    fn create_counting_reader(
        resolver: &SchemaResolver<'_>,
        tuple_desc: &TupleDescriptor,
        ctx: &ScannerCtx,
    ) -> Result<ColumnReader> {
        let resolution = resolver.resolve_path(&tuple_desc.tuple_path)?;
        if resolution.missing_field {
            return Err(general_err!(
                "could not find path {:?} in file",
                tuple_desc.tuple_path
            ));
        }
        let parent_node = resolution.node.unwrap();
        debug_assert!(tuple_desc.tuple_path.is_empty() || parent_node.is_repeated());

        if parent_node.children.is_empty() {
            // A repeated scalar node represents both the collection and its
            // item.
            return Ok(create_reader(parent_node, false, None, ctx));
        }
        // Use a non-struct child to drive the count.
        let mut target = &parent_node.children[0];
        while !target.children.is_empty() && !target.is_repeated() {
            target = &target.children[0];
        }
        let mut reader = create_reader(target, target.is_repeated(), None, ctx);
        if let Some(collection) = reader.as_collection_mut() {
            // Find the least-nested scalar descendant to drive the
            // collection reader; least nested as a heuristic for fewer
            // values to scan.
            let mut queue: VecDeque<&SchemaNode> = VecDeque::from([target]);
            let mut found = target;
            while let Some(node) = queue.pop_front() {
                if node.children.is_empty() {
                    found = node;
                    break;
                }
                for child in &node.children {
                    queue.push_back(child);
                }
            }
            debug_assert!(found.children.is_empty());
            collection.children.push(create_reader(found, false, None, ctx));
        }
        Ok(reader)
    }

    /// Iterates the row groups of the file and processes those whose
    /// mid-byte-offset lies inside this scanner's split.
    fn process_row_groups(&mut self) -> Result<()> {
        let row_groups = self.file_metadata.as_ref().unwrap().row_groups.clone();
        let split_offset = self.request.split_offset as i64;
        let split_len = self.request.split_len as i64;

        for (rg_idx, row_group) in row_groups.iter().enumerate() {
            if row_group.num_rows == 0 {
                continue;
            }
            validate_column_offsets(&self.request.path, self.request.file_len, row_group)?;

            let mid = row_group_mid_offset(row_group);
            if !(mid >= split_offset && mid < split_offset + split_len) {
                continue;
            }
            debug!(file = %self.ctx.filename, row_group = rg_idx, "processing row group");

            self.init_columns(row_group)?;

            // Row-group pruning from column statistics.
            if !self.eval_row_group_stats(row_group) {
                debug!(file = %self.ctx.filename, row_group = rg_idx, "pruned by statistics");
                continue;
            }

            // Seed collection and boolean readers; the typed scalar readers
            // use an optimized batched read that must not be seeded.
            let mut continue_execution = true;
            for reader in &mut self.column_readers {
                if reader.needs_seeding_for_batched_reading() {
                    continue_execution = reader.next_levels(&mut self.ctx);
                }
                if !continue_execution {
                    break;
                }
            }

            let mut filters_pass = true;
            if continue_execution {
                self.assemble_rows(row_group, rg_idx, &mut filters_pass);
            }

            // Surface or log this group's parse status, then reset it so
            // one bad group does not poison the scan in lenient mode.
            let parse_status = std::mem::replace(&mut self.ctx.parse_status, Ok(()));
            if let Err(e) = parse_status {
                if !e.is_control_flow() {
                    self.ctx.log_or_return(e)?;
                }
            }
            if self.ctx.reached_limit() || self.ctx.cancelled() || !filters_pass {
                break;
            }
        }
        Ok(())
    }

    /// Issues the column byte ranges of one row group (scheduled
    /// immediately, not demand-driven) and binds every scalar reader to its
    /// chunk.
    fn init_columns(&mut self, row_group: &RowGroup) -> Result<()> {
        let mut ranges = Vec::new();
        Self::init_column_readers(
            &mut self.column_readers,
            row_group,
            &self.ctx,
            self.io,
            &self.request,
            &mut ranges,
        )?;
        self.io.add_scan_ranges(ranges, true)?;
        Ok(())
    }

    fn init_column_readers(
        readers: &mut [ColumnReader],
        row_group: &RowGroup,
        ctx: &ScannerCtx,
        io: &dyn IoManager,
        request: &ScanRequest,
        ranges: &mut Vec<crate::scan::io::ScanRange>,
    ) -> Result<()> {
        // All column chunks materializing this tuple must agree on the
        // value count.
        let mut num_values: Option<i64> = None;
        for reader in readers.iter_mut() {
            if let Some(collection) = reader.as_collection_mut() {
                collection.reset();
                Self::init_column_readers(
                    &mut collection.children,
                    row_group,
                    ctx,
                    io,
                    request,
                    ranges,
                )?;
                continue;
            }

            let col_idx = reader.base().col_idx;
            let column = row_group.columns.get(col_idx as usize).ok_or_else(|| {
                ScanError::ColumnMetadataInvalid(format!(
                    "row group has no column {} for '{}'",
                    col_idx,
                    reader.base().column_name
                ))
            })?;
            let meta = &column.meta_data;

            match num_values {
                None => num_values = Some(meta.num_values),
                Some(expected) if expected != meta.num_values => {
                    return Err(ScanError::NumColValsError(format!(
                        "column {} declares {} values but {} were expected in file '{}'",
                        col_idx, meta.num_values, expected, request.path
                    )));
                }
                Some(_) => {}
            }

            Self::validate_column(reader, meta, ctx)?;

            let col_start = column_start_offset(meta);
            let col_len = meta.total_compressed_size;
            if col_len <= 0 {
                return Err(ScanError::ColumnMetadataInvalid(format!(
                    "file '{}' contains invalid column chunk size: {}",
                    request.path, col_len
                )));
            }
            let col_end = col_start + col_len;
            let mut range_len = col_len;
            if ctx.file_version.application == "parquet-mr" && ctx.file_version.version_lt(1, 2, 9)
            {
                // That writer did not include the dictionary page header in
                // total_compressed_size; pad to compensate, clamped to the
                // end of the file.
                let bytes_remaining = request.file_len as i64 - col_end;
                range_len += MAX_DICT_HEADER_SIZE.min(bytes_remaining.max(0));
            }
            if let Some(path) = &column.file_path {
                if path != &request.path {
                    return Err(general_err!(
                        "expected parquet column file path '{}' to match filename '{}'",
                        path,
                        request.path
                    ));
                }
            }

            let split_end = (request.split_offset + request.split_len) as i64;
            let column_range_local =
                col_start >= request.split_offset as i64 && col_end <= split_end;
            let range = io.allocate_scan_range(
                &request.path,
                range_len as u64,
                col_start as u64,
                col_idx,
                false,
                column_range_local,
                0,
            );
            ranges.push(range.clone());
            let stream = io.open_stream(&range)?;
            reader.reset(meta, stream, ctx)?;
        }
        Ok(())
    }

    /// Checks the chunk's declared encodings and codec, and the decimal
    /// metadata against the requested slot type.
    fn validate_column(
        reader: &ColumnReader,
        meta: &ColumnMetaData,
        ctx: &ScannerCtx,
    ) -> Result<()> {
        let base = reader.base();
        for encoding in &meta.encodings {
            if !encoding.is_supported() {
                return Err(ScanError::UnsupportedEncoding(format!(
                    "file '{}' uses an unsupported encoding {} for column '{}'",
                    ctx.filename, encoding, base.column_name
                )));
            }
        }
        if !matches!(
            meta.codec,
            Compression::UNCOMPRESSED | Compression::SNAPPY | Compression::GZIP
        ) {
            return Err(ScanError::UnsupportedCompression(format!(
                "file '{}' uses an unsupported compression {} for column '{}'",
                ctx.filename, meta.codec, base.column_name
            )));
        }

        let Some(slot) = &base.slot else {
            return Ok(());
        };
        let element = &base.element;
        let is_converted_type_decimal = element.converted_type == Some(ConvertedType::DECIMAL);
        if let ColumnType::Decimal { precision, scale } = slot.slot_type {
            // The scale and byte length are required to read the data at
            // all; reject the file if they make that impossible.
            if element.type_ != Some(Type::FIXED_LEN_BYTE_ARRAY) {
                return Err(ScanError::IncompatibleDecimal(format!(
                    "column '{}' should be a decimal column encoded using FIXED_LEN_BYTE_ARRAY",
                    base.column_name
                )));
            }
            let expected_len = decimal_size(precision);
            match element.type_length {
                None => {
                    return Err(ScanError::IncompatibleDecimal(format!(
                        "column '{}' does not have type_length set",
                        base.column_name
                    )))
                }
                Some(len) if len != expected_len => {
                    return Err(ScanError::IncompatibleDecimal(format!(
                        "column '{}' has an invalid type length. Expecting: {} len in file: {}",
                        base.column_name, expected_len, len
                    )))
                }
                Some(_) => {}
            }
            match element.scale {
                None => {
                    return Err(ScanError::IncompatibleDecimal(format!(
                        "column '{}' does not have the scale set",
                        base.column_name
                    )))
                }
                Some(file_scale) if file_scale != scale => {
                    return Err(ScanError::IncompatibleDecimal(format!(
                        "column '{}' has a scale that does not match the table metadata scale. File metadata scale: {} table metadata scale: {}",
                        base.column_name, file_scale, scale
                    )))
                }
                Some(_) => {}
            }
            // The remaining decimal metadata is not needed to read the
            // data; complain but keep going in lenient mode.
            match element.precision {
                None => ctx.log_or_return(ScanError::MissingPrecision(format!(
                    "file '{}' column '{}'",
                    ctx.filename, base.column_name
                )))?,
                Some(file_precision) if file_precision != precision => {
                    ctx.log_or_return(ScanError::WrongPrecision(format!(
                        "file '{}' column '{}': file {} table {}",
                        ctx.filename, base.column_name, file_precision, precision
                    )))?
                }
                Some(_) => {}
            }
            if !is_converted_type_decimal {
                ctx.log_or_return(ScanError::BadConvertedType(format!(
                    "file '{}' column '{}' is not annotated as DECIMAL",
                    ctx.filename, base.column_name
                )))?;
            }
        } else if element.scale.is_some()
            || element.precision.is_some()
            || is_converted_type_decimal
        {
            ctx.log_or_return(ScanError::IncompatibleDecimal(format!(
                "file '{}' column '{}' carries decimal metadata but slot type is {:?}",
                ctx.filename, base.column_name, slot.slot_type
            )))?;
        }
        Ok(())
    }

    /// Builds a min/max 2-tuple row from the row group's numeric statistics
    /// and scores the statistics conjuncts; false means the whole group can
    /// be skipped.
    fn eval_row_group_stats(&mut self, row_group: &RowGroup) -> bool {
        if self.stats_conjuncts.is_empty() {
            return true;
        }
        let desc = &self.request.tuple_desc;
        let mut min_tuple = vec![0u8; desc.byte_size];
        let mut max_tuple = vec![0u8; desc.byte_size];

        for reader in &self.column_readers {
            let base = reader.base();
            let Some(slot) = &base.slot else { continue };
            if reader.is_collection_reader() {
                continue;
            }
            let statistics = row_group
                .columns
                .get(base.col_idx as usize)
                .and_then(|c| c.meta_data.statistics.as_ref());

            // Only the numeric encodings are trusted: little-endian
            // integers and IEEE 754 floats.
            let stat_width = match slot.slot_type {
                ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int => 4,
                ColumnType::Float => 4,
                ColumnType::BigInt | ColumnType::Double => 8,
                _ => 0,
            };
            let (min, max) = match statistics {
                Some(s) => (s.min.as_deref(), s.max.as_deref()),
                None => (None, None),
            };
            let slot_size = slot.slot_type.slot_byte_size();
            let mut write = |tuple: &mut [u8], value: Option<&[u8]>| match value {
                Some(bytes) if stat_width > 0 && bytes.len() == stat_width => {
                    let n = slot_size.min(stat_width);
                    slot_bytes_mut(tuple, slot)[..n].copy_from_slice(&bytes[..n]);
                }
                _ => set_null(tuple, slot.null_indicator),
            };
            write(&mut min_tuple, min);
            write(&mut max_tuple, max);
        }

        let min_row = TupleRow {
            tuple: &min_tuple,
            desc,
            pool: &self.scratch.pool,
        };
        let max_row = TupleRow {
            tuple: &max_tuple,
            desc,
            pool: &self.scratch.pool,
        };
        self.stats_conjuncts
            .iter()
            .all(|c| c.eval_stats(&min_row, &max_row))
    }

    /// The assemble loop: populate the scratch batch column by column, then
    /// move survivors to the output until the row group is exhausted.
    fn assemble_rows(
        &mut self,
        row_group: &RowGroup,
        rg_idx: usize,
        filters_pass: &mut bool,
    ) -> bool {
        let mut rows_read: i64 = 0;
        let mut continue_execution = !self.ctx.reached_limit() && !self.ctx.cancelled();
        while !self.column_readers[0].row_group_at_end() {
            if !continue_execution {
                break;
            }

            // Apply runtime filters to the static partition-key values; if
            // any fails the whole row group is rejected.
            if let Some(template) = &self.template_tuple {
                let template_row = TupleRow {
                    tuple: template,
                    desc: &self.request.tuple_desc,
                    pool: &self.scratch.pool,
                };
                if !self.filters.partition_passes(&template_row) {
                    *filters_pass = false;
                    return false;
                }
            }

            // Start a new scratch batch with every tuple initialized from
            // the template.
            self.scratch.reset();
            let capacity = self.scratch.capacity();
            let tuple_size = self.scratch.tuple_byte_size;
            match &self.template_tuple {
                Some(template) => {
                    for i in 0..capacity {
                        self.scratch.tuple_mut(i).copy_from_slice(template);
                    }
                }
                None => self.scratch.tuple_mem.fill(0),
            }

            // Materialize the top-level slots column by column.
            let mut last_num_tuples: Option<usize> = None;
            for reader in &mut self.column_readers {
                let mut num_tuples = 0;
                let ok = if reader.max_rep_level() > 0 {
                    reader.read_value_batch(
                        &mut self.scratch.pool,
                        capacity,
                        tuple_size,
                        &mut self.scratch.tuple_mem,
                        &mut num_tuples,
                        &mut self.ctx,
                    )
                } else {
                    reader.read_non_repeated_value_batch(
                        &mut self.scratch.pool,
                        capacity,
                        tuple_size,
                        &mut self.scratch.tuple_mem,
                        &mut num_tuples,
                        &mut self.ctx,
                    )
                };
                self.scratch.num_tuples = num_tuples;
                if !ok {
                    return false;
                }
                if let Some(last) = last_num_tuples {
                    if last != num_tuples {
                        self.ctx.merge_status(general_err!(
                            "column readers of file '{}' populated {} and {} tuples for the same rows",
                            self.ctx.filename,
                            last,
                            num_tuples
                        ));
                        return false;
                    }
                }
                last_num_tuples = Some(num_tuples);
            }

            // Page buffers the readers moved past now belong downstream.
            for reader in &mut self.column_readers {
                reader.transfer_decompressed_buffers(&mut self.scratch.pool);
            }

            // Move survivors to the output until the scratch batch is
            // drained.
            while !self.scratch.at_end() {
                let committed = self.transfer_scratch_tuples();
                self.ctx.rows_returned += committed as i64;
                if self.ctx.reached_limit() || !self.ctx.parse_status_ok() {
                    break;
                }
            }

            rows_read += self.scratch.num_tuples as i64;
            continue_execution &= self.ctx.parse_status_ok();
            continue_execution &= !self.ctx.reached_limit() && !self.ctx.cancelled();
        }

        if self.column_readers[0].row_group_at_end() && self.ctx.parse_status_ok() {
            if let Err(e) = self.validate_end_of_row_group(row_group, rg_idx, rows_read) {
                self.ctx.merge_status(e);
            }
            continue_execution &= self.ctx.parse_status_ok();
        }
        continue_execution
    }

    /// Walks the scratch batch, evaluating runtime filters and conjuncts,
    /// appending survivors to the current output batch. Returns the number
    /// of committed rows.
    fn transfer_scratch_tuples(&mut self) -> usize {
        let tuple_size = self.scratch.tuple_byte_size;
        let batch_capacity = self.ctx.options.batch_size;
        let tracker = self.ctx.mem_tracker.clone();
        let batch = self
            .current_batch
            .get_or_insert_with(|| RowBatch::new(tuple_size, batch_capacity, tracker));
        debug_assert!(!batch.at_capacity());

        if tuple_size == 0 {
            // A collection of empty tuples: no predicate evaluation, no
            // memory to transfer.
            let n = (batch.capacity() - batch.num_rows())
                .min(self.scratch.num_tuples - self.scratch.tuple_idx);
            batch.add_empty_rows(n);
            self.scratch.tuple_idx += n;
            if batch.at_capacity() {
                self.flush_current_batch();
            }
            return n;
        }

        let has_filters = !self.filters.is_empty();
        let has_conjuncts = !self.conjuncts.is_empty();
        let mut committed = 0;
        while self.scratch.tuple_idx < self.scratch.num_tuples {
            let batch = self.current_batch.as_mut().unwrap();
            if batch.at_capacity() {
                break;
            }
            let idx = self.scratch.tuple_idx;
            self.scratch.tuple_idx += 1;
            let tuple = self.scratch.tuple(idx);
            let row = TupleRow {
                tuple,
                desc: &self.request.tuple_desc,
                pool: &self.scratch.pool,
            };
            if has_filters && !self.filters.eval(&row) {
                continue;
            }
            if has_conjuncts && !eval_conjuncts(&self.conjuncts, &row) {
                continue;
            }
            // Row survived runtime filters and conjuncts. Its pool-backed
            // payloads move with it, so the batch stays self-contained even
            // when it fills while the scratch batch is only partially
            // drained.
            if let Err(e) =
                batch.add_row_copying_payloads(tuple, &self.request.tuple_desc, &self.scratch.pool)
            {
                self.ctx.merge_status(e);
                break;
            }
            committed += 1;
        }

        // Once the scratch batch is fully drained, the output batch takes
        // ownership of the remaining scratch memory: the page buffers the
        // readers released and the staging copies of the payloads.
        if self.scratch.at_end() {
            let batch = self.current_batch.as_mut().unwrap();
            batch.pool.acquire_data(&mut self.scratch.pool);
        }
        let batch = self.current_batch.as_mut().unwrap();
        if batch.at_capacity() {
            self.flush_current_batch();
        }
        committed
    }

    /// Post-conditions of a fully processed row group.
    fn validate_end_of_row_group(
        &self,
        row_group: &RowGroup,
        rg_idx: usize,
        rows_read: i64,
    ) -> Result<()> {
        if self.column_readers[0].max_rep_level() == 0 && rows_read != row_group.num_rows {
            return Err(ScanError::GroupRowCountError(format!(
                "file '{}' row group {}: metadata states {} rows but read {}",
                self.ctx.filename, rg_idx, row_group.num_rows, rows_read
            )));
        }

        // Only the top-level scalar readers advance in lockstep; nested
        // item columns legitimately carry different value counts.
        let states: Vec<LeafReaderState> = self
            .column_readers
            .iter()
            .filter_map(|r| r.leaf_state())
            .collect();
        let mut num_values_read: Option<i64> = None;
        for state in states {
            // All readers should have exhausted their final data page; a
            // column with more values than its metadata states would still
            // have unread values here.
            if state.num_buffered_values != 0 {
                return Err(ScanError::ColumnMetadataInvalid(format!(
                    "file '{}': metadata reports {} fewer values in data page than actually present",
                    self.ctx.filename, state.num_buffered_values
                )));
            }
            match num_values_read {
                None => num_values_read = Some(state.num_values_read),
                Some(expected) if expected != state.num_values_read => {
                    return Err(ScanError::NumColValsError(format!(
                        "file '{}': column {} read {} values, others read {}",
                        self.ctx.filename, state.col_idx, state.num_values_read, expected
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn current_batch_mut(&mut self) -> &mut RowBatch {
        let tuple_size = self.request.tuple_desc.byte_size;
        let capacity = self.ctx.options.batch_size;
        let tracker = self.ctx.mem_tracker.clone();
        self.current_batch
            .get_or_insert_with(|| RowBatch::new(tuple_size, capacity, tracker))
    }

    fn flush_current_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if batch.num_rows() > 0 {
                self.output.push(batch);
            }
        }
    }

    /// Final cleanup: flush the partial output batch and release reader
    /// memory into it.
    fn close(&mut self) {
        let mut buffers = std::mem::replace(
            &mut self.scratch.pool,
            crate::memory::MemPool::new(self.ctx.mem_tracker.clone()),
        );
        for reader in &mut self.column_readers {
            reader.transfer_decompressed_buffers(&mut buffers);
        }
        if let Some(batch) = self.current_batch.as_mut() {
            batch.pool.acquire_data(&mut buffers);
        }
        self.flush_current_batch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::basic::{Encoding, Repetition};
    use crate::data_type::TimestampValue;
    use crate::scan::conjuncts::{CompareOp, Literal, SlotCompare, SlotIsNotNull, StatsSlotCompare};
    use crate::scan::descriptors::{path, read_collection_slot, slot_bytes, SlotValue};
    use crate::scan::filter::BloomFilter;
    use crate::scan::io::InMemoryIoManager;
    use crate::util::test_common::{
        bit_packed_levels, group, leaf, make_data_page, make_dict_page, plain_encode_bools,
        plain_encode_i64s, plain_encode_strings, plain_encode_timestamps, rle_dict_indices,
        schema_elements, ColumnChunkSpec, FileBuilder,
    };

    struct ScanHarness {
        file: Bytes,
        tuple_desc: Arc<TupleDescriptor>,
        table_cols: Vec<ColumnDesc>,
        options: ScanOptions,
        conjuncts: Vec<Box<dyn ConjunctEval>>,
        stats_conjuncts: Vec<Box<dyn StatsConjunctEval>>,
        filters: Vec<FilterContext>,
        split: Option<(u64, u64)>,
    }

    impl ScanHarness {
        fn new(file: Bytes, tuple_desc: TupleDescriptor, table_cols: Vec<ColumnDesc>) -> Self {
            ScanHarness {
                file,
                tuple_desc: Arc::new(tuple_desc),
                table_cols,
                options: ScanOptions::default(),
                conjuncts: Vec::new(),
                stats_conjuncts: Vec::new(),
                filters: Vec::new(),
                split: None,
            }
        }

        fn run(self) -> Result<Vec<RowBatch>> {
            let io = InMemoryIoManager::new("f", self.file.clone());
            let file_len = self.file.len() as u64;
            let (split_offset, split_len) = self.split.unwrap_or((0, file_len));
            let request = ScanRequest {
                path: "f".into(),
                file_len,
                split_offset,
                split_len,
                tuple_desc: self.tuple_desc,
                table_cols: self.table_cols,
                num_partition_keys: 0,
                template_tuple: None,
                limit: None,
            };
            let mut scanner = ParquetScanner::new(
                &io,
                request,
                self.options,
                self.conjuncts,
                self.stats_conjuncts,
                self.filters,
                Arc::new(MemTracker::new_root("test")),
            );
            scanner.process_split()
        }
    }

    fn total_rows(batches: &[RowBatch]) -> usize {
        batches.iter().map(|b| b.num_rows()).sum()
    }

    /// Levels for an OPTIONAL flat column from an iterator of presence
    /// flags.
    fn def_levels_from(present: &[bool]) -> Vec<u8> {
        present.iter().map(|&p| p as u8).collect()
    }

    fn id_name_schema() -> Vec<crate::format::SchemaElement> {
        schema_elements(
            vec![
                leaf("id", Type::INT64, Repetition::REQUIRED),
                leaf("name", Type::BYTE_ARRAY, Repetition::OPTIONAL),
            ],
            2,
        )
    }

    fn id_name_table() -> Vec<ColumnDesc> {
        vec![
            ColumnDesc {
                name: "id".into(),
                col_type: ColumnType::BigInt,
            },
            ColumnDesc {
                name: "name".into(),
                col_type: ColumnType::String,
            },
        ]
    }

    fn id_name_tuple() -> TupleDescriptor {
        TupleDescriptor::new(
            vec![(vec![0], 0, ColumnType::BigInt), (vec![1], 1, ColumnType::String)],
            vec![],
        )
    }

    /// Builds a file with one row group of `ids`, where `name` is
    /// `name_<id>` for ids not divisible by 3 and NULL otherwise.
    fn id_name_file(ids: &[i64], codec: Compression) -> Bytes {
        let mut builder = FileBuilder::new(id_name_schema());
        builder.row_groups.push((
            ids.len() as i64,
            id_name_row_group(ids, codec),
        ));
        builder.build()
    }

    fn id_name_row_group(ids: &[i64], codec: Compression) -> Vec<ColumnChunkSpec> {
        let present: Vec<bool> = ids.iter().map(|id| id % 3 != 0).collect();
        let names: Vec<String> = ids
            .iter()
            .filter(|id| *id % 3 != 0)
            .map(|id| format!("name_{id}"))
            .collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        vec![
            ColumnChunkSpec {
                type_: Type::INT64,
                path_in_schema: vec!["id".into()],
                codec,
                num_values: ids.len() as i64,
                pages: vec![make_data_page(
                    ids.len(),
                    0,
                    &[],
                    0,
                    &[],
                    Encoding::PLAIN,
                    &plain_encode_i64s(ids),
                    codec,
                )],
                statistics: Some(crate::format::Statistics {
                    min: Some(ids.iter().min().unwrap().to_le_bytes().to_vec()),
                    max: Some(ids.iter().max().unwrap().to_le_bytes().to_vec()),
                    null_count: None,
                    distinct_count: None,
                }),
            },
            ColumnChunkSpec {
                type_: Type::BYTE_ARRAY,
                path_in_schema: vec!["name".into()],
                codec,
                num_values: ids.len() as i64,
                pages: vec![make_data_page(
                    ids.len(),
                    1,
                    &def_levels_from(&present),
                    0,
                    &[],
                    Encoding::PLAIN,
                    &plain_encode_strings(&name_refs),
                    codec,
                )],
                statistics: None,
            },
        ]
    }

    fn check_id_name_rows(batches: &[RowBatch], expected_ids: &[i64]) {
        let desc = id_name_tuple();
        let mut it = expected_ids.iter();
        for batch in batches {
            for i in 0..batch.num_rows() {
                let id = *it.next().expect("more rows than expected");
                let tuple = batch.row(i);
                let row = TupleRow {
                    tuple,
                    desc: &desc,
                    pool: &batch.pool,
                };
                assert_eq!(row.slot_value(0), SlotValue::BigInt(id));
                if id % 3 != 0 {
                    let expected = format!("name_{id}");
                    assert_eq!(row.slot_value(1), SlotValue::String(expected.as_bytes()));
                } else {
                    assert_eq!(row.slot_value(1), SlotValue::Null);
                }
            }
        }
        assert!(it.next().is_none(), "fewer rows than expected");
    }

    #[test]
    fn test_round_trip_plain_uncompressed() {
        let ids: Vec<i64> = (0..100).collect();
        let file = id_name_file(&ids, Compression::UNCOMPRESSED);
        let batches = ScanHarness::new(file, id_name_tuple(), id_name_table())
            .run()
            .unwrap();
        assert_eq!(total_rows(&batches), 100);
        check_id_name_rows(&batches, &ids);
    }

    #[test]
    fn test_round_trip_small_batches() {
        let ids: Vec<i64> = (0..1000).collect();
        let file = id_name_file(&ids, Compression::GZIP);
        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.options.batch_size = 17;
        let batches = harness.run().unwrap();
        assert_eq!(total_rows(&batches), 1000);
        check_id_name_rows(&batches, &ids);
    }

    #[test]
    fn test_round_trip_dictionary_snappy() {
        let dict = ["red", "green", "blue", "violet"];
        let num_rows = 200usize;
        let indices: Vec<u64> = (0..num_rows as u64).map(|i| i % 4).collect();
        let present = vec![true; num_rows];

        let schema = schema_elements(
            vec![leaf("color", Type::BYTE_ARRAY, Repetition::OPTIONAL)],
            1,
        );
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            num_rows as i64,
            vec![ColumnChunkSpec {
                type_: Type::BYTE_ARRAY,
                path_in_schema: vec!["color".into()],
                codec: Compression::SNAPPY,
                num_values: num_rows as i64,
                pages: vec![
                    make_dict_page(
                        &plain_encode_strings(&dict),
                        dict.len(),
                        Compression::SNAPPY,
                        true,
                    ),
                    make_data_page(
                        num_rows,
                        1,
                        &def_levels_from(&present),
                        0,
                        &[],
                        Encoding::PLAIN_DICTIONARY,
                        &rle_dict_indices(2, &indices),
                        Compression::SNAPPY,
                    ),
                ],
                statistics: None,
            }],
        ));
        let file = builder.build();

        let tuple_desc = TupleDescriptor::new(vec![(vec![0], 0, ColumnType::String)], vec![]);
        let table = vec![ColumnDesc {
            name: "color".into(),
            col_type: ColumnType::String,
        }];
        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        assert_eq!(total_rows(&batches), num_rows);
        let mut row_idx = 0usize;
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let row = TupleRow {
                    tuple: batch.row(i),
                    desc: &tuple_desc,
                    pool: &batch.pool,
                };
                let expected = dict[row_idx % 4];
                assert_eq!(row.slot_value(0), SlotValue::String(expected.as_bytes()));
                row_idx += 1;
            }
        }
    }

    /// A split must process exactly the row groups whose mid points fall
    /// inside it.
    #[test]
    fn test_row_group_split_selection() {
        let groups: Vec<Vec<i64>> = vec![
            (0..10).collect(),
            (10..20).collect(),
            (20..30).collect(),
        ];
        let mut builder = FileBuilder::new(id_name_schema());
        for ids in &groups {
            builder
                .row_groups
                .push((ids.len() as i64, id_name_row_group(ids, Compression::UNCOMPRESSED)));
        }
        let file = builder.build();

        // Recover the mid points from the footer.
        let io = InMemoryIoManager::new("f", file.clone());
        let file_len = file.len() as u64;
        let footer_len = FOOTER_RANGE_SIZE.min(file_len);
        let range =
            io.allocate_scan_range("f", footer_len, file_len - footer_len, -1, false, false, 0);
        let mut stream = io.open_stream(&range).unwrap();
        let metadata = process_footer(stream.as_mut(), &io, "f", file_len).unwrap();
        let mids: Vec<i64> = metadata
            .row_groups
            .iter()
            .map(row_group_mid_offset)
            .collect();
        assert!(mids[0] < mids[1] && mids[1] < mids[2]);

        // Split that covers the first two mid points only.
        let mut harness = ScanHarness::new(file.clone(), id_name_tuple(), id_name_table());
        harness.split = Some((0, mids[2] as u64));
        let batches = harness.run().unwrap();
        let expected: Vec<i64> = (0..20).collect();
        assert_eq!(total_rows(&batches), 20);
        check_id_name_rows(&batches, &expected);

        // The complementary split picks up the rest.
        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.split = Some((mids[2] as u64, file_len - mids[2] as u64));
        let batches = harness.run().unwrap();
        let expected: Vec<i64> = (20..30).collect();
        check_id_name_rows(&batches, &expected);
    }

    /// Three-level list of optional int32 items with a position slot.
    #[test]
    fn test_nested_array_round_trip() {
        // Rows: [1,2,3], [], NULL, [4, NULL]
        let schema = schema_elements(
            vec![
                group("tags", Repetition::OPTIONAL, 1),
                group("list", Repetition::REPEATED, 1),
                leaf("item", Type::INT32, Repetition::OPTIONAL),
            ],
            1,
        );
        let def_levels = [3u8, 3, 3, 1, 0, 3, 2];
        let rep_levels = [0u8, 1, 1, 0, 0, 0, 1];
        let values = crate::util::test_common::plain_encode_i32s(&[1, 2, 3, 4]);
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            4,
            vec![ColumnChunkSpec {
                type_: Type::INT32,
                path_in_schema: vec!["tags".into(), "list".into(), "item".into()],
                codec: Compression::UNCOMPRESSED,
                num_values: 7,
                pages: vec![make_data_page(
                    7,
                    3,
                    &def_levels,
                    1,
                    &rep_levels,
                    Encoding::PLAIN,
                    &values,
                    Compression::UNCOMPRESSED,
                )],
                statistics: None,
            }],
        ));
        let file = builder.build();

        let item_desc = Arc::new(TupleDescriptor::new(
            vec![
                (vec![0, path::ARRAY_ITEM], 0, ColumnType::Int),
                (vec![0, path::ARRAY_POS], 1, ColumnType::BigInt),
            ],
            vec![0],
        ));
        let tuple_desc = TupleDescriptor::with_item_descriptors(
            vec![(
                vec![0],
                0,
                ColumnType::Array(Box::new(ColumnType::Int)),
                Some(Arc::clone(&item_desc)),
            )],
            vec![],
        );
        let table = vec![ColumnDesc {
            name: "tags".into(),
            col_type: ColumnType::Array(Box::new(ColumnType::Int)),
        }];

        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        assert_eq!(total_rows(&batches), 4);
        let batch = &batches[0];

        let collection = |row_idx: usize| {
            let tuple = batch.row(row_idx);
            let slot = &tuple_desc.slots[0];
            if crate::scan::descriptors::is_null(tuple, slot.null_indicator) {
                None
            } else {
                Some(read_collection_slot(slot_bytes(tuple, slot)))
            }
        };

        // Row 0: three items with positions 0, 1, 2.
        let (r, count) = collection(0).unwrap();
        assert_eq!(count, 3);
        let items = batch.pool.get(r, count * item_desc.byte_size).unwrap().to_vec();
        for (i, expected) in [1i32, 2, 3].iter().enumerate() {
            let tuple = &items[i * item_desc.byte_size..(i + 1) * item_desc.byte_size];
            let row = TupleRow {
                tuple,
                desc: &item_desc,
                pool: &batch.pool,
            };
            assert_eq!(row.slot_value(0), SlotValue::Int(*expected));
            assert_eq!(row.slot_value(1), SlotValue::BigInt(i as i64));
        }

        // Rows 1 and 2: empty and NULL lists both come back as NULL slots.
        assert!(collection(1).is_none());
        assert!(collection(2).is_none());

        // Row 3: one value and one NULL item, positions 0 and 1.
        let (r, count) = collection(3).unwrap();
        assert_eq!(count, 2);
        let items = batch.pool.get(r, count * item_desc.byte_size).unwrap().to_vec();
        let first = TupleRow {
            tuple: &items[..item_desc.byte_size],
            desc: &item_desc,
            pool: &batch.pool,
        };
        assert_eq!(first.slot_value(0), SlotValue::Int(4));
        assert_eq!(first.slot_value(1), SlotValue::BigInt(0));
        let second = TupleRow {
            tuple: &items[item_desc.byte_size..],
            desc: &item_desc,
            pool: &batch.pool,
        };
        assert_eq!(second.slot_value(0), SlotValue::Null);
        assert_eq!(second.slot_value(1), SlotValue::BigInt(1));
    }

    /// count(*): no materialized slots, the scan is served from the footer.
    #[test]
    fn test_zero_slot_scan() {
        let ids: Vec<i64> = (0..5000).collect();
        let file = id_name_file(&ids, Compression::UNCOMPRESSED);
        let tuple_desc = TupleDescriptor::new(vec![], vec![]);
        let batches = ScanHarness::new(file, tuple_desc, id_name_table()).run().unwrap();
        assert_eq!(total_rows(&batches), 5000);
        for batch in &batches {
            assert_eq!(batch.tuple_byte_size, 0);
        }
    }

    /// A requested column absent from the file NULLs the slot via the
    /// template tuple.
    #[test]
    fn test_missing_column_resolves_to_null() {
        let ids: Vec<i64> = (0..10).collect();
        let file = id_name_file(&ids, Compression::UNCOMPRESSED);
        let tuple_desc = TupleDescriptor::new(
            vec![(vec![0], 0, ColumnType::BigInt), (vec![2], 2, ColumnType::Int)],
            vec![],
        );
        let mut table = id_name_table();
        table.push(ColumnDesc {
            name: "added_later".into(),
            col_type: ColumnType::Int,
        });
        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        assert_eq!(total_rows(&batches), 10);
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let row = TupleRow {
                    tuple: batch.row(i),
                    desc: &tuple_desc,
                    pool: &batch.pool,
                };
                assert!(matches!(row.slot_value(0), SlotValue::BigInt(_)));
                assert_eq!(row.slot_value(1), SlotValue::Null);
            }
        }
    }

    #[test]
    fn test_conjunct_filtering() {
        let ids: Vec<i64> = (0..100).collect();
        let file = id_name_file(&ids, Compression::UNCOMPRESSED);
        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.conjuncts.push(Box::new(SlotCompare {
            slot_id: 0,
            op: CompareOp::Lt,
            literal: Literal::Int(50),
        }));
        let batches = harness.run().unwrap();
        let expected: Vec<i64> = (0..50).collect();
        assert_eq!(total_rows(&batches), 50);
        check_id_name_rows(&batches, &expected);
    }

    /// Statistics pruning must skip a row group whose [min, max] range
    /// cannot satisfy the predicate.
    #[test]
    fn test_row_group_stats_pruning() {
        let mut builder = FileBuilder::new(id_name_schema());
        let low: Vec<i64> = (0..10).collect();
        let high: Vec<i64> = (100..110).collect();
        builder
            .row_groups
            .push((10, id_name_row_group(&low, Compression::UNCOMPRESSED)));
        builder
            .row_groups
            .push((10, id_name_row_group(&high, Compression::UNCOMPRESSED)));
        let file = builder.build();

        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.stats_conjuncts.push(Box::new(StatsSlotCompare {
            slot_id: 0,
            op: CompareOp::Lt,
            literal: Literal::Int(50),
        }));
        let batches = harness.run().unwrap();
        assert_eq!(total_rows(&batches), 10);
        check_id_name_rows(&batches, &low);
    }

    /// CHAR(5) slots: short values are space padded, long values truncated.
    #[test]
    fn test_char_padding_scan() {
        let schema = schema_elements(
            vec![leaf("code", Type::BYTE_ARRAY, Repetition::REQUIRED)],
            1,
        );
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            2,
            vec![ColumnChunkSpec {
                type_: Type::BYTE_ARRAY,
                path_in_schema: vec!["code".into()],
                codec: Compression::UNCOMPRESSED,
                num_values: 2,
                pages: vec![make_data_page(
                    2,
                    0,
                    &[],
                    0,
                    &[],
                    Encoding::PLAIN,
                    &plain_encode_strings(&["ab", "abcdef"]),
                    Compression::UNCOMPRESSED,
                )],
                statistics: None,
            }],
        ));
        let file = builder.build();

        let tuple_desc = TupleDescriptor::new(vec![(vec![0], 0, ColumnType::Char(5))], vec![]);
        let table = vec![ColumnDesc {
            name: "code".into(),
            col_type: ColumnType::Char(5),
        }];
        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);
        let value = |i: usize| {
            match (TupleRow {
                tuple: batch.row(i),
                desc: &tuple_desc,
                pool: &batch.pool,
            })
            .slot_value(0)
            {
                SlotValue::String(s) => s.to_vec(),
                other => panic!("unexpected value {other:?}"),
            }
        };
        assert_eq!(value(0), b"ab   ");
        assert_eq!(value(1), b"abcde");
    }

    /// A dictionary page with no dictionary header is accepted only for the
    /// impala writer versions that had the bug.
    #[test]
    fn test_headerless_dictionary_versions() {
        let build = |created_by: &str| -> Bytes {
            let schema = schema_elements(
                vec![leaf("color", Type::BYTE_ARRAY, Repetition::REQUIRED)],
                1,
            );
            let mut builder = FileBuilder::new(schema);
            builder.created_by = Some(created_by.to_owned());
            builder.row_groups.push((
                3,
                vec![ColumnChunkSpec {
                    type_: Type::BYTE_ARRAY,
                    path_in_schema: vec!["color".into()],
                    codec: Compression::UNCOMPRESSED,
                    num_values: 3,
                    pages: vec![
                        make_dict_page(
                            &plain_encode_strings(&["x", "y"]),
                            2,
                            Compression::UNCOMPRESSED,
                            false,
                        ),
                        make_data_page(
                            3,
                            0,
                            &[],
                            0,
                            &[],
                            Encoding::PLAIN_DICTIONARY,
                            &rle_dict_indices(1, &[0, 1, 0]),
                            Compression::UNCOMPRESSED,
                        ),
                    ],
                    statistics: None,
                }],
            ));
            builder.build()
        };
        let tuple_desc = || TupleDescriptor::new(vec![(vec![0], 0, ColumnType::String)], vec![]);
        let table = || {
            vec![ColumnDesc {
                name: "color".into(),
                col_type: ColumnType::String,
            }]
        };

        let batches = ScanHarness::new(build("impala version 1.1.0"), tuple_desc(), table())
            .run()
            .unwrap();
        assert_eq!(total_rows(&batches), 3);

        let err = ScanHarness::new(build("impala version 1.3.0"), tuple_desc(), table())
            .run()
            .unwrap_err();
        assert!(matches!(err, ScanError::CorruptDictionary(_)));
    }

    /// Booleans and INT96 timestamps exercise the remaining physical
    /// decoders end to end.
    #[test]
    fn test_bool_and_timestamp_columns() {
        let flags = [true, false, true, true, false];
        let timestamps: Vec<TimestampValue> = (0..5)
            .map(|i| TimestampValue {
                nanos_of_day: i as i64 * 1_000_000_000,
                julian_day: 2_440_588 + i,
            })
            .collect();

        let schema = schema_elements(
            vec![
                leaf("flag", Type::BOOLEAN, Repetition::REQUIRED),
                leaf("ts", Type::INT96, Repetition::REQUIRED),
            ],
            2,
        );
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            5,
            vec![
                ColumnChunkSpec {
                    type_: Type::BOOLEAN,
                    path_in_schema: vec!["flag".into()],
                    codec: Compression::UNCOMPRESSED,
                    num_values: 5,
                    pages: vec![make_data_page(
                        5,
                        0,
                        &[],
                        0,
                        &[],
                        Encoding::PLAIN,
                        &plain_encode_bools(&flags),
                        Compression::UNCOMPRESSED,
                    )],
                    statistics: None,
                },
                ColumnChunkSpec {
                    type_: Type::INT96,
                    path_in_schema: vec!["ts".into()],
                    codec: Compression::UNCOMPRESSED,
                    num_values: 5,
                    pages: vec![make_data_page(
                        5,
                        0,
                        &[],
                        0,
                        &[],
                        Encoding::PLAIN,
                        &plain_encode_timestamps(&timestamps),
                        Compression::UNCOMPRESSED,
                    )],
                    statistics: None,
                },
            ],
        ));
        let file = builder.build();

        let tuple_desc = TupleDescriptor::new(
            vec![
                (vec![0], 0, ColumnType::Boolean),
                (vec![1], 1, ColumnType::Timestamp),
            ],
            vec![],
        );
        let table = vec![
            ColumnDesc {
                name: "flag".into(),
                col_type: ColumnType::Boolean,
            },
            ColumnDesc {
                name: "ts".into(),
                col_type: ColumnType::Timestamp,
            },
        ];
        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 5);
        for i in 0..5 {
            let row = TupleRow {
                tuple: batch.row(i),
                desc: &tuple_desc,
                pool: &batch.pool,
            };
            assert_eq!(row.slot_value(0), SlotValue::Boolean(flags[i]));
            assert_eq!(row.slot_value(1), SlotValue::Timestamp(timestamps[i]));
        }
    }

    /// Runtime bloom filter integration: rows whose key was never inserted
    /// are rejected.
    #[test]
    fn test_runtime_bloom_filter() {
        let ids: Vec<i64> = (0..1000).collect();
        let file = id_name_file(&ids, Compression::UNCOMPRESSED);
        let mut bloom = BloomFilter::with_log_num_blocks(6);
        for id in (0..1000i64).filter(|id| id % 10 == 0) {
            bloom.insert_value(&SlotValue::BigInt(id));
        }
        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.filters.push(FilterContext {
            filter: Arc::new(bloom),
            slot_id: 0,
            applies_to_partition: false,
        });
        let batches = harness.run().unwrap();
        let desc = id_name_tuple();
        let mut survivors = Vec::new();
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let row = TupleRow {
                    tuple: batch.row(i),
                    desc: &desc,
                    pool: &batch.pool,
                };
                match row.slot_value(0) {
                    SlotValue::BigInt(v) => survivors.push(v),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        // Every inserted key survives; false positives are possible but
        // bounded.
        for id in (0..1000i64).filter(|id| id % 10 == 0) {
            assert!(survivors.contains(&id));
        }
        assert!(survivors.len() < 300, "survivors: {}", survivors.len());
    }

    /// Deprecated BIT_PACKED definition levels still decode.
    #[test]
    fn test_bit_packed_def_levels() {
        let present = [true, false, true];
        let schema = schema_elements(
            vec![leaf("v", Type::INT64, Repetition::OPTIONAL)],
            1,
        );
        let mut raw = bit_packed_levels(1, &def_levels_from(&present)).to_vec();
        raw.extend_from_slice(&plain_encode_i64s(&[7, 9]));
        let mut page = make_data_page(
            3,
            0,
            &[],
            0,
            &[],
            Encoding::PLAIN,
            &raw,
            Compression::UNCOMPRESSED,
        );
        page.header.data_page_header.as_mut().unwrap().definition_level_encoding =
            Encoding::BIT_PACKED;
        // The page was built as if max_def were zero; declare the real
        // level layout instead.
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            3,
            vec![ColumnChunkSpec {
                type_: Type::INT64,
                path_in_schema: vec!["v".into()],
                codec: Compression::UNCOMPRESSED,
                num_values: 3,
                pages: vec![page],
                statistics: None,
            }],
        ));
        let file = builder.build();

        let tuple_desc = TupleDescriptor::new(vec![(vec![0], 0, ColumnType::BigInt)], vec![]);
        let table = vec![ColumnDesc {
            name: "v".into(),
            col_type: ColumnType::BigInt,
        }];
        let batches = ScanHarness::new(file, tuple_desc.clone(), table).run().unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 3);
        let expected = [
            SlotValue::BigInt(7),
            SlotValue::Null,
            SlotValue::BigInt(9),
        ];
        for (i, expected) in expected.iter().enumerate() {
            let row = TupleRow {
                tuple: batch.row(i),
                desc: &tuple_desc,
                pool: &batch.pool,
            };
            assert_eq!(row.slot_value(0), *expected);
        }
    }

    /// Output batches must stay self-contained when they fill while a
    /// scratch batch is only partially drained: with a conjunct thinning
    /// the rows, batch boundaries drift against scratch boundaries, and
    /// every string must still resolve through the batch it was committed
    /// to.
    #[test]
    fn test_var_len_rows_across_small_batches() {
        let group1: Vec<i64> = (0..60).collect();
        let group2: Vec<i64> = (60..120).collect();
        let mut builder = FileBuilder::new(id_name_schema());
        builder
            .row_groups
            .push((60, id_name_row_group(&group1, Compression::UNCOMPRESSED)));
        builder
            .row_groups
            .push((60, id_name_row_group(&group2, Compression::UNCOMPRESSED)));
        let file = builder.build();

        let mut harness = ScanHarness::new(file, id_name_tuple(), id_name_table());
        harness.options.batch_size = 7;
        harness.conjuncts.push(Box::new(SlotIsNotNull { slot_id: 1 }));
        let batches = harness.run().unwrap();

        let expected: Vec<i64> = (0..120).filter(|id| id % 3 != 0).collect();
        assert_eq!(total_rows(&batches), expected.len());
        assert!(batches.len() > 1);
        check_id_name_rows(&batches, &expected);
    }

    /// Same boundary drift for collection slots: array payloads committed
    /// to a batch must resolve against that batch's pool.
    #[test]
    fn test_collections_across_small_batches() {
        let schema = schema_elements(
            vec![
                group("tags", Repetition::OPTIONAL, 1),
                group("list", Repetition::REPEATED, 1),
                leaf("item", Type::INT32, Repetition::OPTIONAL),
            ],
            1,
        );
        let mut builder = FileBuilder::new(schema);
        for base in [10i32, 20] {
            // Rows per group: [b], NULL, [b+1], [b+2], NULL, [b+3].
            let def_levels = [3u8, 0, 3, 3, 0, 3];
            let rep_levels = [0u8; 6];
            let values = crate::util::test_common::plain_encode_i32s(&[
                base,
                base + 1,
                base + 2,
                base + 3,
            ]);
            builder.row_groups.push((
                6,
                vec![ColumnChunkSpec {
                    type_: Type::INT32,
                    path_in_schema: vec!["tags".into(), "list".into(), "item".into()],
                    codec: Compression::UNCOMPRESSED,
                    num_values: 6,
                    pages: vec![make_data_page(
                        6,
                        3,
                        &def_levels,
                        1,
                        &rep_levels,
                        Encoding::PLAIN,
                        &values,
                        Compression::UNCOMPRESSED,
                    )],
                    statistics: None,
                }],
            ));
        }
        let file = builder.build();

        let item_desc = Arc::new(TupleDescriptor::new(
            vec![(vec![0, path::ARRAY_ITEM], 0, ColumnType::Int)],
            vec![0],
        ));
        let tuple_desc = TupleDescriptor::with_item_descriptors(
            vec![(
                vec![0],
                0,
                ColumnType::Array(Box::new(ColumnType::Int)),
                Some(Arc::clone(&item_desc)),
            )],
            vec![],
        );
        let table = vec![ColumnDesc {
            name: "tags".into(),
            col_type: ColumnType::Array(Box::new(ColumnType::Int)),
        }];

        let mut harness = ScanHarness::new(file, tuple_desc.clone(), table);
        harness.options.batch_size = 3;
        harness.conjuncts.push(Box::new(SlotIsNotNull { slot_id: 0 }));
        let batches = harness.run().unwrap();

        assert!(batches.len() > 1);
        let mut expected = [10i32, 11, 12, 13, 20, 21, 22, 23].into_iter();
        for batch in &batches {
            for i in 0..batch.num_rows() {
                let tuple = batch.row(i);
                let slot = &tuple_desc.slots[0];
                assert!(!crate::scan::descriptors::is_null(tuple, slot.null_indicator));
                let (r, count) = read_collection_slot(slot_bytes(tuple, slot));
                assert_eq!(count, 1);
                let items = batch.pool.get(r, item_desc.byte_size).unwrap();
                let row = TupleRow {
                    tuple: &items[..item_desc.byte_size],
                    desc: &item_desc,
                    pool: &batch.pool,
                };
                assert_eq!(row.slot_value(0), SlotValue::Int(expected.next().unwrap()));
            }
        }
        assert!(expected.next().is_none());
    }

    /// Lenient mode: a row group whose column data undercounts its
    /// metadata is logged and truncated rather than failing the scan.
    #[test]
    fn test_lenient_mode_survives_short_column() {
        let ids: Vec<i64> = (0..10).collect();
        let schema = schema_elements(vec![leaf("id", Type::INT64, Repetition::REQUIRED)], 1);
        let mut builder = FileBuilder::new(schema);
        builder.row_groups.push((
            20,
            vec![ColumnChunkSpec {
                type_: Type::INT64,
                path_in_schema: vec!["id".into()],
                codec: Compression::UNCOMPRESSED,
                // Metadata over-counts the values actually present.
                num_values: 20,
                pages: vec![make_data_page(
                    10,
                    0,
                    &[],
                    0,
                    &[],
                    Encoding::PLAIN,
                    &plain_encode_i64s(&ids),
                    Compression::UNCOMPRESSED,
                )],
                statistics: None,
            }],
        ));
        let file = builder.build();

        let tuple_desc = TupleDescriptor::new(vec![(vec![0], 0, ColumnType::BigInt)], vec![]);
        let table = vec![ColumnDesc {
            name: "id".into(),
            col_type: ColumnType::BigInt,
        }];

        let strict = ScanHarness::new(file.clone(), tuple_desc.clone(), table.clone()).run();
        assert!(strict.is_err());

        let mut lenient = ScanHarness::new(file, tuple_desc, table);
        lenient.options.abort_on_error = false;
        let batches = lenient.run().unwrap();
        assert_eq!(total_rows(&batches), 10);
    }
}
