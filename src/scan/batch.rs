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

//! Tuple staging and output batches.

use std::sync::Arc;

use crate::data_type::{read_string_slot, write_string_slot};
use crate::errors::Result;
use crate::memory::{MemPool, MemTracker};
use crate::scan::descriptors::{
    is_null, read_collection_slot, slot_bytes, slot_bytes_mut, write_collection_slot, ColumnType,
    TupleDescriptor,
};

/// Column-oriented staging area for up to `capacity` tuples, populated one
/// column reader at a time before predicate evaluation.
pub struct ScratchBatch {
    pub tuple_byte_size: usize,
    capacity: usize,
    /// `capacity * tuple_byte_size` bytes of tuple rows.
    pub tuple_mem: Vec<u8>,
    /// Transfer cursor over the valid tuples.
    pub tuple_idx: usize,
    /// Number of valid tuples in `tuple_mem`.
    pub num_tuples: usize,
    /// Owns variable-length slot payloads of the staged tuples plus page
    /// buffers the readers have moved past; handed to the output batch once
    /// the batch is drained.
    pub pool: MemPool,
}

impl ScratchBatch {
    pub fn new(tuple_byte_size: usize, capacity: usize, tracker: Arc<MemTracker>) -> Self {
        ScratchBatch {
            tuple_byte_size,
            capacity,
            tuple_mem: vec![0; capacity * tuple_byte_size],
            tuple_idx: 0,
            num_tuples: 0,
            pool: MemPool::new(tracker),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Starts a new batch. The previous batch's pool chunks have been
    /// transferred to the output batch by the drain loop.
    pub fn reset(&mut self) {
        self.tuple_idx = 0;
        self.num_tuples = 0;
    }

    pub fn at_end(&self) -> bool {
        self.tuple_idx == self.num_tuples
    }

    pub fn tuple(&self, idx: usize) -> &[u8] {
        &self.tuple_mem[idx * self.tuple_byte_size..(idx + 1) * self.tuple_byte_size]
    }

    pub fn tuple_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.tuple_mem[idx * self.tuple_byte_size..(idx + 1) * self.tuple_byte_size]
    }
}

/// An output batch of materialized tuples. The caller takes ownership of the
/// pool together with the batch.
#[derive(Debug)]
pub struct RowBatch {
    pub tuple_byte_size: usize,
    capacity: usize,
    tuple_mem: Vec<u8>,
    num_rows: usize,
    pub pool: MemPool,
}

impl RowBatch {
    pub fn new(tuple_byte_size: usize, capacity: usize, tracker: Arc<MemTracker>) -> Self {
        RowBatch {
            tuple_byte_size,
            capacity,
            tuple_mem: Vec::with_capacity(capacity * tuple_byte_size),
            num_rows: 0,
            pool: MemPool::new(tracker),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn at_capacity(&self) -> bool {
        self.num_rows >= self.capacity
    }

    /// Appends a tuple by copying its fixed-width bytes. Any pool-backed
    /// slots keep referencing the pool they were materialized into; use
    /// [`add_row_copying_payloads`](Self::add_row_copying_payloads) when
    /// that pool does not travel with this batch.
    pub fn add_row(&mut self, tuple: &[u8]) {
        debug_assert!(!self.at_capacity());
        debug_assert_eq!(tuple.len(), self.tuple_byte_size);
        self.tuple_mem.extend_from_slice(tuple);
        self.num_rows += 1;
    }

    /// Appends a tuple, moving its pool-backed payloads from `src` into
    /// this batch's own pool and rewriting the slot references. The
    /// committed row then stays valid however the scratch and output batch
    /// boundaries interleave.
    pub fn add_row_copying_payloads(
        &mut self,
        tuple: &[u8],
        desc: &TupleDescriptor,
        src: &MemPool,
    ) -> Result<()> {
        debug_assert!(!self.at_capacity());
        debug_assert_eq!(tuple.len(), self.tuple_byte_size);
        let start = self.tuple_mem.len();
        self.tuple_mem.extend_from_slice(tuple);
        self.num_rows += 1;
        copy_tuple_payloads(&mut self.tuple_mem[start..], desc, src, &mut self.pool)
    }

    /// Appends `n` empty tuples; only meaningful when `tuple_byte_size` is
    /// zero.
    pub fn add_empty_rows(&mut self, n: usize) {
        debug_assert_eq!(self.tuple_byte_size, 0);
        self.num_rows += n;
    }

    pub fn row(&self, idx: usize) -> &[u8] {
        &self.tuple_mem[idx * self.tuple_byte_size..(idx + 1) * self.tuple_byte_size]
    }
}

/// Copies every pool-backed payload of `tuple` from `src` into `dst`,
/// rewriting the slot references in place. Collection slots recurse into
/// their item tuples.
fn copy_tuple_payloads(
    tuple: &mut [u8],
    desc: &TupleDescriptor,
    src: &MemPool,
    dst: &mut MemPool,
) -> Result<()> {
    for slot in &desc.slots {
        if is_null(tuple, slot.null_indicator) {
            continue;
        }
        match &slot.slot_type {
            ColumnType::String | ColumnType::Varchar(_) => {
                let (r, len) = read_string_slot(slot_bytes(tuple, slot));
                let data = src.get(r, len).ok_or_else(|| {
                    general_err!("string slot does not resolve against the staging pool")
                })?;
                let moved = dst.allocate(data)?;
                write_string_slot(slot_bytes_mut(tuple, slot), moved, len);
            }
            ColumnType::Array(_) | ColumnType::Map(_, _) => {
                let Some(item_desc) = &slot.collection_item_descriptor else {
                    continue;
                };
                let (r, num_tuples) = read_collection_slot(slot_bytes(tuple, slot));
                let byte_len = num_tuples * item_desc.byte_size;
                let mut items = src
                    .get(r, byte_len)
                    .ok_or_else(|| {
                        general_err!("collection slot does not resolve against the staging pool")
                    })?
                    .to_vec();
                for item in items.chunks_mut(item_desc.byte_size.max(1)) {
                    copy_tuple_payloads(item, item_desc, src, dst)?;
                }
                let moved = dst.allocate(&items)?;
                write_collection_slot(slot_bytes_mut(tuple, slot), moved, num_tuples);
            }
            _ => {}
        }
    }
    Ok(())
}
