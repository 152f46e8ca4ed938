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

//! Collection column reader.
//!
//! Collections are not materialized directly in Parquet files; only scalar
//! values appear. This reader uses the definition and repetition levels of
//! its child readers to figure out the boundaries of each collection.

use std::sync::Arc;

use crate::memory::MemPool;
use crate::scan::context::ScannerCtx;
use crate::scan::descriptors::{
    set_null, write_collection_slot, SlotDescriptor, TupleDescriptor, COLLECTION_SLOT_SIZE,
};
use crate::schema::tree::SchemaNode;

use super::reader::{ColumnReader, ReaderBase};
use super::{INVALID_LEVEL, INVALID_POS};

/// Synthesizes nested-collection boundaries from its children's levels. Has
/// no value decoder of its own; its current levels are derived from
/// `children[0]` after all children have been advanced to the start of the
/// next collection.
pub struct CollectionColumnReader {
    pub base: ReaderBase,
    /// At least one child per collection reader. Children either
    /// materialize slots of the item tuples, or a single child reads levels
    /// only.
    pub children: Vec<ColumnReader>,
    item_desc: Option<Arc<TupleDescriptor>>,
    /// Template the item tuples start from, carrying NULLs for requested
    /// fields missing from the file.
    item_template: Option<Vec<u8>>,
}

impl CollectionColumnReader {
    pub fn new(node: &SchemaNode, slot: Option<SlotDescriptor>) -> Self {
        debug_assert!(node.is_repeated());
        let item_desc = slot
            .as_ref()
            .and_then(|s| s.collection_item_descriptor.clone());
        CollectionColumnReader {
            base: ReaderBase::new(node, slot),
            children: Vec::new(),
            item_desc,
            item_template: None,
        }
    }

    pub fn base(&self) -> &ReaderBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ReaderBase {
        &mut self.base
    }

    pub fn set_item_template(&mut self, template: Option<Vec<u8>>) {
        self.item_template = template;
    }

    /// The repetition level indicating that the current value is the first
    /// in a new collection.
    pub fn new_collection_rep_level(&self) -> i16 {
        self.base.max_rep_level - 1
    }

    /// Called once for each row group.
    pub fn reset(&mut self) {
        self.base.def_level = INVALID_LEVEL;
        self.base.rep_level = INVALID_LEVEL;
        self.base.pos_current_value = INVALID_POS;
    }

    /// Advances all children to the beginning of the next collection and
    /// derives this reader's state from theirs.
    pub fn next_levels(&mut self, ctx: &mut ScannerCtx) -> bool {
        debug_assert!(!self.children.is_empty());
        debug_assert!(self.base.rep_level <= self.new_collection_rep_level());
        let new_collection_rep_level = self.new_collection_rep_level();
        for child in &mut self.children {
            loop {
                if !child.next_levels(ctx) {
                    return false;
                }
                if child.rep_level() <= new_collection_rep_level {
                    break;
                }
            }
        }
        self.update_derived_state();
        true
    }

    /// Materializes a collection value into the tuple's slot (when one is
    /// bound) and advances to the next collection.
    pub fn read_value(
        &mut self,
        pool: &mut MemPool,
        tuple: &mut [u8],
        ctx: &mut ScannerCtx,
    ) -> bool {
        debug_assert!(self.base.def_level >= 0);
        debug_assert!(self.base.def_level >= self.base.ira_def_level);
        let slot_info = self
            .base
            .slot
            .as_ref()
            .map(|s| (s.tuple_offset, s.null_indicator));
        match slot_info {
            None => self.next_levels(ctx),
            Some((offset, _)) if self.base.def_level >= self.base.max_def_level => {
                self.read_slot(offset, tuple, pool, ctx)
            }
            Some((_, null_indicator)) => {
                set_null(tuple, null_indicator);
                self.next_levels(ctx)
            }
        }
    }

    /// Assembles the item tuples of one collection into the pool and writes
    /// the collection slot. The children's levels already point at the next
    /// collection afterwards, so this does not advance again.
    fn read_slot(
        &mut self,
        slot_offset: usize,
        tuple: &mut [u8],
        pool: &mut MemPool,
        ctx: &mut ScannerCtx,
    ) -> bool {
        debug_assert!(!self.children.is_empty());
        debug_assert!(self.base.rep_level <= self.new_collection_rep_level());

        let new_collection_rep_level = self.new_collection_rep_level();
        let tuple_size = self.item_desc.as_ref().map(|d| d.byte_size).unwrap_or(0);
        let template = self.item_template.as_deref();
        let children = &mut self.children;

        let mut buf: Vec<u8> = Vec::new();
        let mut num_tuples = 0usize;
        let mut continue_execution = !ctx.cancelled() && !ctx.reached_limit();
        let mut end_of_collection = children[0].rep_level() == INVALID_LEVEL;
        while !end_of_collection && continue_execution {
            // A tuple is produced iff the collection that contains its
            // values is non-empty and defined; NULL struct fields still
            // produce a tuple with their slots set null.
            let materialize_tuple =
                children[0].def_level() >= children[0].def_level_of_immediate_repeated_ancestor();
            if materialize_tuple {
                let start = buf.len();
                buf.resize(start + tuple_size, 0);
                if let Some(template) = template {
                    buf[start..].copy_from_slice(template);
                }
                continue_execution =
                    read_collection_item(children, true, pool, &mut buf[start..], ctx);
                if continue_execution {
                    num_tuples += 1;
                }
            } else {
                continue_execution = read_collection_item(children, false, pool, &mut [], ctx);
            }
            end_of_collection = children[0].rep_level() <= new_collection_rep_level;
        }
        if !continue_execution {
            return false;
        }

        let pool_ref = match pool.allocate(&buf) {
            Ok(r) => r,
            Err(e) => {
                ctx.merge_status(e);
                return false;
            }
        };
        write_collection_slot(
            &mut tuple[slot_offset..slot_offset + COLLECTION_SLOT_SIZE],
            pool_ref,
            num_tuples,
        );
        self.update_derived_state();
        true
    }

    /// Derives `def_level`, `rep_level` and the position counter from the
    /// children, which must all have been advanced to the start of the next
    /// collection.
    fn update_derived_state(&mut self) {
        let def_level = self.children[0].def_level();
        let rep_level = self.children[0].rep_level();
        for child in &self.children {
            debug_assert_eq!(child.rep_level(), rep_level);
            if def_level < self.base.max_def_level {
                // Collection not defined; all children agree on where it
                // became undefined.
                debug_assert_eq!(child.def_level(), def_level);
            } else {
                debug_assert!(child.def_level() >= self.base.max_def_level);
            }
        }
        self.base.def_level = def_level;
        self.base.rep_level = rep_level;

        if self.base.row_group_at_end() {
            self.base.pos_current_value = INVALID_POS;
        } else if rep_level <= self.base.max_rep_level - 2 {
            // Start of a new parent collection: the current collection is
            // its first item.
            self.base.pos_current_value = 0;
        }
    }
}

/// Reads one item of a collection across all child readers, either
/// materializing the tuple or just consuming levels when the containing
/// collection is empty.
fn read_collection_item(
    children: &mut [ColumnReader],
    materialize_tuple: bool,
    pool: &mut MemPool,
    tuple: &mut [u8],
    ctx: &mut ScannerCtx,
) -> bool {
    for child in children.iter_mut() {
        let continue_execution = if materialize_tuple {
            debug_assert!(child.def_level() >= child.def_level_of_immediate_repeated_ancestor());
            if child.has_pos_slot() {
                child.read_position(tuple);
            }
            child.read_value(pool, tuple, ctx)
        } else {
            debug_assert!(child.def_level() < child.def_level_of_immediate_repeated_ancestor());
            child.next_levels(ctx)
        };
        if !continue_execution {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{Compression, Encoding, Repetition, Type};
    use crate::column::reader::create_reader;
    use crate::column::ROW_GROUP_END;
    use crate::errors::Result;
    use crate::format::SchemaElement;
    use crate::memory::MemTracker;
    use crate::scan::context::{ScanOptions, ScannerCtx};
    use crate::scan::descriptors::{read_collection_slot, ColumnType, NullIndicator};
    use crate::util::test_common::{
        column_chunk_meta, make_data_page, pages_to_bytes, plain_encode_i32s, stream_over,
    };

    fn ctx() -> ScannerCtx {
        ScannerCtx::new(
            ScanOptions::default(),
            "test.parquet",
            Arc::new(MemTracker::new_root("test")),
        )
    }

    fn node(
        name: &str,
        type_: Option<Type>,
        repetition: Repetition,
        col_idx: i32,
        max_def: i16,
        max_rep: i16,
        ira: i16,
    ) -> SchemaNode {
        SchemaNode {
            element: SchemaElement {
                type_,
                repetition_type: Some(repetition),
                name: name.to_owned(),
                ..Default::default()
            },
            children: Vec::new(),
            col_idx,
            max_def_level: max_def,
            max_rep_level: max_rep,
            def_level_of_immediate_repeated_ancestor: ira,
        }
    }

    /// Nested arrays with `max_def_level = 3`, `max_rep_level = 2` and the
    /// level stream (def=[1,3,3,2], rep=[0,0,1,0]): the item reader must
    /// produce exactly two values, the two inner collections of the first
    /// populated outer collection get positions 0 and 1, and the following
    /// outer collection has no inner items.
    #[test]
    fn test_nested_empty_collections() -> Result<()> {
        let mut ctx = ctx();

        // Item leaf: third level of nesting, required value inside the
        // repeated inner group.
        let item_node = node("item", Some(Type::INT32), Repetition::REQUIRED, 0, 3, 2, 3);
        let item_desc = Arc::new(TupleDescriptor::new(
            vec![(vec![0, 0], 0, ColumnType::Int)],
            vec![0, 0],
        ));
        let item_slot = item_desc.slots[0].clone();
        let mut item_reader = create_reader(&item_node, false, Some(item_slot), &ctx);

        let page = make_data_page(
            4,
            3,
            &[1, 3, 3, 2],
            2,
            &[0, 0, 1, 0],
            Encoding::PLAIN,
            &plain_encode_i32s(&[10, 20]),
            Compression::UNCOMPRESSED,
        );
        let meta = column_chunk_meta(Type::INT32, Compression::UNCOMPRESSED, 4);
        item_reader.reset(&meta, stream_over(pages_to_bytes(&[page])), &ctx)?;

        // Inner collection: the repeated group containing `item`.
        let inner_node = node("inner", None, Repetition::REPEATED, -1, 3, 2, 2);
        // Mid-level item tuple: the inner array slot plus its position.
        let mid_desc = TupleDescriptor::new(
            vec![
                (vec![0, 0], 0, ColumnType::Array(Box::new(ColumnType::Int))),
                (vec![0, 1], 1, ColumnType::BigInt),
            ],
            vec![0],
        );
        let mut coll_slot = mid_desc.slots[0].clone();
        coll_slot.collection_item_descriptor = Some(Arc::clone(&item_desc));
        let mut inner = CollectionColumnReader::new(&inner_node, Some(coll_slot));
        inner.children.push(item_reader);
        let mut inner = ColumnReader::Collection(inner);
        inner.set_pos_slot(mid_desc.slots[1].clone());

        let tracker = Arc::new(MemTracker::new_root("pool"));
        let mut pool = MemPool::new(Arc::clone(&tracker));

        // Seed.
        assert!(inner.next_levels(&mut ctx));
        assert_eq!(inner.def_level(), 1);
        assert_eq!(inner.rep_level(), 0);

        // Drive the mid-level collection loop by hand.
        let mut tuples: Vec<(Vec<u8>, bool)> = Vec::new();
        while !inner.row_group_at_end() {
            let materialize = inner.def_level() >= inner.def_level_of_immediate_repeated_ancestor();
            let mut tuple = vec![0u8; mid_desc.byte_size];
            if materialize {
                inner.read_position(&mut tuple);
                assert!(inner.read_value(&mut pool, &mut tuple, &mut ctx));
            } else {
                assert!(inner.next_levels(&mut ctx));
            }
            tuples.push((tuple, materialize));
        }
        assert!(ctx.parse_status_ok());

        // Four level entries: one skipped (mid array empty), three
        // materialized.
        assert_eq!(tuples.len(), 4);
        assert!(!tuples[0].1);

        let null_indicator = |slot: usize| -> NullIndicator { mid_desc.slots[slot].null_indicator };

        // First populated outer collection: two inner collections at
        // positions 0 and 1, one item each.
        for (tuple_idx, (expected_pos, expected_item)) in [(1usize, (0i64, 10i32)), (2, (1, 20))] {
            let (tuple, materialized) = &tuples[tuple_idx];
            assert!(*materialized);
            assert!(!crate::scan::descriptors::is_null(tuple, null_indicator(0)));
            let pos = i64::from_le_bytes(tuple[12..20].try_into().unwrap());
            assert_eq!(pos, expected_pos);
            let (r, count) = read_collection_slot(&tuple[..12]);
            assert_eq!(count, 1);
            let items = pool.get(r, item_desc.byte_size).unwrap();
            let v = i32::from_le_bytes(items[..4].try_into().unwrap());
            assert_eq!(v, expected_item);
        }

        // Second outer collection: inner collection element with no items.
        let (tuple, materialized) = &tuples[3];
        assert!(*materialized);
        assert!(crate::scan::descriptors::is_null(tuple, null_indicator(0)));
        let pos = i64::from_le_bytes(tuple[12..20].try_into().unwrap());
        assert_eq!(pos, 0);

        assert_eq!(inner.rep_level(), ROW_GROUP_END);
        Ok(())
    }
}
