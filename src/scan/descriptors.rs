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

//! Request-side descriptors: logical column types, slot and tuple layout,
//! and typed access to slot bytes.
//!
//! Tuples are fixed-width byte rows. Fixed-size values live inline in their
//! slot (CHAR included); STRING/VARCHAR and collection slots store a stable
//! pool reference. Null indicators are one bit per slot, packed into bytes
//! at the end of the tuple.

use std::sync::Arc;

use crate::basic::Type;
use crate::data_type::{
    decimal_size, read_string_slot, TimestampValue, STRING_SLOT_SIZE, TIMESTAMP_SLOT_SIZE,
};
use crate::memory::{MemPool, PoolRef};

/// Index constants for array and map traversal inside a
/// [`SchemaPath`]. These name the children of ARRAY and MAP column types;
/// `ARRAY_POS` is an artificial position field with no corresponding schema
/// node.
pub mod path {
    pub const ARRAY_ITEM: usize = 0;
    pub const ARRAY_POS: usize = 1;
    pub const MAP_KEY: usize = 0;
    pub const MAP_VALUE: usize = 1;
}

/// Ordered child indices leading from a top-level table column (index 0,
/// counting partition keys) to the requested value.
pub type SchemaPath = Vec<usize>;

/// Byte width of a collection slot: pool chunk + offset + item count.
pub const COLLECTION_SLOT_SIZE: usize = 12;

/// Logical type of a requested column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Timestamp,
    String,
    /// Variable-length string with a declared maximum.
    Varchar(i32),
    /// Fixed-length string, space padded; stored inline in the tuple.
    Char(i32),
    Decimal {
        precision: i32,
        scale: i32,
    },
    Array(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Struct(Vec<(String, ColumnType)>),
}

impl ColumnType {
    pub fn is_complex(&self) -> bool {
        matches!(
            self,
            ColumnType::Array(_) | ColumnType::Map(_, _) | ColumnType::Struct(_)
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, ColumnType::Array(_) | ColumnType::Map(_, _))
    }

    /// The Parquet physical type this logical type is stored as.
    pub fn physical_type(&self) -> Type {
        match self {
            ColumnType::Boolean => Type::BOOLEAN,
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int => Type::INT32,
            ColumnType::BigInt => Type::INT64,
            ColumnType::Float => Type::FLOAT,
            ColumnType::Double => Type::DOUBLE,
            ColumnType::Timestamp => Type::INT96,
            ColumnType::String | ColumnType::Varchar(_) | ColumnType::Char(_) => Type::BYTE_ARRAY,
            ColumnType::Decimal { .. } => Type::FIXED_LEN_BYTE_ARRAY,
            ColumnType::Array(_) | ColumnType::Map(_, _) | ColumnType::Struct(_) => {
                unreachable!("complex types are not materialized in a single column")
            }
        }
    }

    /// Width of this type's tuple slot. CHAR is inline; callers sizing
    /// layouts must account for that.
    pub fn slot_byte_size(&self) -> usize {
        match self {
            ColumnType::Boolean | ColumnType::TinyInt => 1,
            ColumnType::SmallInt => 2,
            ColumnType::Int | ColumnType::Float => 4,
            ColumnType::BigInt | ColumnType::Double => 8,
            ColumnType::Timestamp => TIMESTAMP_SLOT_SIZE,
            ColumnType::String | ColumnType::Varchar(_) => STRING_SLOT_SIZE,
            ColumnType::Char(len) => *len as usize,
            ColumnType::Decimal { precision, .. } => match decimal_size(*precision) {
                0..=4 => 4,
                5..=8 => 8,
                _ => 16,
            },
            ColumnType::Array(_) | ColumnType::Map(_, _) => COLLECTION_SLOT_SIZE,
            ColumnType::Struct(_) => unreachable!("struct fields occupy their own slots"),
        }
    }
}

/// One column of the table as presented by the catalog.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    pub name: String,
    pub col_type: ColumnType,
}

/// Position of a slot's null-indicator bit within the tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullIndicator {
    pub byte_offset: usize,
    pub bit_mask: u8,
}

/// Describes one materialized slot of a tuple.
#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    /// Index of this slot within its tuple descriptor.
    pub id: usize,
    /// Request path from the table root to the value.
    pub col_path: SchemaPath,
    /// For top-level slots, the table column position (partition keys
    /// included).
    pub col_pos: usize,
    pub slot_type: ColumnType,
    pub tuple_offset: usize,
    pub null_indicator: NullIndicator,
    /// For collection slots, the descriptor of the item tuples.
    pub collection_item_descriptor: Option<Arc<TupleDescriptor>>,
}

/// Describes the layout of one tuple: its slots, width and null bytes.
#[derive(Debug, Clone, Default)]
pub struct TupleDescriptor {
    pub slots: Vec<SlotDescriptor>,
    pub byte_size: usize,
    /// Path of the collection this tuple materializes; empty for the
    /// top-level tuple.
    pub tuple_path: SchemaPath,
}

impl TupleDescriptor {
    /// Lays out slots in declaration order followed by one null bit per
    /// slot.
    pub fn new(columns: Vec<(SchemaPath, usize, ColumnType)>, tuple_path: SchemaPath) -> Self {
        Self::with_item_descriptors(
            columns
                .into_iter()
                .map(|(path, pos, t)| (path, pos, t, None))
                .collect(),
            tuple_path,
        )
    }

    /// As [`new`](Self::new), additionally attaching item tuple descriptors
    /// to collection slots.
    pub fn with_item_descriptors(
        columns: Vec<(SchemaPath, usize, ColumnType, Option<Arc<TupleDescriptor>>)>,
        tuple_path: SchemaPath,
    ) -> Self {
        let num_slots = columns.len();
        let null_bytes = crate::util::bit_util::ceil(num_slots, 8);
        let mut offset = 0;
        let mut slots = Vec::with_capacity(num_slots);
        for (id, (col_path, col_pos, slot_type, item)) in columns.into_iter().enumerate() {
            let size = slot_type.slot_byte_size();
            slots.push(SlotDescriptor {
                id,
                col_path,
                col_pos,
                slot_type,
                tuple_offset: offset,
                // Null bytes trail the value slots; patched below once the
                // total value width is known.
                null_indicator: NullIndicator {
                    byte_offset: id / 8,
                    bit_mask: 1 << (id % 8),
                },
                collection_item_descriptor: item,
            });
            offset += size;
        }
        for slot in &mut slots {
            slot.null_indicator.byte_offset += offset;
        }
        TupleDescriptor {
            slots,
            byte_size: offset + null_bytes,
            tuple_path,
        }
    }
}

// ----------------------------------------------------------------------
// Tuple byte access

pub fn set_null(tuple: &mut [u8], ni: NullIndicator) {
    tuple[ni.byte_offset] |= ni.bit_mask;
}

pub fn is_null(tuple: &[u8], ni: NullIndicator) -> bool {
    tuple[ni.byte_offset] & ni.bit_mask != 0
}

pub fn slot_bytes<'a>(tuple: &'a [u8], slot: &SlotDescriptor) -> &'a [u8] {
    &tuple[slot.tuple_offset..slot.tuple_offset + slot.slot_type.slot_byte_size()]
}

pub fn slot_bytes_mut<'a>(tuple: &'a mut [u8], slot: &SlotDescriptor) -> &'a mut [u8] {
    &mut tuple[slot.tuple_offset..slot.tuple_offset + slot.slot_type.slot_byte_size()]
}

/// Encodes a collection value (pool-resident item tuples) into its slot.
pub fn write_collection_slot(slot: &mut [u8], r: PoolRef, num_tuples: usize) {
    slot[..4].copy_from_slice(&r.chunk.to_le_bytes());
    slot[4..8].copy_from_slice(&r.offset.to_le_bytes());
    slot[8..12].copy_from_slice(&(num_tuples as u32).to_le_bytes());
}

pub fn read_collection_slot(slot: &[u8]) -> (PoolRef, usize) {
    let chunk = u32::from_le_bytes(slot[..4].try_into().unwrap());
    let offset = u32::from_le_bytes(slot[4..8].try_into().unwrap());
    let count = u32::from_le_bytes(slot[8..12].try_into().unwrap());
    (PoolRef { chunk, offset }, count as usize)
}

/// A typed view of one slot, resolved against the pool that owns the
/// tuple's variable-length data.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue<'a> {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Timestamp(TimestampValue),
    String(&'a [u8]),
    Decimal(i128),
    Collection { num_tuples: usize },
}

/// Reads the value of `slot` out of `tuple`, resolving pool references
/// through `pool`.
pub fn read_slot_value<'a>(
    tuple: &'a [u8],
    slot: &SlotDescriptor,
    pool: &'a MemPool,
) -> SlotValue<'a> {
    if is_null(tuple, slot.null_indicator) {
        return SlotValue::Null;
    }
    let bytes = slot_bytes(tuple, slot);
    match &slot.slot_type {
        ColumnType::Boolean => SlotValue::Boolean(bytes[0] != 0),
        ColumnType::TinyInt => SlotValue::TinyInt(bytes[0] as i8),
        ColumnType::SmallInt => SlotValue::SmallInt(i16::from_le_bytes(bytes.try_into().unwrap())),
        ColumnType::Int => SlotValue::Int(i32::from_le_bytes(bytes.try_into().unwrap())),
        ColumnType::BigInt => SlotValue::BigInt(i64::from_le_bytes(bytes.try_into().unwrap())),
        ColumnType::Float => SlotValue::Float(f32::from_le_bytes(bytes.try_into().unwrap())),
        ColumnType::Double => SlotValue::Double(f64::from_le_bytes(bytes.try_into().unwrap())),
        ColumnType::Timestamp => SlotValue::Timestamp(TimestampValue {
            nanos_of_day: i64::from_le_bytes(bytes[..8].try_into().unwrap()),
            julian_day: i32::from_le_bytes(bytes[8..].try_into().unwrap()),
        }),
        ColumnType::Char(_) => SlotValue::String(bytes),
        ColumnType::String | ColumnType::Varchar(_) => {
            let (r, len) = read_string_slot(bytes);
            match pool.get(r, len) {
                Some(data) => SlotValue::String(data),
                None => SlotValue::Null,
            }
        }
        ColumnType::Decimal { .. } => {
            let v = match bytes.len() {
                4 => i32::from_le_bytes(bytes.try_into().unwrap()) as i128,
                8 => i64::from_le_bytes(bytes.try_into().unwrap()) as i128,
                _ => i128::from_le_bytes(bytes.try_into().unwrap()),
            };
            SlotValue::Decimal(v)
        }
        ColumnType::Array(_) | ColumnType::Map(_, _) => {
            let (_, count) = read_collection_slot(bytes);
            SlotValue::Collection { num_tuples: count }
        }
        ColumnType::Struct(_) => SlotValue::Null,
    }
}
