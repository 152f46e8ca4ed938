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

//! Runtime filter evaluation.
//!
//! Runtime filters arrive from joins elsewhere in the plan and reject rows
//! that cannot match. They are advisory: an ineffective filter costs more
//! than it saves, so per-filter rejection statistics are kept and filters
//! whose measured rejection ratio falls below a threshold are permanently
//! disabled for the scanner.

use std::hash::Hasher;
use std::sync::Arc;

use twox_hash::XxHash64;

use crate::scan::conjuncts::TupleRow;
use crate::scan::descriptors::SlotValue;

/// The number of rows between checks whether a filter is effective. Must be
/// a power of two.
pub const ROWS_PER_FILTER_SELECTIVITY_CHECK: u64 = 16 * 1024;
const _: () = assert!(ROWS_PER_FILTER_SELECTIVITY_CHECK.is_power_of_two());

/// A filter produced by the runtime (e.g. the build side of a join).
pub trait RuntimeFilter: Send + Sync {
    /// May the row owning `value` match? False filters the row out.
    fn eval(&self, value: &SlotValue<'_>) -> bool;

    /// True when the filter can no longer reject anything.
    fn always_true(&self) -> bool;
}

/// Binds a filter to the slot it applies to.
pub struct FilterContext {
    pub filter: Arc<dyn RuntimeFilter>,
    pub slot_id: usize,
    /// Filters bound entirely to partition columns are checked once per row
    /// group against the template tuple rather than per row.
    pub applies_to_partition: bool,
}

/// Per-scanner filter statistics. Disabling is monotone: once disabled in a
/// scanner a filter stays disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilterStats {
    pub considered: u64,
    pub rejected: u64,
    pub total_possible: u64,
    pub enabled: bool,
}

/// Evaluates runtime filters against candidate rows, tracking selectivity.
pub struct FilterEvaluator {
    contexts: Vec<FilterContext>,
    stats: Vec<LocalFilterStats>,
    min_reject_ratio: f64,
}

impl FilterEvaluator {
    pub fn new(contexts: Vec<FilterContext>, min_reject_ratio: f64) -> Self {
        // Filters that start out always-true are dropped up front.
        let contexts: Vec<FilterContext> = contexts
            .into_iter()
            .filter(|c| !c.filter.always_true())
            .collect();
        let stats = vec![
            LocalFilterStats {
                enabled: true,
                ..Default::default()
            };
            contexts.len()
        ];
        FilterEvaluator {
            contexts,
            stats,
            min_reject_ratio,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn stats(&self) -> &[LocalFilterStats] {
        &self.stats
    }

    /// Row-level evaluation. Every `ROWS_PER_FILTER_SELECTIVITY_CHECK` rows
    /// a filter's measured rejection ratio is inspected; always-true
    /// filters and those below the configured threshold are disabled. At a
    /// check boundary where nothing has been considered yet the ratio is
    /// undefined and the filter stays enabled.
    pub fn eval(&mut self, row: &TupleRow<'_>) -> bool {
        for (context, stats) in self.contexts.iter().zip(self.stats.iter_mut()) {
            if !stats.enabled {
                continue;
            }
            stats.total_possible += 1;
            if stats.total_possible & (ROWS_PER_FILTER_SELECTIVITY_CHECK - 1) == 0 {
                let reject_ratio = stats.rejected as f64 / stats.considered as f64;
                if context.filter.always_true()
                    || (stats.considered > 0 && reject_ratio < self.min_reject_ratio)
                {
                    stats.enabled = false;
                    continue;
                }
            }
            stats.considered += 1;
            let value = row.slot_value(context.slot_id);
            if !context.filter.eval(&value) {
                stats.rejected += 1;
                return false;
            }
        }
        true
    }

    /// Row-group-level evaluation of the filters bound to partition
    /// columns, scored against the template tuple.
    pub fn partition_passes(&self, template_row: &TupleRow<'_>) -> bool {
        self.contexts
            .iter()
            .zip(self.stats.iter())
            .filter(|(c, s)| c.applies_to_partition && s.enabled)
            .all(|(c, _)| c.filter.eval(&template_row.slot_value(c.slot_id)))
    }
}

// ----------------------------------------------------------------------
// Filter implementations

fn hash_value(value: &SlotValue<'_>) -> Option<u64> {
    let mut hasher = XxHash64::with_seed(0);
    match value {
        SlotValue::Null => return None,
        SlotValue::Boolean(v) => hasher.write(&[*v as u8]),
        SlotValue::TinyInt(v) => hasher.write(&(*v as i64).to_le_bytes()),
        SlotValue::SmallInt(v) => hasher.write(&(*v as i64).to_le_bytes()),
        SlotValue::Int(v) => hasher.write(&(*v as i64).to_le_bytes()),
        SlotValue::BigInt(v) => hasher.write(&v.to_le_bytes()),
        SlotValue::Float(v) => hasher.write(&(*v as f64).to_bits().to_le_bytes()),
        SlotValue::Double(v) => hasher.write(&v.to_bits().to_le_bytes()),
        SlotValue::String(v) => hasher.write(v),
        SlotValue::Timestamp(v) => {
            hasher.write(&v.nanos_of_day.to_le_bytes());
            hasher.write(&v.julian_day.to_le_bytes());
        }
        SlotValue::Decimal(v) => hasher.write(&v.to_le_bytes()),
        SlotValue::Collection { .. } => return None,
    }
    Some(hasher.finish())
}

const BLOOM_SALTS: [u32; 8] = [
    0x47b6137b, 0x44974d91, 0x8824ad5b, 0xa2b7289d, 0x705495c7, 0x2df1424b, 0x9efc4947, 0x5c6bfb31,
];

/// Split-block bloom filter: each key maps to one 32-byte block and sets one
/// bit in each of its eight 32-bit words.
pub struct BloomFilter {
    blocks: Vec<[u32; 8]>,
}

impl BloomFilter {
    /// `log_num_blocks` of 6 gives a 2 KiB filter.
    pub fn with_log_num_blocks(log_num_blocks: u32) -> Self {
        BloomFilter {
            blocks: vec![[0u32; 8]; 1 << log_num_blocks],
        }
    }

    fn block_index(&self, hash: u64) -> usize {
        (((hash >> 32) * self.blocks.len() as u64) >> 32) as usize
    }

    fn mask(hash: u64) -> [u32; 8] {
        let key = hash as u32;
        let mut mask = [0u32; 8];
        for (i, salt) in BLOOM_SALTS.iter().enumerate() {
            mask[i] = 1 << ((key.wrapping_mul(*salt)) >> 27);
        }
        mask
    }

    pub fn insert_value(&mut self, value: &SlotValue<'_>) {
        if let Some(hash) = hash_value(value) {
            let idx = self.block_index(hash);
            let mask = Self::mask(hash);
            for (word, bit) in self.blocks[idx].iter_mut().zip(mask) {
                *word |= bit;
            }
        }
    }

    pub fn contains(&self, hash: u64) -> bool {
        let block = &self.blocks[self.block_index(hash)];
        block
            .iter()
            .zip(Self::mask(hash))
            .all(|(word, bit)| word & bit != 0)
    }
}

impl RuntimeFilter for BloomFilter {
    fn eval(&self, value: &SlotValue<'_>) -> bool {
        match hash_value(value) {
            // NULL probes cannot be hashed; let them through.
            None => true,
            Some(hash) => self.contains(hash),
        }
    }

    fn always_true(&self) -> bool {
        false
    }
}

/// Min/max runtime filter over i64-comparable slots.
pub struct MinMaxFilter {
    pub min: i64,
    pub max: i64,
}

impl RuntimeFilter for MinMaxFilter {
    fn eval(&self, value: &SlotValue<'_>) -> bool {
        let v = match value {
            SlotValue::TinyInt(v) => *v as i64,
            SlotValue::SmallInt(v) => *v as i64,
            SlotValue::Int(v) => *v as i64,
            SlotValue::BigInt(v) => *v,
            _ => return true,
        };
        v >= self.min && v <= self.max
    }

    fn always_true(&self) -> bool {
        self.min == i64::MIN && self.max == i64::MAX
    }
}
