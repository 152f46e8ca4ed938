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

//! Interfaces to the expression evaluator. The planner compiles predicates
//! into conjuncts; the scanner only scores them against candidate rows and
//! short-circuits on the first false.

use crate::memory::MemPool;
use crate::scan::descriptors::{read_slot_value, SlotValue, TupleDescriptor};

/// One materialized tuple as seen by predicate evaluation.
pub struct TupleRow<'a> {
    pub tuple: &'a [u8],
    pub desc: &'a TupleDescriptor,
    /// The pool that owns the tuple's variable-length payloads.
    pub pool: &'a MemPool,
}

impl<'a> TupleRow<'a> {
    pub fn slot_value(&self, slot_id: usize) -> SlotValue<'a> {
        read_slot_value(self.tuple, &self.desc.slots[slot_id], self.pool)
    }
}

/// A compiled boolean predicate over one row.
pub trait ConjunctEval: Send {
    fn eval(&self, row: &TupleRow<'_>) -> bool;
}

/// Evaluates conjuncts in order; any false short-circuits the row out.
pub fn eval_conjuncts(conjuncts: &[Box<dyn ConjunctEval>], row: &TupleRow<'_>) -> bool {
    conjuncts.iter().all(|c| c.eval(row))
}

/// A statistics-aware predicate scored against a row group's min/max
/// 2-tuple row; returning false proves no row in the group can pass.
pub trait StatsConjunctEval: Send {
    fn eval_stats(&self, min_row: &TupleRow<'_>, max_row: &TupleRow<'_>) -> bool;
}

// ----------------------------------------------------------------------
// Concrete predicates

/// Comparison operators understood by the simple slot predicates below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// Literal operand of a slot comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    String(Vec<u8>),
    Bool(bool),
}

fn compare<T: PartialOrd>(op: CompareOp, lhs: T, rhs: T) -> bool {
    match op {
        CompareOp::Lt => lhs < rhs,
        CompareOp::Le => lhs <= rhs,
        CompareOp::Eq => lhs == rhs,
        CompareOp::Ge => lhs >= rhs,
        CompareOp::Gt => lhs > rhs,
    }
}

fn compare_value(op: CompareOp, value: &SlotValue<'_>, literal: &Literal) -> Option<bool> {
    let result = match (value, literal) {
        (SlotValue::TinyInt(v), Literal::Int(l)) => compare(op, *v as i64, *l),
        (SlotValue::SmallInt(v), Literal::Int(l)) => compare(op, *v as i64, *l),
        (SlotValue::Int(v), Literal::Int(l)) => compare(op, *v as i64, *l),
        (SlotValue::BigInt(v), Literal::Int(l)) => compare(op, *v, *l),
        (SlotValue::Float(v), Literal::Double(l)) => compare(op, *v as f64, *l),
        (SlotValue::Double(v), Literal::Double(l)) => compare(op, *v, *l),
        (SlotValue::String(v), Literal::String(l)) => compare(op, *v, l.as_slice()),
        (SlotValue::Boolean(v), Literal::Bool(l)) => compare(op, *v, *l),
        _ => return None,
    };
    Some(result)
}

/// `slot <op> literal`; NULL never passes.
pub struct SlotCompare {
    pub slot_id: usize,
    pub op: CompareOp,
    pub literal: Literal,
}

impl ConjunctEval for SlotCompare {
    fn eval(&self, row: &TupleRow<'_>) -> bool {
        compare_value(self.op, &row.slot_value(self.slot_id), &self.literal).unwrap_or(false)
    }
}

/// `slot IS NOT NULL`.
pub struct SlotIsNotNull {
    pub slot_id: usize,
}

impl ConjunctEval for SlotIsNotNull {
    fn eval(&self, row: &TupleRow<'_>) -> bool {
        row.slot_value(self.slot_id) != SlotValue::Null
    }
}

/// Statistics form of [`SlotCompare`]: proves `slot <op> literal` cannot
/// hold for any value in `[min, max]`. Missing statistics (NULL slots)
/// never prune.
pub struct StatsSlotCompare {
    pub slot_id: usize,
    pub op: CompareOp,
    pub literal: Literal,
}

impl StatsConjunctEval for StatsSlotCompare {
    fn eval_stats(&self, min_row: &TupleRow<'_>, max_row: &TupleRow<'_>) -> bool {
        let min = min_row.slot_value(self.slot_id);
        let max = max_row.slot_value(self.slot_id);
        if min == SlotValue::Null || max == SlotValue::Null {
            return true;
        }
        // Some value in the range satisfies the predicate iff the relevant
        // bound does.
        let survived = match self.op {
            CompareOp::Lt | CompareOp::Le => compare_value(self.op, &min, &self.literal),
            CompareOp::Gt | CompareOp::Ge => compare_value(self.op, &max, &self.literal),
            CompareOp::Eq => Some(
                compare_value(CompareOp::Le, &min, &self.literal).unwrap_or(true)
                    && compare_value(CompareOp::Ge, &max, &self.literal).unwrap_or(true),
            ),
        };
        survived.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemTracker;
    use crate::scan::descriptors::{slot_bytes_mut, ColumnType};
    use std::sync::Arc;

    fn desc() -> TupleDescriptor {
        TupleDescriptor::new(
            vec![(vec![0], 0, ColumnType::BigInt), (vec![1], 1, ColumnType::String)],
            vec![],
        )
    }

    fn pool() -> MemPool {
        MemPool::new(Arc::new(MemTracker::new_root("test")))
    }

    #[test]
    fn test_slot_compare() {
        let desc = desc();
        let pool = pool();
        let mut tuple = vec![0u8; desc.byte_size];
        slot_bytes_mut(&mut tuple, &desc.slots[0]).copy_from_slice(&42i64.to_le_bytes());
        let row = TupleRow {
            tuple: &tuple,
            desc: &desc,
            pool: &pool,
        };

        let lt = SlotCompare {
            slot_id: 0,
            op: CompareOp::Lt,
            literal: Literal::Int(100),
        };
        let gt = SlotCompare {
            slot_id: 0,
            op: CompareOp::Gt,
            literal: Literal::Int(100),
        };
        assert!(lt.eval(&row));
        assert!(!gt.eval(&row));

        let conjuncts: Vec<Box<dyn ConjunctEval>> = vec![Box::new(lt), Box::new(gt)];
        assert!(!eval_conjuncts(&conjuncts, &row));
    }

    #[test]
    fn test_null_never_passes() {
        let desc = desc();
        let pool = pool();
        let mut tuple = vec![0u8; desc.byte_size];
        crate::scan::descriptors::set_null(&mut tuple, desc.slots[0].null_indicator);
        let row = TupleRow {
            tuple: &tuple,
            desc: &desc,
            pool: &pool,
        };
        let eq = SlotCompare {
            slot_id: 0,
            op: CompareOp::Eq,
            literal: Literal::Int(0),
        };
        assert!(!eq.eval(&row));
        assert!(!SlotIsNotNull { slot_id: 0 }.eval(&row));
    }

    #[test]
    fn test_stats_pruning() {
        let desc = desc();
        let pool = pool();
        let mut min_tuple = vec![0u8; desc.byte_size];
        let mut max_tuple = vec![0u8; desc.byte_size];
        slot_bytes_mut(&mut min_tuple, &desc.slots[0]).copy_from_slice(&10i64.to_le_bytes());
        slot_bytes_mut(&mut max_tuple, &desc.slots[0]).copy_from_slice(&20i64.to_le_bytes());
        let min_row = TupleRow {
            tuple: &min_tuple,
            desc: &desc,
            pool: &pool,
        };
        let max_row = TupleRow {
            tuple: &max_tuple,
            desc: &desc,
            pool: &pool,
        };

        let prunable = StatsSlotCompare {
            slot_id: 0,
            op: CompareOp::Lt,
            literal: Literal::Int(5),
        };
        assert!(!prunable.eval_stats(&min_row, &max_row));

        let not_prunable = StatsSlotCompare {
            slot_id: 0,
            op: CompareOp::Eq,
            literal: Literal::Int(15),
        };
        assert!(not_prunable.eval_stats(&min_row, &max_row));

        let out_of_range_eq = StatsSlotCompare {
            slot_id: 0,
            op: CompareOp::Eq,
            literal: Literal::Int(25),
        };
        assert!(!out_of_range_eq.eval_stats(&min_row, &max_row));
    }
}
