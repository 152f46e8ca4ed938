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

//! Decoder for the Parquet RLE / bit-packing hybrid encoding.
//!
//! The encoded stream is a sequence of runs, each preceded by a VLQ
//! indicator. An even indicator announces a repeated run of
//! `indicator >> 1` copies of a single byte-aligned value; an odd indicator
//! announces `(indicator >> 1) * 8` bit-packed literal values.

use bytes::Bytes;

use crate::errors::Result;
use crate::util::bit_util::{ceil, BitReader, FromU64};

/// Decoder for RLE/bit-packed hybrid encoded values with a fixed bit width.
#[derive(Debug, Default)]
pub struct RleDecoder {
    bit_width: u8,
    bit_reader: BitReader,
    /// Remaining values in the current repeated run.
    repeat_count: usize,
    /// Remaining values in the current literal run.
    literal_count: usize,
    current_value: u64,
}

impl RleDecoder {
    pub fn new(bit_width: u8) -> Self {
        debug_assert!(bit_width <= 64);
        Self {
            bit_width,
            ..Default::default()
        }
    }

    pub fn set_data(&mut self, data: Bytes) {
        self.bit_reader.reset(data);
        self.repeat_count = 0;
        self.literal_count = 0;
        self.current_value = 0;
    }

    /// Remaining values in the currently decoded repeated run.
    pub fn repeat_count(&self) -> usize {
        self.repeat_count
    }

    /// Remaining values in the currently decoded literal run.
    pub fn literal_count(&self) -> usize {
        self.literal_count
    }

    /// The value repeated by the current repeated run.
    pub fn current_value(&self) -> u64 {
        self.current_value
    }

    /// Decodes the next run header. Returns false when the stream is
    /// exhausted or corrupt.
    pub fn next_run(&mut self) -> bool {
        debug_assert_eq!(self.repeat_count, 0);
        debug_assert_eq!(self.literal_count, 0);
        let Some(indicator) = self.bit_reader.get_vlq_int() else {
            return false;
        };
        if indicator & 1 == 1 {
            self.literal_count = (indicator >> 1) as usize * 8;
            self.literal_count != 0
        } else {
            self.repeat_count = (indicator >> 1) as usize;
            if self.repeat_count == 0 {
                return false;
            }
            let value_bytes = ceil(self.bit_width as usize, 8);
            match self.bit_reader.get_aligned(value_bytes) {
                Some(v) => {
                    self.current_value = v;
                    true
                }
                None => {
                    self.repeat_count = 0;
                    false
                }
            }
        }
    }

    /// Reads one literal value from the bit-packed section of the current
    /// run.
    fn next_literal<T: FromU64>(&mut self) -> Option<T> {
        debug_assert!(self.literal_count > 0);
        self.literal_count -= 1;
        self.bit_reader.get_value(self.bit_width as usize)
    }

    /// Returns the next value, or `None` when the stream is exhausted or
    /// corrupt.
    pub fn get<T: FromU64>(&mut self) -> Option<T> {
        if self.repeat_count == 0 && self.literal_count == 0 && !self.next_run() {
            return None;
        }
        if self.repeat_count > 0 {
            self.repeat_count -= 1;
            Some(T::from_u64(self.current_value))
        } else {
            self.next_literal()
        }
    }

    /// Fills `buffer` with decoded values, returning the number decoded
    /// before the stream ran out.
    pub fn get_batch<T: FromU64>(&mut self, buffer: &mut [T]) -> Result<usize> {
        let mut values_read = 0;
        while values_read < buffer.len() {
            if self.repeat_count > 0 {
                let repeat = self.repeat_count.min(buffer.len() - values_read);
                let v = T::from_u64(self.current_value);
                buffer[values_read..values_read + repeat].fill(v);
                self.repeat_count -= repeat;
                values_read += repeat;
            } else if self.literal_count > 0 {
                let literal = self.literal_count.min(buffer.len() - values_read);
                for out in &mut buffer[values_read..values_read + literal] {
                    match self.next_literal() {
                        Some(v) => *out = v,
                        None => return Ok(values_read),
                    }
                    values_read += 1;
                }
            } else if !self.next_run() {
                break;
            }
        }
        Ok(values_read)
    }

    /// Decodes dictionary indices and resolves them against `dict`,
    /// writing up to `max_values` entries into `buffer`. Returns `None` on
    /// index-stream underflow or an out-of-range index.
    pub fn get_batch_with_dict<T: Clone>(
        &mut self,
        dict: &[T],
        buffer: &mut [T],
        max_values: usize,
    ) -> Option<usize> {
        let max_values = max_values.min(buffer.len());
        for (i, out) in buffer[..max_values].iter_mut().enumerate() {
            let idx: usize = match self.get() {
                Some(idx) => idx,
                None => return Some(i),
            };
            *out = dict.get(idx)?.clone();
        }
        Some(max_values)
    }

    /// Skips `num_values` values, returning the number actually skipped.
    pub fn skip(&mut self, num_values: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < num_values {
            if self.repeat_count > 0 {
                let repeat = self.repeat_count.min(num_values - skipped);
                self.repeat_count -= repeat;
                skipped += repeat;
            } else if self.literal_count > 0 {
                let literal = self.literal_count.min(num_values - skipped);
                self.literal_count -= literal;
                let actual = self.bit_reader.skip(literal, self.bit_width as usize);
                skipped += actual;
                if actual < literal {
                    break;
                }
            } else if !self.next_run() {
                break;
            }
        }
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_common::RleEncoder;

    #[test]
    fn test_repeated_run() {
        let mut encoder = RleEncoder::new(3);
        for _ in 0..100 {
            encoder.put(5);
        }
        let mut decoder = RleDecoder::new(3);
        decoder.set_data(encoder.consume().into());
        let mut out = vec![0u8; 100];
        assert_eq!(decoder.get_batch(&mut out).unwrap(), 100);
        assert!(out.iter().all(|&v| v == 5));
        assert_eq!(decoder.get::<u8>(), None);
    }

    #[test]
    fn test_literal_run() {
        let values: Vec<u64> = (0..64).map(|i| i % 8).collect();
        let mut encoder = RleEncoder::new(3);
        for &v in &values {
            encoder.put(v);
        }
        let mut decoder = RleDecoder::new(3);
        decoder.set_data(encoder.consume().into());
        let mut out = vec![0u64; 64];
        assert_eq!(decoder.get_batch(&mut out).unwrap(), 64);
        assert_eq!(out, values);
    }

    #[test]
    fn test_mixed_runs_and_skip() {
        let mut values = vec![1u64; 40];
        values.extend((0..16).map(|i| i % 4));
        values.extend(vec![3u64; 25]);
        let mut encoder = RleEncoder::new(2);
        for &v in &values {
            encoder.put(v);
        }
        let mut decoder = RleDecoder::new(2);
        decoder.set_data(encoder.consume().into());
        assert_eq!(decoder.skip(10).unwrap(), 10);
        let mut out = vec![0u64; values.len() - 10];
        let n = decoder.get_batch(&mut out).unwrap();
        assert_eq!(n, values.len() - 10);
        assert_eq!(out, values[10..]);
    }

    #[test]
    fn test_random_runs_round_trip() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(42);
        for bit_width in [1u8, 2, 5, 8, 13] {
            let max = (1u64 << bit_width) - 1;
            let mut values = Vec::with_capacity(2000);
            while values.len() < 2000 {
                // Alternate runs and noise so both run kinds are hit.
                if rng.gen_bool(0.5) {
                    let v = rng.gen_range(0..=max);
                    for _ in 0..rng.gen_range(1..40) {
                        values.push(v);
                    }
                } else {
                    values.push(rng.gen_range(0..=max));
                }
            }
            let mut encoder = RleEncoder::new(bit_width);
            for &v in &values {
                encoder.put(v);
            }
            let mut decoder = RleDecoder::new(bit_width);
            decoder.set_data(encoder.consume().into());
            let mut out = vec![0u64; values.len()];
            assert_eq!(decoder.get_batch(&mut out).unwrap(), values.len());
            assert_eq!(out, values);
        }
    }

    #[test]
    fn test_dict_resolution() {
        let dict = vec!["a", "b", "c"];
        let mut encoder = RleEncoder::new(2);
        for idx in [0u64, 1, 1, 2, 0] {
            encoder.put(idx);
        }
        let mut decoder = RleDecoder::new(2);
        decoder.set_data(encoder.consume().into());
        let mut out = vec![""; 5];
        assert_eq!(decoder.get_batch_with_dict(&dict, &mut out, 5), Some(5));
        assert_eq!(out, vec!["a", "b", "b", "c", "a"]);
    }

    #[test]
    fn test_dict_out_of_range() {
        let dict = vec![10i32, 20];
        let mut encoder = RleEncoder::new(3);
        encoder.put(7);
        let mut decoder = RleDecoder::new(3);
        decoder.set_data(encoder.consume().into());
        let mut out = vec![0i32; 1];
        assert_eq!(decoder.get_batch_with_dict(&dict, &mut out, 1), None);
    }
}
