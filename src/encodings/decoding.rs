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

//! Dictionary decoding for PLAIN_DICTIONARY encoded data pages.

use bytes::Bytes;

use crate::data_type::ParquetValue;
use crate::errors::{Result, ScanError};

use super::rle::RleDecoder;

/// Random-access dictionary of typed values addressed by RLE-encoded
/// indices.
///
/// The dictionary page is decoded eagerly into an owned array at
/// [`reset`](Self::reset); each subsequent dict-encoded data page hands its
/// index section to [`set_data`](Self::set_data).
#[derive(Debug, Default)]
pub struct DictDecoder<V: ParquetValue> {
    dictionary: Vec<V>,
    rle_decoder: Option<RleDecoder>,
}

impl<V: ParquetValue> DictDecoder<V> {
    pub fn new() -> Self {
        Self {
            dictionary: Vec::new(),
            rle_decoder: None,
        }
    }

    /// Decodes the uncompressed dictionary page body into the owned value
    /// array. The values are PLAIN encoded back to back.
    pub fn reset(&mut self, dict_bytes: Bytes, fixed_len_size: i32) -> Result<()> {
        self.dictionary.clear();
        self.rle_decoder = None;
        let mut offset = 0;
        while offset < dict_bytes.len() {
            let (value, consumed) =
                V::decode(&dict_bytes, offset, fixed_len_size).map_err(|e| {
                    ScanError::CorruptDictionary(format!(
                        "could not decode dictionary entry {}: {}",
                        self.dictionary.len(),
                        e
                    ))
                })?;
            self.dictionary.push(value);
            offset += consumed;
        }
        Ok(())
    }

    /// Number of entries decoded from the dictionary page.
    pub fn num_entries(&self) -> usize {
        self.dictionary.len()
    }

    /// Initializes the RLE index reader over a data page body. The bit width
    /// of the indices is given by a single leading byte.
    pub fn set_data(&mut self, page_bytes: Bytes) -> Result<()> {
        let Some(&bit_width) = page_bytes.first() else {
            return Err(ScanError::DictDecodeFailure(
                "dict-encoded page is missing the bit-width byte".to_owned(),
            ));
        };
        if bit_width > 32 {
            return Err(ScanError::DictDecodeFailure(format!(
                "invalid dictionary index bit width {bit_width}"
            )));
        }
        let mut decoder = RleDecoder::new(bit_width);
        decoder.set_data(page_bytes.slice(1..));
        self.rle_decoder = Some(decoder);
        Ok(())
    }

    /// Writes the next decoded value into `out`.
    pub fn get_value(&mut self, out: &mut V) -> Result<()> {
        let decoder = self
            .rle_decoder
            .as_mut()
            .ok_or_else(|| ScanError::DictDecodeFailure("no data page set".to_owned()))?;
        let idx: usize = decoder
            .get()
            .ok_or_else(|| ScanError::DictDecodeFailure("index stream underflow".to_owned()))?;
        let value = self.dictionary.get(idx).ok_or_else(|| {
            ScanError::DictDecodeFailure(format!(
                "index {} out of range for dictionary of {} entries",
                idx,
                self.dictionary.len()
            ))
        })?;
        *out = value.clone();
        Ok(())
    }
}
