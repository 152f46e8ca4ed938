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

//! Block compression codecs for page bodies.

use std::io::{Read, Write};

use crate::basic::Compression;
use crate::errors::{Result, ScanError};

/// A compression codec. `decompress` appends to `output_buf` and returns the
/// number of bytes produced; `uncompress_size`, when known from the page
/// header, sizes the output buffer up front.
pub trait Codec: Send {
    fn decompress(
        &mut self,
        input_buf: &[u8],
        output_buf: &mut Vec<u8>,
        uncompress_size: Option<usize>,
    ) -> Result<usize>;

    fn compress(&mut self, input_buf: &[u8], output_buf: &mut Vec<u8>) -> Result<()>;
}

/// Given the compression type `codec`, returns a codec used to compress and
/// decompress bytes, or `None` for `UNCOMPRESSED`.
pub fn create_codec(codec: Compression) -> Result<Option<Box<dyn Codec>>> {
    match codec {
        Compression::UNCOMPRESSED => Ok(None),
        Compression::SNAPPY => Ok(Some(Box::new(SnappyCodec::new()))),
        Compression::GZIP => Ok(Some(Box::new(GZipCodec::new()))),
        other => Err(ScanError::UnsupportedCompression(format!("{other}"))),
    }
}

/// Codec for Snappy compression format.
pub struct SnappyCodec {
    decoder: snap::raw::Decoder,
    encoder: snap::raw::Encoder,
}

impl SnappyCodec {
    fn new() -> Self {
        Self {
            decoder: snap::raw::Decoder::new(),
            encoder: snap::raw::Encoder::new(),
        }
    }
}

impl Codec for SnappyCodec {
    fn decompress(
        &mut self,
        input_buf: &[u8],
        output_buf: &mut Vec<u8>,
        uncompress_size: Option<usize>,
    ) -> Result<usize> {
        let len = match uncompress_size {
            Some(size) => size,
            None => snap::raw::decompress_len(input_buf)?,
        };
        let offset = output_buf.len();
        output_buf.resize(offset + len, 0);
        let decompressed = self
            .decoder
            .decompress(input_buf, &mut output_buf[offset..])?;
        output_buf.truncate(offset + decompressed);
        Ok(decompressed)
    }

    fn compress(&mut self, input_buf: &[u8], output_buf: &mut Vec<u8>) -> Result<()> {
        let required = snap::raw::max_compress_len(input_buf.len());
        let offset = output_buf.len();
        output_buf.resize(offset + required, 0);
        let n = self.encoder.compress(input_buf, &mut output_buf[offset..])?;
        output_buf.truncate(offset + n);
        Ok(())
    }
}

/// Codec for GZIP compression format.
pub struct GZipCodec {}

impl GZipCodec {
    fn new() -> Self {
        Self {}
    }
}

impl Codec for GZipCodec {
    fn decompress(
        &mut self,
        input_buf: &[u8],
        output_buf: &mut Vec<u8>,
        _uncompress_size: Option<usize>,
    ) -> Result<usize> {
        let offset = output_buf.len();
        let mut decoder = flate2::read::GzDecoder::new(input_buf);
        decoder
            .read_to_end(output_buf)
            .map_err(|e| general_err!("gzip: {}", e))?;
        Ok(output_buf.len() - offset)
    }

    fn compress(&mut self, input_buf: &[u8], output_buf: &mut Vec<u8>) -> Result<()> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(input_buf)
            .and_then(|_| encoder.finish())
            .map(|compressed| output_buf.extend_from_slice(&compressed))
            .map_err(|e| general_err!("gzip: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(compression: Compression, data: &[u8]) {
        let mut codec = create_codec(compression).unwrap().unwrap();
        let mut compressed = Vec::new();
        codec.compress(data, &mut compressed).unwrap();
        let mut decompressed = Vec::new();
        let n = codec
            .decompress(&compressed, &mut decompressed, Some(data.len()))
            .unwrap();
        assert_eq!(n, data.len());
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_snappy_round_trip() {
        round_trip(Compression::SNAPPY, b"the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_gzip_round_trip() {
        let data: Vec<u8> = (0..10_000u32).map(|v| (v % 251) as u8).collect();
        round_trip(Compression::GZIP, &data);
    }

    #[test]
    fn test_uncompressed_has_no_codec() {
        assert!(create_codec(Compression::UNCOMPRESSED).unwrap().is_none());
    }

    #[test]
    fn test_unsupported_codec() {
        assert!(matches!(
            create_codec(Compression::ZSTD),
            Err(ScanError::UnsupportedCompression(_))
        ));
    }
}
