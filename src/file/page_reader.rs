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

//! Reads, validates and decompresses successive pages from a column chunk
//! stream.

use bytes::Bytes;
use tracing::debug;

use crate::basic::{Compression, Encoding, PageType, Type};
use crate::compression::{create_codec, Codec};
use crate::errors::{Result, ScanError};
use crate::format::{DataPageHeader, PageHeader};
use crate::scan::io::ByteStream;
use crate::thrift::ThriftSliceInputProtocol;

/// A decoded, decompressed page handed to the owning column reader.
pub enum Page {
    /// Dictionary page body. `num_values` is absent only under the
    /// headerless-dictionary compatibility quirk, in which case PLAIN
    /// encoding is assumed.
    Dictionary {
        buf: Bytes,
        num_values: Option<i32>,
        encoding: Encoding,
    },
    /// v1 data page body: level sections followed by values.
    Data { buf: Bytes, header: DataPageHeader },
}

/// Reader for the page stream of one column chunk.
pub struct PageReader {
    stream: Box<dyn ByteStream>,
    decompressor: Option<Box<dyn Codec>>,
    physical_type: Type,
    column_name: String,
    max_page_header_size: usize,
    /// Accept a dictionary page without a dictionary header; set for files
    /// written by impala 1.1.0 and impala-internal 1.2.0, which had a bug
    /// where the dictionary page metadata was not set.
    accept_headerless_dictionary: bool,
    /// Whether the owning reader materializes a slot. Counting readers skip
    /// dictionary pages wholesale: there may be no way to decode the values
    /// without knowing the slot type.
    has_slot: bool,
    saw_dictionary: bool,
}

impl PageReader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: Box<dyn ByteStream>,
        codec: Compression,
        physical_type: Type,
        column_name: String,
        max_page_header_size: usize,
        accept_headerless_dictionary: bool,
        has_slot: bool,
    ) -> Result<Self> {
        Ok(Self {
            stream,
            decompressor: create_codec(codec)?,
            physical_type,
            column_name,
            max_page_header_size,
            accept_headerless_dictionary,
            has_slot,
            saw_dictionary: false,
        })
    }

    pub fn stream(&self) -> &dyn ByteStream {
        self.stream.as_ref()
    }

    /// Reads the next dictionary or data page, skipping page types this
    /// scanner does not care about. Returns `None` once the column chunk
    /// range is exhausted.
    pub fn next_page(&mut self) -> Result<Option<Page>> {
        loop {
            if self.stream.eof() {
                return Ok(None);
            }
            let header = self.read_page_header()?;
            let compressed_size = header.compressed_page_size as usize;
            let uncompressed_size = header.uncompressed_page_size as usize;

            match header.type_ {
                Some(PageType::DICTIONARY_PAGE) => {
                    if !self.has_slot {
                        // No values will be decoded from this column;
                        // skip the dictionary outright.
                        self.stream.skip_bytes(compressed_size)?;
                        continue;
                    }
                    if self.saw_dictionary {
                        return Err(general_err!(
                            "column '{}' contains two dictionary pages",
                            self.column_name
                        ));
                    }
                    if self.physical_type == Type::BOOLEAN {
                        return Err(general_err!(
                            "unexpected dictionary page: dictionary encoding is not supported for booleans"
                        ));
                    }
                    let (num_values, encoding) = match &header.dictionary_page_header {
                        Some(dict_header) => {
                            if dict_header.encoding != Encoding::PLAIN
                                && dict_header.encoding != Encoding::PLAIN_DICTIONARY
                            {
                                return Err(general_err!(
                                    "only PLAIN and PLAIN_DICTIONARY encodings are supported for dictionary pages, got {}",
                                    dict_header.encoding
                                ));
                            }
                            (Some(dict_header.num_values), dict_header.encoding)
                        }
                        None => {
                            if !self.accept_headerless_dictionary {
                                return Err(ScanError::CorruptDictionary(format!(
                                    "dictionary page of column '{}' does not have a dictionary header set",
                                    self.column_name
                                )));
                            }
                            (None, Encoding::PLAIN)
                        }
                    };
                    let buf = self.read_page_body(compressed_size, uncompressed_size, "dictionary")?;
                    self.saw_dictionary = true;
                    return Ok(Some(Page::Dictionary {
                        buf,
                        num_values,
                        encoding,
                    }));
                }
                Some(PageType::DATA_PAGE) => {
                    let data_header = header.data_page_header.clone().ok_or_else(|| {
                        general_err!("data page of column '{}' has no header", self.column_name)
                    })?;
                    let buf = self.read_page_body(compressed_size, uncompressed_size, "data")?;
                    return Ok(Some(Page::Data {
                        buf,
                        header: data_header,
                    }));
                }
                // Other page types (index pages, v2 data pages, unknown
                // future types) are safely skipped.
                _ => {
                    self.stream.skip_bytes(compressed_size)?;
                    continue;
                }
            }
        }
    }

    /// Deserializes the next page header. The header size is unknown until
    /// deserialization succeeds, so peek and retry with a doubled window
    /// until it does, capped at `max_page_header_size`.
    fn read_page_header(&mut self) -> Result<PageHeader> {
        let mut peek_size = 1024usize;
        let mut last_len = 0usize;
        loop {
            let buf = self.stream.peek_bytes(peek_size)?;
            let mut prot = ThriftSliceInputProtocol::new(&buf);
            match PageHeader::read_from(&mut prot) {
                Ok(header) => {
                    let header_len = buf.len() - prot.remaining();
                    self.stream.skip_bytes(header_len)?;
                    return Ok(header);
                }
                Err(e) => {
                    if buf.len() >= self.max_page_header_size {
                        return Err(general_err!(
                            "could not read page of column '{}': page header exceeded maximum size of {} bytes: {}",
                            self.column_name,
                            self.max_page_header_size,
                            e
                        ));
                    }
                    if buf.len() == last_len {
                        // The stream has no more bytes to offer.
                        return Err(ScanError::HeaderEof(format!(
                            "column '{}' ended inside a page header",
                            self.column_name
                        )));
                    }
                    last_len = buf.len();
                    peek_size = (peek_size * 2).max(1024);
                }
            }
        }
    }

    fn read_page_body(
        &mut self,
        compressed_size: usize,
        uncompressed_size: usize,
        what: &str,
    ) -> Result<Bytes> {
        let data = self.stream.read_bytes(compressed_size)?;
        match &mut self.decompressor {
            Some(decompressor) => {
                let mut decompressed = Vec::with_capacity(uncompressed_size);
                let n = decompressor.decompress(&data, &mut decompressed, Some(uncompressed_size))?;
                debug!(
                    column = %self.column_name,
                    compressed_size,
                    uncompressed_size = n,
                    "decompressed page"
                );
                if n != uncompressed_size {
                    return Err(general_err!(
                        "error decompressing {} page of column '{}': expected {} uncompressed bytes but got {}",
                        what,
                        self.column_name,
                        uncompressed_size,
                        n
                    ));
                }
                Ok(decompressed.into())
            }
            None => {
                if compressed_size != uncompressed_size {
                    return Err(general_err!(
                        "error reading {} page of column '{}': expected {} bytes but got {}",
                        what,
                        self.column_name,
                        uncompressed_size,
                        compressed_size
                    ));
                }
                Ok(data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::io::{InMemoryStream, ScanRange};
    use crate::thrift::ThriftCompactOutputProtocol;
    use crate::util::test_common::{
        make_data_page, make_dict_page, plain_encode_i32s, PageSpec,
    };

    const MAX_HEADER: usize = 8 * 1024 * 1024;

    fn chunk_bytes(pages: &[PageSpec]) -> Bytes {
        let mut buf = Vec::new();
        for page in pages {
            let mut prot = ThriftCompactOutputProtocol::new();
            page.header.write_to(&mut prot);
            buf.extend_from_slice(&prot.into_inner());
            buf.extend_from_slice(&page.body);
        }
        buf.into()
    }

    fn reader_over(
        pages: &[PageSpec],
        codec: Compression,
        physical_type: Type,
        accept_headerless: bool,
        has_slot: bool,
    ) -> PageReader {
        let bytes = chunk_bytes(pages);
        let range = ScanRange {
            path: "f".into(),
            offset: 0,
            len: bytes.len() as u64,
            disk_id: 0,
            try_cache: false,
            expected_local: true,
            mtime: 0,
        };
        PageReader::new(
            Box::new(InMemoryStream::new(bytes, range)),
            codec,
            physical_type,
            "c".into(),
            MAX_HEADER,
            accept_headerless,
            has_slot,
        )
        .unwrap()
    }

    #[test]
    fn test_plain_data_page() {
        let values = plain_encode_i32s(&[1, 2, 3]);
        let page = make_data_page(
            3,
            0,
            &[],
            0,
            &[],
            Encoding::PLAIN,
            &values,
            Compression::UNCOMPRESSED,
        );
        let mut reader = reader_over(&[page], Compression::UNCOMPRESSED, Type::INT32, false, true);
        match reader.next_page().unwrap().unwrap() {
            Page::Data { buf, header } => {
                assert_eq!(header.num_values, 3);
                assert_eq!(buf.as_ref(), values.as_slice());
            }
            _ => panic!("expected data page"),
        }
        assert!(reader.next_page().unwrap().is_none());
    }

    #[test]
    fn test_snappy_page_round_trip() {
        let values = plain_encode_i32s(&(0..1000).collect::<Vec<_>>());
        let page = make_data_page(
            1000,
            0,
            &[],
            0,
            &[],
            Encoding::PLAIN,
            &values,
            Compression::SNAPPY,
        );
        assert_ne!(page.body.len(), values.len());
        let mut reader = reader_over(&[page], Compression::SNAPPY, Type::INT32, false, true);
        match reader.next_page().unwrap().unwrap() {
            Page::Data { buf, .. } => assert_eq!(buf.as_ref(), values.as_slice()),
            _ => panic!("expected data page"),
        }
    }

    #[test]
    fn test_dictionary_then_data() {
        let dict = plain_encode_i32s(&[7, 8]);
        let pages = vec![
            make_dict_page(&dict, 2, Compression::UNCOMPRESSED, true),
            make_data_page(
                2,
                0,
                &[],
                0,
                &[],
                Encoding::PLAIN_DICTIONARY,
                &[1, 0],
                Compression::UNCOMPRESSED,
            ),
        ];
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, false, true);
        match reader.next_page().unwrap().unwrap() {
            Page::Dictionary {
                buf,
                num_values,
                encoding,
            } => {
                assert_eq!(buf.as_ref(), dict.as_slice());
                assert_eq!(num_values, Some(2));
                assert_eq!(encoding, Encoding::PLAIN_DICTIONARY);
            }
            _ => panic!("expected dictionary page"),
        }
        assert!(matches!(reader.next_page().unwrap(), Some(Page::Data { .. })));
    }

    #[test]
    fn test_counting_reader_skips_dictionary() {
        let dict = plain_encode_i32s(&[7, 8]);
        let pages = vec![
            make_dict_page(&dict, 2, Compression::UNCOMPRESSED, true),
            make_data_page(
                1,
                0,
                &[],
                0,
                &[],
                Encoding::PLAIN_DICTIONARY,
                &[1, 0],
                Compression::UNCOMPRESSED,
            ),
        ];
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, false, false);
        assert!(matches!(reader.next_page().unwrap(), Some(Page::Data { .. })));
    }

    #[test]
    fn test_headerless_dictionary_quirk() {
        let dict = plain_encode_i32s(&[7]);
        let pages = vec![make_dict_page(&dict, 1, Compression::UNCOMPRESSED, false)];
        // Accepted under the impala 1.1 quirk, PLAIN encoding assumed.
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, true, true);
        match reader.next_page().unwrap().unwrap() {
            Page::Dictionary {
                num_values,
                encoding,
                ..
            } => {
                assert_eq!(num_values, None);
                assert_eq!(encoding, Encoding::PLAIN);
            }
            _ => panic!("expected dictionary page"),
        }

        // Rejected otherwise.
        let pages = vec![make_dict_page(&dict, 1, Compression::UNCOMPRESSED, false)];
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, false, true);
        assert!(matches!(
            reader.next_page(),
            Err(ScanError::CorruptDictionary(_))
        ));
    }

    #[test]
    fn test_two_dictionaries_rejected() {
        let dict = plain_encode_i32s(&[7]);
        let pages = vec![
            make_dict_page(&dict, 1, Compression::UNCOMPRESSED, true),
            make_dict_page(&dict, 1, Compression::UNCOMPRESSED, true),
        ];
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, false, true);
        reader.next_page().unwrap();
        assert!(reader.next_page().is_err());
    }

    #[test]
    fn test_index_page_skipped() {
        let mut index_page = make_data_page(
            0,
            0,
            &[],
            0,
            &[],
            Encoding::PLAIN,
            b"not real index data",
            Compression::UNCOMPRESSED,
        );
        index_page.header.type_ = Some(PageType::INDEX_PAGE);
        index_page.header.data_page_header = None;
        let pages = vec![
            index_page,
            make_data_page(
                1,
                0,
                &[],
                0,
                &[],
                Encoding::PLAIN,
                &plain_encode_i32s(&[5]),
                Compression::UNCOMPRESSED,
            ),
        ];
        let mut reader = reader_over(&pages, Compression::UNCOMPRESSED, Type::INT32, false, true);
        match reader.next_page().unwrap().unwrap() {
            Page::Data { header, .. } => assert_eq!(header.num_values, 1),
            _ => panic!("expected data page"),
        }
    }

    #[test]
    fn test_truncated_header_is_eof() {
        let page = make_data_page(
            1,
            0,
            &[],
            0,
            &[],
            Encoding::PLAIN,
            &plain_encode_i32s(&[5]),
            Compression::UNCOMPRESSED,
        );
        let bytes = chunk_bytes(&[page]);
        let truncated = bytes.slice(..2);
        let range = ScanRange {
            path: "f".into(),
            offset: 0,
            len: 2,
            disk_id: 0,
            try_cache: false,
            expected_local: true,
            mtime: 0,
        };
        let mut reader = PageReader::new(
            Box::new(InMemoryStream::new(truncated, range)),
            Compression::UNCOMPRESSED,
            Type::INT32,
            "c".into(),
            MAX_HEADER,
            false,
            true,
        )
        .unwrap();
        assert!(matches!(reader.next_page(), Err(ScanError::HeaderEof(_))));
    }
}
