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

//! Thrift [compact protocol] primitives used to decode Parquet metadata and
//! page headers, plus the encoder half used to build synthetic files in
//! tests.
//!
//! [compact protocol]: https://github.com/apache/thrift/blob/master/doc/specs/thrift-compact-protocol.md

use crate::errors::{Result, ScanError};

/// Thrift compact protocol types for struct fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldType {
    Stop = 0,
    BooleanTrue = 1,
    BooleanFalse = 2,
    Byte = 3,
    I16 = 4,
    I32 = 5,
    I64 = 6,
    Double = 7,
    Binary = 8,
    List = 9,
    Set = 10,
    Map = 11,
    Struct = 12,
}

impl TryFrom<u8> for FieldType {
    type Error = ScanError;
    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Stop,
            1 => Self::BooleanTrue,
            2 => Self::BooleanFalse,
            3 => Self::Byte,
            4 => Self::I16,
            5 => Self::I32,
            6 => Self::I64,
            7 => Self::Double,
            8 => Self::Binary,
            9 => Self::List,
            10 => Self::Set,
            11 => Self::Map,
            12 => Self::Struct,
            _ => return Err(general_err!("unexpected struct field type {}", value)),
        })
    }
}

/// Describes a thrift struct field during decoding.
pub struct FieldIdentifier {
    pub field_type: FieldType,
    /// Computed from the delta or directly decoded.
    pub id: i16,
    /// Boolean fields store no data; the field type itself carries the
    /// value.
    pub bool_val: Option<bool>,
}

/// Describes a thrift list during decoding.
pub struct ListIdentifier {
    pub element_type: FieldType,
    pub size: usize,
}

/// Decoder for objects serialized with the Thrift compact protocol, reading
/// from a byte slice.
pub struct ThriftSliceInputProtocol<'a> {
    buf: &'a [u8],
}

impl<'a> ThriftSliceInputProtocol<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let (first, rest) = self
            .buf
            .split_first()
            .ok_or_else(|| eof_err!("unexpected end of thrift input"))?;
        self.buf = rest;
        Ok(*first)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.buf.len() {
            return Err(eof_err!("unexpected end of thrift input"));
        }
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    fn read_vlq(&mut self) -> Result<u64> {
        let mut v: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.read_byte()?;
            v |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(v);
            }
        }
        Err(general_err!("malformed thrift varint"))
    }

    fn read_zigzag(&mut self) -> Result<i64> {
        let v = self.read_vlq()?;
        Ok(((v >> 1) as i64) ^ -((v & 1) as i64))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_zigzag()? as i16)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_zigzag()? as i32)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_zigzag()
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.read_bytes(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_binary(&mut self) -> Result<&'a [u8]> {
        let len = self.read_vlq()? as usize;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        Ok(std::str::from_utf8(self.read_binary()?)?.to_owned())
    }

    /// Reads a struct field header. `last_field_id` is the id of the
    /// previous field at this nesting level (0 at struct start).
    pub fn read_field_begin(&mut self, last_field_id: i16) -> Result<FieldIdentifier> {
        let byte = self.read_byte()?;
        let field_type = FieldType::try_from(byte & 0x0F)?;
        if field_type == FieldType::Stop {
            return Ok(FieldIdentifier {
                field_type,
                id: 0,
                bool_val: None,
            });
        }
        let delta = byte >> 4;
        let id = if delta == 0 {
            self.read_i16()?
        } else {
            last_field_id
                .checked_add(delta as i16)
                .ok_or_else(|| general_err!("thrift field id overflow"))?
        };
        let bool_val = match field_type {
            FieldType::BooleanTrue => Some(true),
            FieldType::BooleanFalse => Some(false),
            _ => None,
        };
        Ok(FieldIdentifier {
            field_type,
            id,
            bool_val,
        })
    }

    pub fn read_list_begin(&mut self) -> Result<ListIdentifier> {
        let byte = self.read_byte()?;
        let element_type = FieldType::try_from(byte & 0x0F)?;
        let short_size = byte >> 4;
        let size = if short_size == 0x0F {
            self.read_vlq()? as usize
        } else {
            short_size as usize
        };
        Ok(ListIdentifier { element_type, size })
    }

    /// Skips over a field of the given type, recursing through containers.
    pub fn skip(&mut self, field_type: FieldType) -> Result<()> {
        self.skip_depth(field_type, 10)
    }

    fn skip_depth(&mut self, field_type: FieldType, depth: u8) -> Result<()> {
        if depth == 0 {
            return Err(general_err!("thrift skip recursion too deep"));
        }
        match field_type {
            FieldType::Stop => Err(general_err!("cannot skip stop field")),
            FieldType::BooleanTrue | FieldType::BooleanFalse => Ok(()),
            FieldType::Byte => self.read_byte().map(|_| ()),
            FieldType::I16 | FieldType::I32 | FieldType::I64 => self.read_zigzag().map(|_| ()),
            FieldType::Double => self.read_double().map(|_| ()),
            FieldType::Binary => self.read_binary().map(|_| ()),
            FieldType::List | FieldType::Set => {
                let list = self.read_list_begin()?;
                for _ in 0..list.size {
                    // Bools in containers are one byte, unlike struct
                    // fields.
                    match list.element_type {
                        FieldType::BooleanTrue | FieldType::BooleanFalse => {
                            self.read_byte()?;
                        }
                        other => self.skip_depth(other, depth - 1)?,
                    }
                }
                Ok(())
            }
            FieldType::Struct => {
                let mut last_field_id = 0i16;
                loop {
                    let field = self.read_field_begin(last_field_id)?;
                    if field.field_type == FieldType::Stop {
                        return Ok(());
                    }
                    if field.bool_val.is_none() {
                        self.skip_depth(field.field_type, depth - 1)?;
                    }
                    last_field_id = field.id;
                }
            }
            FieldType::Map => Err(general_err!("cannot skip thrift map field")),
        }
    }
}

// ----------------------------------------------------------------------
// Encoder, used by tests to construct synthetic files

/// Encoder for the Thrift compact protocol. Only the subset needed to write
/// Parquet page headers and file metadata is implemented.
#[derive(Default)]
pub struct ThriftCompactOutputProtocol {
    buf: Vec<u8>,
}

impl ThriftCompactOutputProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    fn write_vlq(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn write_zigzag(&mut self, v: i64) {
        self.write_vlq(((v << 1) ^ (v >> 63)) as u64);
    }

    /// Writes a field header. Returns the id for chaining as the next
    /// `last_field_id`.
    pub fn write_field_begin(&mut self, field_type: FieldType, id: i16, last_field_id: i16) -> i16 {
        let delta = id.wrapping_sub(last_field_id);
        if (1..=15).contains(&delta) {
            self.buf.push(((delta as u8) << 4) | field_type as u8);
        } else {
            self.buf.push(field_type as u8);
            self.write_zigzag(id as i64);
        }
        id
    }

    pub fn write_stop(&mut self) {
        self.buf.push(FieldType::Stop as u8);
    }

    pub fn write_bool_field(&mut self, id: i16, last_field_id: i16, value: bool) -> i16 {
        let field_type = if value {
            FieldType::BooleanTrue
        } else {
            FieldType::BooleanFalse
        };
        self.write_field_begin(field_type, id, last_field_id)
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_zigzag(v as i64);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write_zigzag(v);
    }

    pub fn write_binary(&mut self, data: &[u8]) {
        self.write_vlq(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    pub fn write_list_begin(&mut self, element_type: FieldType, size: usize) {
        if size < 15 {
            self.buf.push(((size as u8) << 4) | element_type as u8);
        } else {
            self.buf.push(0xF0 | element_type as u8);
            self.write_vlq(size as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_round_trip() {
        let mut out = ThriftCompactOutputProtocol::new();
        for v in [0i64, -1, 1, -2, 63, -64, i32::MAX as i64, i32::MIN as i64] {
            out.write_zigzag(v);
        }
        let buf = out.into_inner();
        let mut prot = ThriftSliceInputProtocol::new(&buf);
        for v in [0i64, -1, 1, -2, 63, -64, i32::MAX as i64, i32::MIN as i64] {
            assert_eq!(prot.read_zigzag().unwrap(), v);
        }
        assert_eq!(prot.remaining(), 0);
    }

    #[test]
    fn test_field_header_round_trip() {
        let mut out = ThriftCompactOutputProtocol::new();
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(42);
        last = out.write_field_begin(FieldType::Binary, 4, last);
        out.write_binary(b"abc");
        // Large delta forces the explicit id form.
        out.write_field_begin(FieldType::I64, 100, last);
        out.write_i64(-7);
        out.write_stop();

        let buf = out.into_inner();
        let mut prot = ThriftSliceInputProtocol::new(&buf);
        let f = prot.read_field_begin(0).unwrap();
        assert_eq!((f.field_type, f.id), (FieldType::I32, 1));
        assert_eq!(prot.read_i32().unwrap(), 42);
        let f = prot.read_field_begin(f.id).unwrap();
        assert_eq!((f.field_type, f.id), (FieldType::Binary, 4));
        assert_eq!(prot.read_binary().unwrap(), b"abc");
        let f = prot.read_field_begin(f.id).unwrap();
        assert_eq!((f.field_type, f.id), (FieldType::I64, 100));
        assert_eq!(prot.read_i64().unwrap(), -7);
        let f = prot.read_field_begin(f.id).unwrap();
        assert_eq!(f.field_type, FieldType::Stop);
    }

    #[test]
    fn test_skip_struct() {
        // struct { 1: i32, 2: string, 3: list<i32> } followed by an i32.
        let mut out = ThriftCompactOutputProtocol::new();
        let mut last = 0i16;
        last = out.write_field_begin(FieldType::I32, 1, last);
        out.write_i32(9);
        last = out.write_field_begin(FieldType::Binary, 2, last);
        out.write_binary(b"skip me");
        out.write_field_begin(FieldType::List, 3, last);
        out.write_list_begin(FieldType::I32, 3);
        for v in [1, 2, 3] {
            out.write_i32(v);
        }
        out.write_stop();
        out.write_i32(77);

        let buf = out.into_inner();
        let mut prot = ThriftSliceInputProtocol::new(&buf);
        prot.skip(FieldType::Struct).unwrap();
        assert_eq!(prot.read_i32().unwrap(), 77);
    }
}
