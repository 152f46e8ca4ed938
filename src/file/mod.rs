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

//! Physical file layer: footer, pages, writer versions.

pub mod footer;
pub mod page_reader;
pub mod version;

/// Fixed trailer of a Parquet file: 4-byte metadata length plus the magic.
pub const FOOTER_SIZE: usize = 8;

pub const PARQUET_MAGIC: [u8; 4] = [b'P', b'A', b'R', b'1'];

/// Highest file metadata version this scanner accepts.
pub const PARQUET_CURRENT_VERSION: i32 = 2;

/// Size of the speculative footer range issued by the planner; large enough
/// for almost all footers so the metadata is fetched in one read.
pub const FOOTER_RANGE_SIZE: u64 = 100 * 1024;

/// Upper bound on the bytes a dictionary page header may occupy, used to pad
/// column ranges for old parquet-mr writers that excluded it from
/// `total_compressed_size`.
pub const MAX_DICT_HEADER_SIZE: i64 = 100;
