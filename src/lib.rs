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

//! Columnar [Apache Parquet](https://parquet.apache.org/) scanner.
//!
//! Given the byte layout of a Parquet file and a request naming a set of
//! materialized columns (possibly nested), this crate produces a stream of
//! row batches containing the decoded values for those columns, with
//! predicate push-down via runtime filters and conjuncts.
//!
//! The crate is organised bottom-up:
//!
//! * [`encodings`]: level and value decoders (RLE/bit-packed levels, PLAIN
//!   and dictionary values).
//! * [`file`]: the physical file layer, i.e. footer location and decoding,
//!   page reading and decompression, writer-version parsing.
//! * [`schema`]: the nested schema tree reconstructed from the flat file
//!   schema, and resolution of request paths against it under the three
//!   legal array encodings.
//! * [`column`]: per-column readers driving the decoders and reconstructing
//!   nested collection structure from definition/repetition levels.
//! * [`scan`]: row-group assembly, driving all column readers in lockstep
//!   into a scratch tuple batch and filtering into output batches.
//!
//! Within one scanner instance execution is single-threaded and cooperative;
//! parallelism is obtained by running one scanner per byte split, each with
//! its own reader tree, scratch batch and memory pools.

#[macro_use]
pub mod errors;
pub mod basic;

pub mod format;

pub mod data_type;

pub mod column;
pub mod compression;
pub mod encodings;
pub mod file;
pub mod memory;
pub mod scan;
pub mod schema;
pub mod thrift;

#[macro_use]
mod util;
