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

//! Column readers: per-scalar-type decoding of level and value streams, and
//! reconstruction of nested collections from child readers.

pub mod collection;
pub mod reader;

/// Repetition level reported once a reader has exhausted its row group.
pub const ROW_GROUP_END: i16 = i16::MIN;

/// Level value before the first advance or after a decode error.
pub const INVALID_LEVEL: i16 = -1;

/// Position counter value while no collection is being read.
pub const INVALID_POS: i64 = -1;
