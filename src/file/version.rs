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

//! Parsing of the footer's `created_by` string into an application name and
//! version, used to enable bug-compatibility quirks for known writers.

/// Parsed writer identity of a file. The expected token shape is
/// `<application> version <major>.<minor>.<patch>[-suffix]`; anything else
/// degrades to version 0.0.0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileVersion {
    pub application: String,
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
    /// True for impala builds whose version string carries "-internal".
    pub is_impala_internal: bool,
}

impl FileVersion {
    pub fn parse(created_by: &str) -> FileVersion {
        let lower = created_by.to_lowercase();
        let mut tokens = lower.split_whitespace();
        let application = tokens.next().unwrap_or("").to_owned();

        let mut version = FileVersion {
            application,
            ..Default::default()
        };
        if tokens.next() != Some("version") {
            return version;
        }
        let Some(version_string) = tokens.next() else {
            return version;
        };
        // Ignore any trailing non-numeric characters.
        let end = version_string
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(version_string.len());
        let mut parts = version_string[..end].split('.');
        version.major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        version.minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        version.patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        if version.application == "impala" && version_string.contains("-internal") {
            version.is_impala_internal = true;
        }
        version
    }

    pub fn version_lt(&self, major: i32, minor: i32, patch: i32) -> bool {
        (self.major, self.minor, self.patch) < (major, minor, patch)
    }

    pub fn version_eq(&self, major: i32, minor: i32, patch: i32) -> bool {
        (self.major, self.minor, self.patch) == (major, minor, patch)
    }
}

/// In impala 1.1 the dictionary page metadata was not always set. True when
/// the writer matches those versions and the compatibility workaround must
/// be used.
pub fn requires_skipped_dictionary_header_check(v: &FileVersion) -> bool {
    if v.application != "impala" {
        return false;
    }
    v.version_eq(1, 1, 0) || (v.version_eq(1, 2, 0) && v.is_impala_internal)
}
