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

//! Per-scanner shared state. Readers borrow a [`ScannerCtx`] for the
//! duration of each call instead of holding a back-pointer to the scanner,
//! which keeps the reader tree acyclic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::errors::{Result, ScanError};
use crate::file::version::FileVersion;
use crate::memory::{MemPool, MemTracker};
use crate::schema::resolver::SchemaResolution;

/// Process-wide options influencing scan behavior, injected rather than read
/// from globals in decoding code.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Rows per scratch batch; also the level cache size.
    pub batch_size: usize,
    /// When false, decode and metadata errors are logged and the affected
    /// scope is skipped instead of failing the scan.
    pub abort_on_error: bool,
    /// When true, TIMESTAMPs read from files written by parquet-mr (used by
    /// Hive) are converted from UTC to local time.
    pub convert_legacy_hive_parquet_utc_timestamps: bool,
    /// If the rejection rate of a runtime filter drops below this value the
    /// filter is disabled.
    pub parquet_min_filter_reject_ratio: f64,
    /// Upper bound on the deserialized page header size.
    pub max_page_header_size: usize,
    pub parquet_fallback_schema_resolution: SchemaResolution,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            abort_on_error: true,
            convert_legacy_hive_parquet_utc_timestamps: false,
            parquet_min_filter_reject_ratio: 0.1,
            max_page_header_size: 8 * 1024 * 1024,
            parquet_fallback_schema_resolution: SchemaResolution::Name,
        }
    }
}

/// State shared by all column readers of one scanner instance.
pub struct ScannerCtx {
    pub options: ScanOptions,
    pub filename: String,
    pub file_version: FileVersion,

    /// Decoder-level errors are captured here without unwinding the tight
    /// inner loops; the assembler checks it at loop exits. Reset between
    /// row groups so one bad group need not poison a lenient scan.
    pub parse_status: Result<()>,

    pub mem_tracker: Arc<MemTracker>,
    /// Scanner-wide pool holding dictionary buffers until close.
    pub dictionary_pool: MemPool,
    /// Tracker charged for the per-reader level caches, allocated once on
    /// first use and reused across row groups.
    pub level_cache_tracker: Arc<MemTracker>,

    cancelled: Arc<AtomicBool>,
    /// Scan-node row limit, if any.
    pub limit: Option<i64>,
    pub rows_returned: i64,
}

impl ScannerCtx {
    pub fn new(
        options: ScanOptions,
        filename: impl Into<String>,
        mem_tracker: Arc<MemTracker>,
    ) -> Self {
        let dictionary_pool = MemPool::new(Arc::clone(&mem_tracker));
        let level_cache_tracker = Arc::new(MemTracker::new_child(
            "level-caches",
            -1,
            &mem_tracker,
        ));
        Self {
            options,
            filename: filename.into(),
            file_version: FileVersion::default(),
            parse_status: Ok(()),
            mem_tracker,
            dictionary_pool,
            level_cache_tracker,
            cancelled: Arc::new(AtomicBool::new(false)),
            limit: None,
            rows_returned: 0,
        }
    }

    /// Handle shared with the driver; setting it abandons the current row
    /// group at the next assemble-loop iteration.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn reached_limit(&self) -> bool {
        self.limit.is_some_and(|l| self.rows_returned >= l)
    }

    pub fn parse_status_ok(&self) -> bool {
        self.parse_status.is_ok()
    }

    /// Records `e` in `parse_status`, keeping the first error.
    pub fn merge_status(&mut self, e: ScanError) {
        if self.parse_status.is_ok() {
            self.parse_status = Err(e);
        }
    }

    /// With `abort_on_error`, propagates `e`; otherwise logs it as a
    /// warning and continues. Resource failures are fatal either way.
    pub fn log_or_return(&self, e: ScanError) -> Result<()> {
        if self.options.abort_on_error || matches!(e, ScanError::MemLimitExceeded(_)) {
            return Err(e);
        }
        warn!(file = %self.filename, error = %e, "continuing scan after error");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ScannerCtx {
        ScannerCtx::new(
            ScanOptions::default(),
            "test.parquet",
            Arc::new(MemTracker::new_root("test")),
        )
    }

    #[test]
    fn test_merge_keeps_first_error() {
        let mut c = ctx();
        c.merge_status(general_err!("first"));
        c.merge_status(general_err!("second"));
        assert!(format!("{}", c.parse_status.unwrap_err()).contains("first"));
    }

    #[test]
    fn test_log_or_return() {
        let mut c = ctx();
        assert!(c.log_or_return(general_err!("boom")).is_err());
        c.options.abort_on_error = false;
        assert!(c.log_or_return(general_err!("boom")).is_ok());
        // Resource failures never downgrade to warnings.
        assert!(c
            .log_or_return(ScanError::MemLimitExceeded("out of memory".to_owned()))
            .is_err());
    }

    #[test]
    fn test_limit() {
        let mut c = ctx();
        assert!(!c.reached_limit());
        c.limit = Some(10);
        c.rows_returned = 10;
        assert!(c.reached_limit());
    }
}
