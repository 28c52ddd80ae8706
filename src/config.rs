//! Import tuning knobs.
//!
//! Every field has a default, so hosts can pass a partial object (JS through
//! `serde-wasm-bindgen`, the CLI through flags) and leave the rest alone.

use serde::{Deserialize, Serialize};

use crate::columns::PREFERRED_SHEET;
use crate::parser::ParserKind;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    /// Inputs at or above this size use the streaming parser (when the host supports it).
    pub streaming_threshold_bytes: u64,
    /// Compressed bytes requested per range read.
    pub read_chunk_bytes: usize,
    /// Decompressed bytes produced per inflate step.
    pub inflate_chunk_bytes: usize,
    /// Rows between progress reports / yields while parsing.
    pub progress_interval_rows: usize,
    /// Rows enriched per batch before yielding.
    pub enrich_batch_rows: usize,
    /// Rows sampled when checking dates and amounts.
    pub validation_sample_rows: usize,
    /// Size of the pre-`<sheetData>` buffer at which it gets truncated.
    pub seek_buffer_limit: usize,
    /// Characters kept from the end of the buffer on truncation.
    pub seek_tail_retain: usize,
    /// Row count above which a large-dataset warning is emitted.
    pub large_dataset_rows: usize,
    pub preferred_sheet: String,
    /// Bypass the size/capability dispatch.
    pub force_parser: Option<ParserKind>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            streaming_threshold_bytes: 20 * MIB,
            read_chunk_bytes: 256 * 1024,
            inflate_chunk_bytes: 64 * 1024,
            progress_interval_rows: 5_000,
            enrich_batch_rows: 20_000,
            validation_sample_rows: 1_000,
            seek_buffer_limit: 64 * 1024,
            seek_tail_retain: 1_024,
            large_dataset_rows: 1_000_000,
            preferred_sheet: PREFERRED_SHEET.to_string(),
            force_parser: None,
        }
    }
}

impl ImportConfig {
    /// Copy of this config with the parser path pinned.
    #[must_use]
    pub fn with_parser(mut self, kind: ParserKind) -> Self {
        self.force_parser = Some(kind);
        self
    }

    /// Clamp values that would stall the pipeline (zero-sized reads or batches).
    pub(crate) fn sanitized(mut self) -> Self {
        self.read_chunk_bytes = self.read_chunk_bytes.max(4 * 1024);
        self.inflate_chunk_bytes = self.inflate_chunk_bytes.max(4 * 1024);
        self.progress_interval_rows = self.progress_interval_rows.max(1);
        self.enrich_batch_rows = self.enrich_batch_rows.max(1);
        // The tail must hold a whole `<dimension .../>` tag or split `<sheetData` marker.
        self.seek_tail_retain = self.seek_tail_retain.max(256);
        self.seek_buffer_limit = self.seek_buffer_limit.max(self.seek_tail_retain * 2);
        self
    }
}
