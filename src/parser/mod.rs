//! Worksheet parsers.
//!
//! Two interchangeable strategies produce the same [`ColumnarTable`]:
//! [`StreamingParser`] for large inputs and [`InMemoryParser`] for small ones.
//! Which one runs is a pure function of input size and host capability.

pub mod in_memory;
pub mod streaming;
pub mod workbook;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ImportConfig;
use crate::error::Result;
use crate::schedule::{ImportContext, Scheduler};
use crate::source::ByteSource;
use crate::types::ColumnarTable;

pub use in_memory::InMemoryParser;
pub use streaming::{StreamingParser, StreamingRowParser};

#[cfg(target_arch = "wasm32")]
pub(crate) fn now_ms() -> f64 {
    if let Some(window) = web_sys::window() {
        if let Some(perf) = window.performance() {
            return perf.now();
        }
    }
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn now_ms() -> f64 {
    use std::time::Instant;
    thread_local! {
        static START: Instant = Instant::now();
    }
    START.with(|s| s.elapsed().as_secs_f64() * 1000.0)
}

/// Which parse path produced (or should produce) a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Streaming,
    InMemory,
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Streaming => "streaming",
            Self::InMemory => "in-memory",
        })
    }
}

/// What the host can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Whether entries can be inflated incrementally rather than all at once.
    pub incremental_decompression: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            incremental_decompression: true,
        }
    }
}

/// Pick the parse path for an input of `file_size` bytes.
///
/// Streaming is used at or above the threshold when the host can inflate
/// incrementally; `config.force_parser` overrides both.
#[must_use]
pub fn select_parser(
    file_size: u64,
    capabilities: HostCapabilities,
    config: &ImportConfig,
) -> ParserKind {
    if let Some(kind) = config.force_parser {
        return kind;
    }
    if file_size >= config.streaming_threshold_bytes && capabilities.incremental_decompression {
        ParserKind::Streaming
    } else {
        ParserKind::InMemory
    }
}

/// Phase timings and counts for one parse.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseStats {
    pub parser: ParserKind,
    pub zip_entries: usize,
    pub shared_strings: usize,
    pub zip_ms: f64,
    pub shared_strings_ms: f64,
    pub parse_ms: f64,
    pub total_ms: f64,
}

impl ParseStats {
    pub(crate) fn new(parser: ParserKind) -> Self {
        Self {
            parser,
            zip_entries: 0,
            shared_strings: 0,
            zip_ms: 0.0,
            shared_strings_ms: 0.0,
            parse_ms: 0.0,
            total_ms: 0.0,
        }
    }
}

/// A parsed worksheet plus how it was obtained.
#[derive(Clone, Debug)]
pub struct ParseOutput {
    pub table: ColumnarTable,
    pub stats: ParseStats,
}

/// A strategy for turning a workbook into a [`ColumnarTable`].
#[allow(async_fn_in_trait)]
pub trait SheetParser {
    fn kind(&self) -> ParserKind;

    /// Parse the worksheet selected by `ctx.config.preferred_sheet`.
    ///
    /// # Errors
    /// `FormatError` or `DecompressionError` for structural problems,
    /// `Cancelled` if the context's token fires at a yield point.
    async fn parse<S: ByteSource + ?Sized, Y: Scheduler>(
        &self,
        source: &S,
        ctx: &mut ImportContext<'_, Y>,
    ) -> Result<ParseOutput>;
}

/// Run the parser of the given kind.
///
/// # Errors
/// See [`SheetParser::parse`].
pub async fn parse_with<S: ByteSource + ?Sized, Y: Scheduler>(
    kind: ParserKind,
    source: &S,
    ctx: &mut ImportContext<'_, Y>,
) -> Result<ParseOutput> {
    match kind {
        ParserKind::Streaming => StreamingParser.parse(source, ctx).await,
        ParserKind::InMemory => InMemoryParser.parse(source, ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_select_parser_by_size_and_capability() {
        let config = ImportConfig::default();
        let capable = HostCapabilities::default();
        let incapable = HostCapabilities {
            incremental_decompression: false,
        };
        assert_eq!(select_parser(MIB, capable, &config), ParserKind::InMemory);
        assert_eq!(select_parser(20 * MIB, capable, &config), ParserKind::Streaming);
        assert_eq!(select_parser(300 * MIB, capable, &config), ParserKind::Streaming);
        assert_eq!(select_parser(300 * MIB, incapable, &config), ParserKind::InMemory);
    }

    #[test]
    fn test_forced_parser_wins() {
        let config = ImportConfig::default().with_parser(ParserKind::Streaming);
        let incapable = HostCapabilities {
            incremental_decompression: false,
        };
        assert_eq!(select_parser(10, incapable, &config), ParserKind::Streaming);
        let config = ImportConfig::default().with_parser(ParserKind::InMemory);
        assert_eq!(
            select_parser(500 * MIB, HostCapabilities::default(), &config),
            ParserKind::InMemory
        );
    }

    #[test]
    fn test_parser_kind_names() {
        assert_eq!(ParserKind::InMemory.to_string(), "in-memory");
        assert_eq!(
            serde_json::to_string(&ParserKind::InMemory).ok().as_deref(),
            Some("\"in_memory\"")
        );
    }
}
