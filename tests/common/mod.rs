//! Common test utilities: run workbooks through the import pipeline.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

use xlingest::error::Result;
use xlingest::import::{self, ImportReport};
use xlingest::parser::{self, ParseOutput};
use xlingest::schedule::{ImportContext, NoopScheduler};
use xlingest::{ColumnarTable, Dataset, HostCapabilities, ImportConfig, MemorySource, ParserKind};

// Re-export fixtures for convenience
pub use super::fixtures::*;

/// Parse `data` with the given path and default settings.
pub async fn try_parse(data: &[u8], kind: ParserKind) -> Result<ParseOutput> {
    let mut ctx = ImportContext::new(ImportConfig::default(), NoopScheduler);
    parser::parse_with(kind, &MemorySource::new(data), &mut ctx).await
}

/// Parse `data` with the given path, panicking on failure.
pub async fn parse_table(data: &[u8], kind: ParserKind) -> ColumnarTable {
    try_parse(data, kind)
        .await
        .unwrap_or_else(|e| panic!("{kind} parse failed: {e}"))
        .table
}

/// Parse with both paths, assert they agree, and return the table.
pub async fn parse_both(data: &[u8]) -> ColumnarTable {
    let streaming = parse_table(data, ParserKind::Streaming).await;
    let in_memory = parse_table(data, ParserKind::InMemory).await;
    assert_eq!(streaming, in_memory, "parse paths disagree");
    assert!(streaming.is_aligned());
    streaming
}

/// Full import into `dataset` through the chosen path.
pub async fn import_into(
    data: &[u8],
    kind: ParserKind,
    dataset: &mut Dataset,
) -> Result<ImportReport> {
    let config = ImportConfig::default().with_parser(kind);
    let mut ctx = ImportContext::new(config, NoopScheduler);
    import::import_workbook(
        &MemorySource::new(data),
        &mut ctx,
        HostCapabilities::default(),
        dataset,
    )
    .await
}
