//! Streaming and in-memory parse paths must produce identical tables.
//!
//! Covers:
//! - Stored and deflated entries, shared and inline strings
//! - Column alignment when cells are missing
//! - Row-number gaps, rows and cells without references
//! - Row numbers past the sheet limit
//! - Namespace-prefixed worksheet elements
//! - Missing or wrong `<dimension>` tags
//! - Long worksheet prefixes before `<sheetData>`
//! - Worksheet resolution through workbook.xml

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic,
    clippy::cast_possible_truncation
)]

mod fixtures;
mod common;

use chrono::NaiveDate;
use common::{parse_both, parse_table};
use fixtures::{
    generated_rows, report_sheet, Cell, SheetBuilder, StringMode, XlsxBuilder, REPORT_HEADERS,
};
use xlingest::parser::{self, InMemoryParser, SheetParser, StreamingParser};
use xlingest::schedule::{ImportContext, NoopScheduler};
use xlingest::{CellValue, ImportConfig, MemorySource, ParserKind};

// ============================================================================
// Containers and string modes
// ============================================================================

#[tokio::test]
async fn test_paths_agree_for_every_container() {
    let rows = generated_rows(50);
    let mut tables = Vec::new();
    for stored in [false, true] {
        for mode in [StringMode::Shared, StringMode::Inline] {
            let mut builder = XlsxBuilder::new().sheet(report_sheet(&rows)).strings(mode);
            if stored {
                builder = builder.stored();
            }
            tables.push(parse_both(&builder.build()).await);
        }
    }

    let first = &tables[0];
    assert_eq!(first.row_count, 50);
    assert_eq!(first.sheet_name, "Cost Code Detail Report");
    assert_eq!(first.all_columns, REPORT_HEADERS);
    for table in &tables[1..] {
        assert_eq!(table, first);
    }
}

#[tokio::test]
async fn test_cell_values_are_typed() {
    let xlsx = XlsxBuilder::new()
        .sheet(report_sheet(&generated_rows(3)))
        .build();
    let table = parse_both(&xlsx).await;

    assert_eq!(
        table.value("G/L Date", 0),
        &CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    );
    assert_eq!(table.value("Job", 0), &CellValue::Number(110_520.0));
    assert_eq!(table.value("Division Name", 1), &CellValue::Text("Aviation".into()));
    assert_eq!(table.value("Actual Amount", 2), &CellValue::Number(-97.5));
    assert_eq!(
        table.value("Cost Type", 2),
        &CellValue::Text("640 - Materials".into())
    );
}

#[tokio::test]
async fn test_other_cell_types_become_text() {
    let xlsx = XlsxBuilder::new()
        .sheet(
            SheetBuilder::new("Cost Code Detail Report")
                .row(REPORT_HEADERS)
                .row(vec![
                    Cell::Number(45_306.0),
                    Cell::FormulaText("Ops & Field".into()),
                    Cell::Boolean(true),
                    Cell::Blank,
                    Cell::Text(String::new()),
                    Cell::FormulaText("12.5".into()),
                    Cell::Text("JE".into()),
                ]),
        )
        .build();
    let table = parse_both(&xlsx).await;

    assert_eq!(table.row_count, 1);
    assert_eq!(table.value("Division Name", 0), &CellValue::Text("Ops & Field".into()));
    assert_eq!(table.value("Job", 0), &CellValue::Text("1".into()));
    assert_eq!(table.value("Job Type", 0), &CellValue::Empty);
    assert_eq!(table.value("Cost Type", 0), &CellValue::Empty);
    assert_eq!(table.value("Actual Amount", 0), &CellValue::Text("12.5".into()));
}

// ============================================================================
// Alignment
// ============================================================================

#[tokio::test]
async fn test_missing_cells_keep_columns_aligned() {
    let headers: Vec<&str> = REPORT_HEADERS
        .iter()
        .copied()
        .chain(["Batch Number", "Description"])
        .collect();
    let mut sheet = SheetBuilder::new("Cost Code Detail Report").row(headers.clone());
    for i in 0..40u32 {
        let row_number = i + 2;
        let cells = (0..headers.len())
            .filter(|col| (i as usize + col) % 4 != 0)
            .map(|col| (col, Cell::Text(format!("r{i}-c{col}"))))
            .collect();
        sheet = sheet.sparse_row(row_number, cells);
    }

    let table = parse_both(&XlsxBuilder::new().sheet(sheet).build()).await;
    assert_eq!(table.row_count, 40);
    assert!(!table.has_column("Batch Number"));
    assert_eq!(table.all_columns.len(), 9);

    for (col, name) in headers.iter().enumerate() {
        if *name == "Batch Number" {
            continue;
        }
        for i in 0..40usize {
            let value = table.value(name, i);
            if (i + col) % 4 == 0 {
                assert_eq!(value, &CellValue::Empty, "{name} row {i}");
            } else {
                assert_eq!(value, &CellValue::Text(format!("r{i}-c{col}")), "{name} row {i}");
            }
        }
    }
}

#[tokio::test]
async fn test_row_gaps_become_empty_rows() {
    let sheet = SheetBuilder::new("Cost Code Detail Report")
        .row(REPORT_HEADERS)
        .sparse_row(2, vec![(1, "Ops".into()), (6, "JE".into())])
        .sparse_row(5, vec![(1, "Aviation".into()), (6, "AP".into())]);
    let table = parse_both(&XlsxBuilder::new().sheet(sheet).build()).await;

    assert_eq!(table.row_count, 4);
    assert_eq!(table.value("Division Name", 0), &CellValue::Text("Ops".into()));
    assert_eq!(table.value("Division Name", 1), &CellValue::Empty);
    assert_eq!(table.value("Division Name", 2), &CellValue::Empty);
    assert_eq!(table.value("Division Name", 3), &CellValue::Text("Aviation".into()));
}

#[tokio::test]
async fn test_rows_and_cells_without_references() {
    let rows = generated_rows(12);
    let with_refs = parse_both(&XlsxBuilder::new().sheet(report_sheet(&rows)).build()).await;
    let without = parse_both(
        &XlsxBuilder::new()
            .sheet(report_sheet(&rows).without_cell_refs().without_row_numbers())
            .build(),
    )
    .await;
    assert_eq!(with_refs, without);
}

#[tokio::test]
async fn test_row_numbers_past_sheet_limit() {
    let sheet = SheetBuilder::new("Cost Code Detail Report")
        .row(REPORT_HEADERS)
        .sparse_row(1_000_000_000, vec![(1, "Ops".into()), (2, Cell::Number(110_520.0))])
        .sparse_row(u32::MAX, vec![(1, "Aviation".into())])
        .sparse_row(5, vec![(1, "Fleet".into())]);
    let table = parse_both(&XlsxBuilder::new().sheet(sheet).build()).await;

    // the out-of-range numbers are read as rows 2 and 3, then a gap before 5
    assert_eq!(table.row_count, 4);
    assert_eq!(table.value("Division Name", 0), &CellValue::Text("Ops".into()));
    assert_eq!(table.value("Job", 0), &CellValue::Number(110_520.0));
    assert_eq!(table.value("Division Name", 1), &CellValue::Text("Aviation".into()));
    assert_eq!(table.value("Division Name", 2), &CellValue::Empty);
    assert_eq!(table.value("Division Name", 3), &CellValue::Text("Fleet".into()));
}

#[tokio::test]
async fn test_namespace_prefixed_worksheet() {
    let rows = generated_rows(25);
    let expected = parse_both(&XlsxBuilder::new().sheet(report_sheet(&rows)).build()).await;
    for mode in [StringMode::Shared, StringMode::Inline] {
        let xlsx = XlsxBuilder::new()
            .sheet(report_sheet(&rows).namespace_prefix("x"))
            .strings(mode)
            .build();
        let table = parse_both(&xlsx).await;
        assert_eq!(table.row_count, 25, "{mode:?}");
        assert_eq!(table, expected, "{mode:?}");
    }
}

#[tokio::test]
async fn test_repeated_header_reads_last_column() {
    let sheet = SheetBuilder::new("Cost Code Detail Report")
        .row(["Job", "Division Name", "Job"])
        .row(vec![Cell::Number(1.0), "Ops".into(), Cell::Number(110_520.0)]);
    let table = parse_both(&XlsxBuilder::new().sheet(sheet).build()).await;
    assert_eq!(table.all_columns, vec!["Job", "Division Name", "Job"]);
    assert_eq!(table.value("Job", 0), &CellValue::Number(110_520.0));
    assert_eq!(table.value("Division Name", 0), &CellValue::Text("Ops".into()));
}

// ============================================================================
// Worksheet shape
// ============================================================================

#[tokio::test]
async fn test_dimension_missing_or_wrong() {
    let rows = generated_rows(10);
    let expected = parse_both(&XlsxBuilder::new().sheet(report_sheet(&rows)).build()).await;

    for dimension in [None, Some("A1:G2"), Some("A1"), Some("garbage")] {
        let xlsx = XlsxBuilder::new()
            .sheet(report_sheet(&rows).dimension(dimension))
            .build();
        let table = parse_both(&xlsx).await;
        assert_eq!(table, expected, "dimension {dimension:?}");
    }
}

#[tokio::test]
async fn test_long_prefix_before_sheet_data() {
    // ~200 KB of <col> definitions, well past the seek buffer limit
    let rows = generated_rows(20);
    let xlsx = XlsxBuilder::new()
        .sheet(report_sheet(&rows).padding_cols(3_000))
        .build();
    let table = parse_both(&xlsx).await;
    assert_eq!(table.row_count, 20);
}

#[tokio::test]
async fn test_header_only_and_empty_sheets() {
    let header_only = SheetBuilder::new("Cost Code Detail Report").row(REPORT_HEADERS);
    let table = parse_both(&XlsxBuilder::new().sheet(header_only).build()).await;
    assert_eq!(table.row_count, 0);
    assert_eq!(table.all_columns, REPORT_HEADERS);

    let empty = SheetBuilder::new("Cost Code Detail Report");
    let table = parse_both(&XlsxBuilder::new().sheet(empty).build()).await;
    assert_eq!(table.row_count, 0);
    assert!(table.all_columns.is_empty());
}

#[tokio::test]
async fn test_many_small_reads() {
    let xlsx = XlsxBuilder::new()
        .sheet(report_sheet(&generated_rows(3_000)))
        .build();
    let config = ImportConfig {
        read_chunk_bytes: 4 * 1024,
        inflate_chunk_bytes: 4 * 1024,
        progress_interval_rows: 100,
        ..ImportConfig::default()
    };
    let source = MemorySource::new(&xlsx);

    let mut progress = Vec::new();
    let mut sink = |p: &xlingest::ParseProgress| progress.push(p.clone());
    let mut ctx = ImportContext::new(config.clone(), NoopScheduler).with_progress(&mut sink);
    let streaming = StreamingParser.parse(&source, &mut ctx).await.unwrap();
    drop(ctx);

    let mut ctx = ImportContext::new(config, NoopScheduler);
    let in_memory = InMemoryParser.parse(&source, &mut ctx).await.unwrap();

    assert_eq!(streaming.table, in_memory.table);
    assert_eq!(streaming.table.row_count, 3_000);
    assert_eq!(streaming.stats.parser, ParserKind::Streaming);
    assert_eq!(in_memory.stats.parser, ParserKind::InMemory);
    assert!(progress.len() > 10, "expected periodic progress, got {}", progress.len());
    assert!(progress.iter().any(|p| p.message.starts_with("Parsing rows: ")));
}

// ============================================================================
// Worksheet resolution
// ============================================================================

#[tokio::test]
async fn test_preferred_sheet_is_chosen() {
    let summary = SheetBuilder::new("Summary").row(["Total"]).row([1]);
    let xlsx = XlsxBuilder::new()
        .sheet(summary)
        .sheet(report_sheet(&generated_rows(4)))
        .build();
    let table = parse_both(&xlsx).await;
    assert_eq!(table.sheet_name, "Cost Code Detail Report");
    assert_eq!(table.row_count, 4);
}

#[tokio::test]
async fn test_missing_workbook_falls_back_to_first_worksheet() {
    let xlsx = XlsxBuilder::new()
        .sheet(report_sheet(&generated_rows(4)))
        .without_workbook()
        .build();
    let table = parse_both(&xlsx).await;
    assert_eq!(table.sheet_name, "Sheet1");
    assert_eq!(table.row_count, 4);
}

#[tokio::test]
async fn test_select_parser_dispatch_is_consistent() {
    let xlsx = XlsxBuilder::new()
        .sheet(report_sheet(&generated_rows(5)))
        .build();
    let config = ImportConfig {
        streaming_threshold_bytes: 1,
        ..ImportConfig::default()
    };
    let kind = parser::select_parser(xlsx.len() as u64, Default::default(), &config);
    assert_eq!(kind, ParserKind::Streaming);
    let table = parse_table(&xlsx, kind).await;
    assert_eq!(table, parse_table(&xlsx, ParserKind::InMemory).await);
}
