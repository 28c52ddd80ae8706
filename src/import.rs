//! Import coordination: parse, validate, then (on confirmation) enrich and commit.
//!
//! The two steps are split so a host can show the validation result before
//! anything is replaced. A failed or cancelled import never touches the
//! committed [`Dataset`].

use log::{debug, info};
use serde::Serialize;

use crate::enrich::enrich_table;
use crate::error::{ImportError, Result};
use crate::parser::{self, now_ms, HostCapabilities, ParseStats, ParserKind};
use crate::schedule::{ImportContext, Scheduler};
use crate::source::ByteSource;
use crate::types::{ColumnarTable, ParseProgress, RowRecord, ValidationResult};
use crate::validate::validate;

/// The committed rows the rest of the application reads.
#[derive(Debug, Default)]
pub struct Dataset {
    records: Vec<RowRecord>,
    summary: Option<ImportSummary>,
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[RowRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Summary of the import that produced the current rows.
    pub fn summary(&self) -> Option<&ImportSummary> {
        self.summary.as_ref()
    }

    /// Take the rows out, leaving the dataset empty.
    pub fn take_records(&mut self) -> Vec<RowRecord> {
        std::mem::take(&mut self.records)
    }

    fn replace(&mut self, records: Vec<RowRecord>, summary: ImportSummary) {
        self.records = records;
        self.summary = Some(summary);
    }
}

/// Counts and per-phase timings of a committed import.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub parser: ParserKind,
    pub sheet_name: String,
    pub rows_parsed: usize,
    pub rows_committed: usize,
    pub grand_total_rows: usize,
    pub shared_strings: usize,
    pub zip_entries: usize,
    pub zip_ms: f64,
    pub shared_strings_ms: f64,
    pub parse_ms: f64,
    pub validate_ms: f64,
    pub enrich_ms: f64,
    pub total_ms: f64,
}

struct Parsed {
    table: ColumnarTable,
    stats: ParseStats,
    validation: ValidationResult,
    validate_ms: f64,
}

/// One file's trip through the import flow.
///
/// [`parse`](Self::parse) reads and validates; [`commit`](Self::commit)
/// enriches and replaces the dataset. Parsing again discards the previous
/// file's table.
#[derive(Default)]
pub struct ImportSession {
    capabilities: HostCapabilities,
    parsed: Option<Parsed>,
}

impl ImportSession {
    #[must_use]
    pub fn new(capabilities: HostCapabilities) -> Self {
        Self {
            capabilities,
            parsed: None,
        }
    }

    /// Validation result of the last successful parse.
    pub fn validation(&self) -> Option<&ValidationResult> {
        self.parsed.as_ref().map(|p| &p.validation)
    }

    /// Parsed table awaiting commit.
    pub fn table(&self) -> Option<&ColumnarTable> {
        self.parsed.as_ref().map(|p| &p.table)
    }

    /// Drop any parsed table without committing it.
    pub fn reset(&mut self) {
        self.parsed = None;
    }

    /// Parse `source` with the path chosen for its size, then validate.
    ///
    /// An invalid table is still kept so the host can show why; only
    /// [`commit`](Self::commit) refuses it.
    ///
    /// # Errors
    /// Structural errors from the parser, or `Cancelled`.
    pub async fn parse<S: ByteSource + ?Sized, Y: Scheduler>(
        &mut self,
        source: &S,
        ctx: &mut ImportContext<'_, Y>,
    ) -> Result<&ValidationResult> {
        self.parsed = None;
        let kind = parser::select_parser(source.len(), self.capabilities, &ctx.config);
        debug!("{} byte input, using {kind} parser", source.len());

        let output = parser::parse_with(kind, source, ctx).await?;

        ctx.report(ParseProgress::new("Validating data...", None));
        let start = now_ms();
        let validation = validate(&output.table, &ctx.config);
        let validate_ms = now_ms() - start;

        let parsed = self.parsed.insert(Parsed {
            table: output.table,
            stats: output.stats,
            validation,
            validate_ms,
        });
        Ok(&parsed.validation)
    }

    /// Enrich the parsed table and make it the current dataset.
    ///
    /// # Errors
    /// `Validation` when nothing valid was parsed; the parsed table is kept
    /// and `dataset` is untouched. `Cancelled` if cancelled while enriching,
    /// which also leaves `dataset` untouched.
    pub async fn commit<Y: Scheduler>(
        &mut self,
        ctx: &mut ImportContext<'_, Y>,
        dataset: &mut Dataset,
    ) -> Result<ImportSummary> {
        let Some(parsed) = self.parsed.take() else {
            return Err(ImportError::Validation(vec![
                "No parsed file to import".to_string()
            ]));
        };
        if !parsed.validation.valid {
            let errors = parsed.validation.errors.clone();
            self.parsed = Some(parsed);
            return Err(ImportError::Validation(errors));
        }

        ctx.report(ParseProgress::new("Processing data...", Some(0)));
        let start = now_ms();
        let rows_parsed = parsed.table.row_count;
        let sheet_name = parsed.table.sheet_name.clone();
        let enriched = enrich_table(parsed.table, ctx).await?;
        let enrich_ms = now_ms() - start;

        let stats = parsed.stats;
        let summary = ImportSummary {
            parser: stats.parser,
            sheet_name,
            rows_parsed,
            rows_committed: enriched.records.len(),
            grand_total_rows: enriched.grand_total_rows,
            shared_strings: stats.shared_strings,
            zip_entries: stats.zip_entries,
            zip_ms: stats.zip_ms,
            shared_strings_ms: stats.shared_strings_ms,
            parse_ms: stats.parse_ms,
            validate_ms: parsed.validate_ms,
            enrich_ms,
            total_ms: stats.total_ms + parsed.validate_ms + enrich_ms,
        };
        info!(
            "imported {} rows from \"{}\" ({} parser) in {:.0}ms",
            summary.rows_committed, summary.sheet_name, summary.parser, summary.total_ms
        );
        dataset.replace(enriched.records, summary.clone());
        ctx.report(ParseProgress::new("Import complete", Some(100)));
        Ok(summary)
    }
}

/// Validation and summary of a one-shot import.
#[derive(Clone, Debug, Serialize)]
pub struct ImportReport {
    pub validation: ValidationResult,
    pub summary: ImportSummary,
}

/// Parse, validate and commit in one go.
///
/// # Errors
/// Structural errors from the parser, `Validation` when the table is not
/// importable, or `Cancelled`. `dataset` is only replaced on success.
pub async fn import_workbook<S: ByteSource + ?Sized, Y: Scheduler>(
    source: &S,
    ctx: &mut ImportContext<'_, Y>,
    capabilities: HostCapabilities,
    dataset: &mut Dataset,
) -> Result<ImportReport> {
    let mut session = ImportSession::new(capabilities);
    let validation = session.parse(source, ctx).await?.clone();
    let summary = session.commit(ctx, dataset).await?;
    Ok(ImportReport {
        validation,
        summary,
    })
}
