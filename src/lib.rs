//! xlingest - streaming XLSX import for cost-accounting dashboards
//!
//! Reads a "Cost Code Detail Report" workbook into dashboard row records:
//! - Range reads of the ZIP central directory, never the whole file
//! - Incremental inflate and row scanning for workbooks of hundreds of MB
//! - An in-memory path for small files that yields the same table
//! - Sampled validation before anything is committed
//! - Cooperative yielding so a browser tab stays responsive
//!
//! # Usage (JavaScript)
//!
//! ```javascript
//! import init, { import_workbook, Importer } from 'xlingest';
//! await init();
//! const { rows, validation, summary } =
//!     await import_workbook(file, (msg, pct) => console.log(msg, pct), {});
//!
//! const importer = new Importer({}, onProgress);
//! const validation = await importer.parse(file);
//! if (validation.valid) rows = await importer.commit();
//! ```
//!
//! # Usage (Rust)
//!
//! ```no_run
//! # async fn run(bytes: &[u8]) -> xlingest::error::Result<()> {
//! use xlingest::{Dataset, HostCapabilities, ImportConfig, MemorySource};
//! use xlingest::schedule::{ImportContext, NoopScheduler};
//!
//! let mut ctx = ImportContext::new(ImportConfig::default(), NoopScheduler);
//! let mut dataset = Dataset::new();
//! let report = xlingest::import::import_workbook(
//!     &MemorySource::new(bytes),
//!     &mut ctx,
//!     HostCapabilities::default(),
//!     &mut dataset,
//! )
//! .await?;
//! println!("{} rows from {}", report.summary.rows_committed, report.summary.sheet_name);
//! # Ok(())
//! # }
//! ```

// Container and text plumbing
pub mod cell_ref;
pub mod decompress;
pub mod error;
pub mod scan;
pub mod shared_strings;
pub mod source;
pub mod xml_helpers;
pub mod zip_directory;

// Worksheet parsing
pub mod columns;
pub mod config;
pub mod dates;
pub mod parser;
pub mod schedule;
pub mod types;

// Import flow
pub mod categories;
pub mod enrich;
pub mod import;
pub mod logging;
pub mod validate;

use wasm_bindgen::prelude::*;

pub use config::ImportConfig;
pub use error::{ErrorKind, ImportError};
pub use import::{Dataset, ImportReport, ImportSession, ImportSummary};
pub use parser::{select_parser, HostCapabilities, ParserKind};
pub use source::{ByteSource, MemorySource};

pub use types::*;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde::Serialize;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::future_to_promise;

    use crate::import::{self, Dataset, ImportSession, ImportSummary};
    use crate::parser::HostCapabilities;
    use crate::schedule::{CancellationToken, EventLoopScheduler, ImportContext};
    use crate::source::BlobSource;
    use crate::types::{ParseProgress, RowRecord, ValidationResult};
    use crate::{logging, ImportConfig};

    fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(value)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {e}")))
    }

    fn config_from_js(options: JsValue) -> Result<ImportConfig, JsValue> {
        if options.is_undefined() || options.is_null() {
            return Ok(ImportConfig::default());
        }
        serde_wasm_bindgen::from_value(options)
            .map_err(|e| JsValue::from_str(&format!("Invalid options: {e}")))
    }

    /// Adapts a JS `(message, percent)` callback to a progress sink.
    fn progress_callback(callback: Option<js_sys::Function>) -> impl FnMut(&ParseProgress) {
        move |p: &ParseProgress| {
            if let Some(f) = &callback {
                let percent = p.percent.map_or(JsValue::NULL, JsValue::from);
                let _ = f.call2(&JsValue::NULL, &JsValue::from_str(&p.message), &percent);
            }
        }
    }

    #[derive(Serialize)]
    struct ImportResult<'a> {
        rows: &'a [RowRecord],
        validation: &'a ValidationResult,
        summary: &'a ImportSummary,
    }

    /// Import a workbook `Blob`/`File` in one step.
    ///
    /// Resolves to `{ rows, validation, summary }`; rejects with a message on
    /// format, decompression or validation errors.
    #[wasm_bindgen]
    pub async fn import_workbook(
        blob: web_sys::Blob,
        on_progress: Option<js_sys::Function>,
        options: JsValue,
    ) -> Result<JsValue, JsValue> {
        logging::init();
        let config = config_from_js(options)?;
        let source = BlobSource::new(blob);
        let mut sink = progress_callback(on_progress);
        let mut ctx = ImportContext::new(config, EventLoopScheduler).with_progress(&mut sink);
        let mut dataset = Dataset::new();
        let report = import::import_workbook(
            &source,
            &mut ctx,
            HostCapabilities::default(),
            &mut dataset,
        )
        .await?;
        to_js(&ImportResult {
            rows: dataset.records(),
            validation: &report.validation,
            summary: &report.summary,
        })
    }

    #[derive(Default)]
    struct ImporterState {
        session: ImportSession,
        dataset: Dataset,
        config: ImportConfig,
        on_progress: Option<js_sys::Function>,
        cancel: CancellationToken,
    }

    impl ImporterState {
        /// Config, callback and a fresh cancellation token for the next operation.
        fn begin(&mut self) -> (ImportConfig, Option<js_sys::Function>, CancellationToken) {
            self.cancel = CancellationToken::new();
            (
                self.config.clone(),
                self.on_progress.clone(),
                self.cancel.clone(),
            )
        }
    }

    /// Two-step import: `parse` shows what would be imported, `commit` does it.
    #[wasm_bindgen]
    pub struct Importer {
        state: Rc<RefCell<ImporterState>>,
    }

    #[wasm_bindgen]
    impl Importer {
        #[wasm_bindgen(constructor)]
        pub fn new(options: JsValue, on_progress: Option<js_sys::Function>) -> Result<Importer, JsValue> {
            logging::init();
            let state = ImporterState {
                config: config_from_js(options)?,
                on_progress,
                ..ImporterState::default()
            };
            Ok(Importer {
                state: Rc::new(RefCell::new(state)),
            })
        }

        /// Parse and validate; resolves to the validation result.
        pub fn parse(&self, blob: web_sys::Blob) -> js_sys::Promise {
            let state = Rc::clone(&self.state);
            future_to_promise(async move {
                let (config, on_progress, cancel) = state.borrow_mut().begin();
                let mut session = std::mem::take(&mut state.borrow_mut().session);

                let source = BlobSource::new(blob);
                let mut sink = progress_callback(on_progress);
                let mut ctx = ImportContext::new(config, EventLoopScheduler)
                    .with_progress(&mut sink)
                    .with_cancellation(cancel);
                let result = match session.parse(&source, &mut ctx).await {
                    Ok(validation) => to_js(validation),
                    Err(e) => Err(e.into()),
                };

                state.borrow_mut().session = session;
                result
            })
        }

        /// Enrich and commit the parsed rows; resolves to the row records.
        pub fn commit(&self) -> js_sys::Promise {
            let state = Rc::clone(&self.state);
            future_to_promise(async move {
                let (config, on_progress, cancel) = state.borrow_mut().begin();
                let (mut session, mut dataset) = {
                    let mut s = state.borrow_mut();
                    (std::mem::take(&mut s.session), std::mem::take(&mut s.dataset))
                };

                let mut sink = progress_callback(on_progress);
                let mut ctx = ImportContext::new(config, EventLoopScheduler)
                    .with_progress(&mut sink)
                    .with_cancellation(cancel);
                let result = match session.commit(&mut ctx, &mut dataset).await {
                    Ok(_) => to_js(dataset.records()),
                    Err(e) => Err(e.into()),
                };

                let mut s = state.borrow_mut();
                s.session = session;
                s.dataset = dataset;
                result
            })
        }

        /// Summary of the last commit, or `null`.
        pub fn summary(&self) -> Result<JsValue, JsValue> {
            match self.state.borrow().dataset.summary() {
                Some(summary) => to_js(summary),
                None => Ok(JsValue::NULL),
            }
        }

        /// Abandon the running parse or commit at its next yield point.
        pub fn cancel(&self) {
            self.state.borrow().cancel.cancel();
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{import_workbook, Importer};

/// Get the library version
#[must_use]
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
