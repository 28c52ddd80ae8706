//! Structured error types for xlingest.
//!
//! Structural problems (not a ZIP, corrupt deflate data, missing columns) are
//! errors. Per-cell data-quality problems never are: they are coerced and
//! reported as validation warnings instead.

/// All errors that can abort an import.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The input is not a readable ZIP/XLSX container, or a required part is absent.
    #[error("Invalid file format: {0}")]
    Format(String),

    /// An entry's compressed data is corrupt or truncated.
    #[error("Corrupt compressed data: {0}")]
    Decompression(String),

    /// The sheet was read but cannot be imported (missing columns, no rows).
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// XML parsing error from quick-xml (in-memory path).
    #[error("XML parsing: {0}")]
    Xml(#[from] quick_xml::Error),

    /// ZIP archive error from the zip crate (in-memory path).
    #[error("ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// I/O error from a native byte source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A host byte source (e.g. a browser `Blob`) failed to deliver a range.
    #[error("Read failed: {0}")]
    Source(String),

    /// The import was abandoned through its cancellation token.
    #[error("Import cancelled")]
    Cancelled,
}

/// Coarse classification used for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file itself is damaged or not a workbook.
    CorruptFile,
    /// The file is fine but is the wrong file or sheet.
    WrongFile,
    /// The user or host abandoned the import.
    Cancelled,
    /// The file could not be read.
    Io,
}

impl ImportError {
    /// Classify this error for messaging ("corrupt file" vs "wrong file/sheet").
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) | Self::Decompression(_) | Self::Xml(_) | Self::Zip(_) => {
                ErrorKind::CorruptFile
            }
            Self::Validation(_) => ErrorKind::WrongFile,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Source(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(target_arch = "wasm32")]
impl From<ImportError> for wasm_bindgen::JsValue {
    fn from(e: ImportError) -> Self {
        wasm_bindgen::JsValue::from_str(&e.to_string())
    }
}
