use serde::Serialize;

/// A progress notification. `percent` is `None` when the total is unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseProgress {
    pub message: String,
    pub percent: Option<u8>,
}

impl ParseProgress {
    pub fn new(message: impl Into<String>, percent: Option<u8>) -> Self {
        Self {
            message: message.into(),
            percent,
        }
    }

    /// Progress for `done` of `total`, clamped to 0..=100.
    pub fn fraction(message: impl Into<String>, done: usize, total: usize) -> Self {
        let percent = (total > 0).then(|| {
            let pct = done.saturating_mul(100) / total;
            u8::try_from(pct.min(100)).unwrap_or(100)
        });
        Self::new(message, percent)
    }
}
