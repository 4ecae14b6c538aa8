//! Line ending detection and normalization.
//!
//! The engine stores text with LF (`'\n'`) terminators internally. Documents
//! opened with CRLF content are normalized on load; the detected flavour is kept
//! so callers can restore it when saving.

/// The preferred newline sequence of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// Unix-style LF (`'\n'`).
    #[default]
    Lf,
    /// Windows-style CRLF (`"\r\n"`).
    Crlf,
}

impl LineEnding {
    /// Detect the dominant line ending of `text`.
    ///
    /// Any CRLF occurrence selects [`LineEnding::Crlf`]; otherwise LF.
    pub fn detect(text: &str) -> Self {
        if text.contains("\r\n") {
            Self::Crlf
        } else {
            Self::Lf
        }
    }

    /// Normalize `text` to the internal LF representation.
    pub fn normalize(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::Crlf => text.replace("\r\n", "\n"),
        }
    }

    /// Convert LF-normalized text back to this line ending for saving.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Lf => text.to_string(),
            Self::Crlf => text.replace('\n', "\r\n"),
        }
    }

    /// The terminator string itself.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Crlf => "\r\n",
        }
    }
}
