use std::fmt;

use anyhow::Error;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    /// Structurally invalid configuration supplied by the caller.
    Configuration,
    /// A host resource (font, source, output directory) could not be found.
    Resource,
    /// Frames in one sequence disagree on size or pixel type.
    Shape,
}

pub const SOURCE_EMPTY: &str = "SOURCE_EMPTY";
pub const SOURCE_NOT_FOUND: &str = "SOURCE_NOT_FOUND";
pub const FONT_NOT_FOUND: &str = "FONT_NOT_FOUND";
pub const OUTPUT_DIR_MISSING: &str = "OUTPUT_DIR_MISSING";
pub const FRAME_SHAPE_MISMATCH: &str = "FRAME_SHAPE_MISMATCH";
pub const FRAME_DTYPE_UNSUPPORTED: &str = "FRAME_DTYPE_UNSUPPORTED";
pub const OVERLAY_PADDING_TOO_LARGE: &str = "OVERLAY_PADDING_TOO_LARGE";

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub kind: CodedErrorKind,
}

impl CodedError {
    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Configuration,
        }
    }

    pub fn resource(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Resource,
        }
    }

    pub fn shape(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind: CodedErrorKind::Shape,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_error_is_found_through_anyhow_chain() {
        let inner = CodedError::resource(FONT_NOT_FOUND, "no match for 'Arial'");
        let wrapped = anyhow::Error::new(inner).context("while preparing overlay");

        let found = find_coded_error(&wrapped).expect("coded error should survive wrapping");
        assert_eq!(found.code, FONT_NOT_FOUND);
        assert_eq!(found.kind, CodedErrorKind::Resource);
    }

    #[test]
    fn display_includes_code_and_message() {
        let error = CodedError::shape(FRAME_SHAPE_MISMATCH, "frame 3 is 10x10, expected 20x20");
        assert_eq!(
            error.to_string(),
            "FRAME_SHAPE_MISMATCH: frame 3 is 10x10, expected 20x20"
        );
    }

    #[test]
    fn envelope_serializes_with_stable_fields() {
        let envelope =
            CodedError::configuration(OVERLAY_PADDING_TOO_LARGE, "padding 64 leaves no room")
                .envelope();
        let json = serde_json::to_value(&envelope).expect("envelope should serialize");
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], OVERLAY_PADDING_TOO_LARGE);
    }
}
