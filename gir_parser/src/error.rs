use std::path::PathBuf;

use thiserror::Error;

/// Position of a parse failure within the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, character {}", self.line, self.column)
    }
}

/// Compute line and column (both 1-based) of a byte offset.
pub(crate) fn position_of(content: &str, offset: usize) -> Position {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut column = 1u32;
    for byte in content.as_bytes()[..offset].iter() {
        if *byte == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Position { line, column }
}

/// Errors produced while turning a GIR document into IR modules. All are
/// fatal for the document being parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{position}: malformed XML: {message}")]
    Xml { position: Position, message: String },

    #[error("{position}: the attribute '{attribute}' on the element '{element}' must be specified")]
    MissingAttribute {
        position: Position,
        element: String,
        attribute: String,
    },

    #[error("{position}: unsupported repository version '{version}'")]
    UnsupportedVersion { position: Position, version: String },

    #[error("{position}: only one <namespace> element is allowed per <repository>")]
    DuplicateNamespace { position: Position },

    #[error("{position}: <namespace> name '{name}' does not match file name '{expected}'")]
    NamespaceMismatch {
        position: Position,
        name: String,
        expected: String,
    },

    #[error("{position}: the element <{element}> is invalid here")]
    InvalidElement { position: Position, element: String },

    #[error("{position}: unexpected end tag '{found}', expected '{expected}'")]
    MismatchedEndTag {
        position: Position,
        expected: String,
        found: String,
    },

    #[error("module '{name}' imported with conflicting versions '{existing}' and '{requested}'")]
    ConflictingIncludeVersions {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("could not find GIR file '{girname}'; check XDG_DATA_DIRS or use --includedir")]
    IncludeNotFound { girname: String },

    #[error("expected filename to end with '.gir': {}", path.display())]
    BadFilename { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
