//! Persistence hooks.
//!
//! Collections themselves carry no serialization logic; element types that
//! can be externalized implement [`Persistent`] and the caller drives the
//! traversal. The format set mirrors the interchange formats the engines
//! are asked to feed in practice; every hook defaults to
//! [`PersistError::Unsupported`] so an element type only fills in the
//! formats it actually speaks.

use std::io::{Read, Write};

/// External representation an element can be read from or written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Raw bytes, element-defined layout.
    Raw,
    Json,
    Xml,
    Yaml,
    /// The host application's own format.
    Native,
}

impl Format {
    pub fn is_textual(self) -> bool {
        !matches!(self, Format::Raw | Format::Native)
    }
}

/// Knobs shared by all formats.
#[derive(Clone, Debug)]
pub struct FormatParams {
    pub format: Format,
    /// Pretty-print where the format distinguishes (JSON, XML).
    pub pretty: bool,
    /// Nesting level the caller is already at, for indentation.
    pub level: usize,
}

impl FormatParams {
    pub fn new(format: Format) -> FormatParams {
        FormatParams {
            format,
            pretty: false,
            level: 0,
        }
    }

    pub fn pretty(mut self) -> FormatParams {
        self.pretty = true;
        self
    }

    pub fn nested(&self) -> FormatParams {
        FormatParams {
            level: self.level + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("format {0:?} not supported by this element type")]
    Unsupported(Format),
    #[error("malformed {format:?} input: {detail}")]
    Malformed {
        format: Format,
        detail: &'static str,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extension point for element types with an external representation.
///
/// Both hooks default to refusing the format, so implementors override
/// only what they support.
pub trait Persistent {
    fn write_to(&self, _out: &mut dyn Write, params: &FormatParams) -> Result<(), PersistError> {
        Err(PersistError::Unsupported(params.format))
    }

    fn read_from(
        &mut self,
        _input: &mut dyn Read,
        params: &FormatParams,
    ) -> Result<(), PersistError> {
        Err(PersistError::Unsupported(params.format))
    }
}
