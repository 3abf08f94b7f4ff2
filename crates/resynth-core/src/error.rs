//! Error types for source synthesis.
//!
//! Uses `thiserror` for structured, matchable variants. Every variant is fatal
//! to the request that raised it: synthesis never reports partial success.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::ValueId;

/// Errors produced while synthesizing source from a value heap.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Two different values claim the same output name.
    #[error("name conflict: '{name}' is both {existing} and {incoming}")]
    NameConflict {
        name: String,
        existing: String,
        incoming: String,
    },

    /// A container graph reaches itself with no literal cut point.
    #[error("cyclic value: {id} contains itself")]
    CyclicValue { id: ValueId },

    /// No literal form, import path or opaque encoding applies.
    #[error("cannot represent {id}: {reason}")]
    UnrepresentableValue { id: ValueId, reason: String },

    /// The target callable's definition is preceded by a decoration line.
    #[error("decorator not supported for '{name}' at {file}:{line}", file = file.display())]
    UndecoratableFunction {
        name: String,
        file: PathBuf,
        line: usize,
    },

    /// The signature/body split is ambiguous, or a default is not a literal.
    #[error("cannot analyze signature of '{qualname}': {reason}")]
    UnanalyzableSignature { qualname: String, reason: String },

    /// File analysis found no definition at the routine's recorded first line.
    #[error("{file}:{line}: cannot find def {name}", file = file.display())]
    MissingDefinition {
        name: String,
        file: PathBuf,
        line: usize,
    },

    /// A zero-argument call was requested on a callable that needs arguments.
    #[error("'{name}' cannot be called without arguments ({required} required)")]
    UnsupportedArity { name: String, required: usize },

    /// A value id is not present in the heap.
    #[error("value not found: {id}")]
    UnknownValue { id: ValueId },

    /// A heap edit does not fit the target object.
    #[error("invalid heap edit on {id}: {reason}")]
    InvalidEdit { id: ValueId, reason: String },

    /// Reading a source file failed.
    #[error("I/O error reading {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SynthError {
    /// Wraps an I/O failure with the path being read.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SynthError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = SynthError::NameConflict {
            name: "X".into(),
            existing: "7".into(),
            incoming: "8".into(),
        };
        assert_eq!(err.to_string(), "name conflict: 'X' is both 7 and 8");

        let err = SynthError::MissingDefinition {
            name: "f".into(),
            file: PathBuf::from("/src/job.py"),
            line: 12,
        };
        assert_eq!(err.to_string(), "/src/job.py:12: cannot find def f");
    }

    #[test]
    fn io_keeps_source() {
        use std::error::Error as _;
        let err = SynthError::io(
            "/missing.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("I/O error reading /missing.py"));
    }
}
