/// `error.rs`: failures raised at the script/native boundary
///
/// Every variant aborts the current bound call before any native function
/// runs and surfaces in Lua as an ordinary, `pcall`-catchable error.
use thiserror::Error;

use crate::marshal::handle::HandleTag;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    /// A table is missing a field or a field has the wrong numeric kind.
    #[error("schema mismatch: field '{field}' expected {expected}")]
    SchemaMismatch { field: String, expected: &'static str },

    /// A handle was passed to an operation for a different resource type.
    #[error("type mismatch: expected {expected} handle, got {actual} handle")]
    TypeMismatch { expected: HandleTag, actual: HandleTag },

    /// A temporary array buffer could not be reserved.
    #[error("allocation failure: cannot reserve {count} x {element}")]
    AllocationFailure { count: usize, element: &'static str },

    /// Wrong Lua value kind at a positional argument.
    #[error("bad argument #{position} to '{function}' ({expected} expected, got {got})")]
    ArgumentType {
        function: &'static str,
        position: usize,
        expected: &'static str,
        got: String,
    },

    /// A conversion error raised while decoding a positional argument.
    #[error("bad argument #{position} to '{function}': {source}")]
    Argument {
        function: &'static str,
        position: usize,
        #[source]
        source: Box<BindError>,
    },

    /// A value that is not a handle (or not a handle cell) was given where a
    /// handle was required. Rewritten into `ArgumentType` at the call site.
    #[error("{expected} handle expected, got {got}")]
    NotAHandle { expected: HandleTag, got: String },

    /// A file-system function called below the trust level it needs.
    #[error("'{function}' needs trust level {required} or higher")]
    NotPermitted { function: &'static str, required: &'static str },

    /// Only raised in debug builds; release builds leave this undetected.
    #[error("use of {tag} handle after release")]
    UseAfterRelease { tag: HandleTag },
}

impl BindError {
    /// Strip argument context and return the underlying failure.
    pub fn root(&self) -> &BindError {
        match self {
            BindError::Argument { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach the bound function name and 1-based argument position.
    pub(crate) fn at(self, function: &'static str, position: usize) -> Self {
        match self {
            // Already positional: keep the innermost description.
            e @ (BindError::ArgumentType { .. } | BindError::Argument { .. }) => e,
            BindError::NotAHandle { expected, got } => BindError::ArgumentType {
                function,
                position,
                expected: expected.name(),
                got,
            },
            e => BindError::Argument { function, position, source: Box::new(e) },
        }
    }
}

impl From<BindError> for mlua::Error {
    fn from(e: BindError) -> Self {
        mlua::Error::external(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_argument_context() {
        let inner = BindError::SchemaMismatch { field: "width".into(), expected: "number" };
        let wrapped = inner.clone().at("CheckCollisionRecs", 2);
        assert_eq!(wrapped.root(), &inner);
        let msg = wrapped.to_string();
        assert!(msg.contains("#2"), "{msg}");
        assert!(msg.contains("'width'"), "{msg}");
    }

    #[test]
    fn argument_type_is_not_rewrapped() {
        let e = BindError::ArgumentType {
            function: "PlaySound",
            position: 1,
            expected: "Sound",
            got: "nil".into(),
        };
        assert_eq!(e.clone().at("Other", 3), e);
    }

    #[test]
    fn not_a_handle_becomes_positional() {
        let e = BindError::NotAHandle { expected: HandleTag::Sound, got: "table".into() };
        assert_eq!(
            e.at("PlaySound", 1),
            BindError::ArgumentType {
                function: "PlaySound",
                position: 1,
                expected: "Sound",
                got: "table".into(),
            }
        );
    }
}
