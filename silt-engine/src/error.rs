use smol_str::SmolStr;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, self::Error>;

/// The error taxonomy exposed to host code.
///
/// Compile-time errors abort the whole form; run-time errors propagate
/// up through the context chain and out of `eval`/`apply`.
#[derive(Debug, Error)]
pub enum Error {
    /// Reader failure, with the source name and line where it occurred.
    #[error("{name}:{line}: {message}")]
    Parse {
        name: String,
        line: usize,
        message: String,
    },

    /// Malformed special form, bad formals, duplicate pattern variable, etc.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Expression shape the compiler cannot translate.
    #[error("compile error: {0}")]
    Compile(String),

    /// Free reference to a name with no binding.
    #[error("unbound variable {name}")]
    UnboundVariable { name: SmolStr },

    /// Procedure or primitive called with the wrong number of arguments.
    #[error("{0}")]
    WrongArgNumber(String),

    /// Primitive called with an argument of the wrong type.
    #[error("{0}")]
    WrongArgType(String),

    /// Generic runtime failure.
    #[error("{0}")]
    Misc(String),
}

impl Error {
    pub(crate) fn unbound(name: impl Into<SmolStr>) -> Self {
        Error::UnboundVariable { name: name.into() }
    }
}
