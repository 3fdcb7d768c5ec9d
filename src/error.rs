use thiserror::Error;

/// Upper bound on a formatted error message, mirroring `FACT_MAX_ERR_LEN` in the
/// original implementation.
pub const MAX_ERR_LEN: usize = 100;

/// The five thrown-error kinds plus `SyntaxError`, which exists only so a future
/// text front end has somewhere to report lexer/parser failures; nothing in this
/// crate raises it directly since there is no lexer here (see `ast`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FactError {
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("name error: {0}")]
    NameError(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("bounds error: {0}")]
    BoundsError(String),
    #[error("value error: {0}")]
    ValueError(String),
    #[error("runtime error: {0}")]
    RuntimeError(String),
}

impl FactError {
    pub fn name(msg: impl Into<String>) -> Self {
        FactError::NameError(msg.into())
    }
    pub fn ty(msg: impl Into<String>) -> Self {
        FactError::TypeError(msg.into())
    }
    pub fn bounds(msg: impl Into<String>) -> Self {
        FactError::BoundsError(msg.into())
    }
    pub fn value(msg: impl Into<String>) -> Self {
        FactError::ValueError(msg.into())
    }
    pub fn runtime(msg: impl Into<String>) -> Self {
        FactError::RuntimeError(msg.into())
    }

    /// The message truncated to `MAX_ERR_LEN` bytes, matching the C original's
    /// fixed-size error buffer. Truncates on a char boundary so we never split a
    /// multi-byte UTF-8 sequence.
    pub fn bounded_message(&self) -> String {
        let full = self.to_string();
        if full.len() <= MAX_ERR_LEN {
            return full;
        }
        let mut end = MAX_ERR_LEN;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        full[..end].to_string()
    }
}

/// A thrown error together with the source line it occurred near, the payload
/// stored in a thread's `curr_err` and surfaced to `catch`/`handle` handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrownError {
    pub line: u32,
    pub error: FactError,
}

impl std::fmt::Display for ThrownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error near line {}: {}", self.line, self.error.bounded_message())
    }
}
