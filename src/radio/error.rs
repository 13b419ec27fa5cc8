use thiserror::Error;

/// Numeric error codes shared with the C ABI. `None` is never carried by a
/// [`ChainError`]; it is what the ABI reports when no error is pending.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None = 0,
    InvalidConstruction = 1,
    InvalidParameter = 2,
    BlockTooLarge = 3,
    NonFinite = 4,
    Released = 5,
    InvalidHandle = 6,
}

impl ErrorCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {})", .code.as_i32())]
pub struct ChainError {
    code: ErrorCode,
    message: String,
}

impl ChainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn construction(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConstruction, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameter, message)
    }

    pub fn non_finite(stage: &str) -> Self {
        Self::new(
            ErrorCode::NonFinite,
            format!("{stage} produced a non-finite sample"),
        )
    }

    pub fn released() -> Self {
        Self::new(ErrorCode::Released, "chain has already been destroyed")
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Fails with `NonFinite` if any sample in `block` is NaN or infinite.
pub fn ensure_finite(block: &[f32], stage: &str) -> ChainResult<()> {
    if block.iter().all(|s| s.is_finite()) {
        Ok(())
    } else {
        Err(ChainError::non_finite(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let err = ChainError::invalid_parameter("Q must be greater than 0");
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
        assert_eq!(err.to_string(), "Q must be greater than 0 (code 2)");
    }

    #[test]
    fn ensure_finite_flags_nan_and_inf() {
        assert!(ensure_finite(&[0.0, 1.0, -1.0], "eq").is_ok());
        assert_eq!(
            ensure_finite(&[0.0, f32::NAN], "eq").unwrap_err().code(),
            ErrorCode::NonFinite
        );
        assert!(ensure_finite(&[f32::INFINITY], "eq").is_err());
    }
}
