//! Result alias and extension helpers.

use crate::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension methods for attaching context to fallible operations.
pub trait ResultExt<T> {
    /// Prefix the error (if any) with a description of what was attempted.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], but only builds the message on failure.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_on_ok_is_transparent() -> Result<()> {
        let value: Result<u8> = Ok(3);
        assert_eq!(value.context("unused")?, 3);
        Ok(())
    }

    #[test]
    fn test_with_context_prefixes_message() {
        let value: Result<u8> = Err(Error::io_error("disk full"));
        let err = value.with_context(|| "writing config").err();
        assert_eq!(
            err.map(|e| e.to_string()),
            Some("writing config: IO error: disk full".to_string())
        );
    }
}
