//! Numeric status codes shared by services and reported by the request interceptor.

pub const OK: i32 = 200;
pub const DEF_ERR: i32 = 400;
pub const TOKEN_ERR: i32 = 401;
pub const EXCEPTION: i32 = 402;
pub const WRONG_REQ: i32 = 422;
pub const SYS_ERR: i32 = 500;
pub const HEADER_ERR: i32 = 510;
pub const TIMES_LIMITED: i32 = 512;

/// Maps a handler outcome to the status code logged for it.
pub trait StatusCode {
    fn status_code(&self) -> i32;
}

impl<T, E: StatusCode> StatusCode for Result<T, E> {
    fn status_code(&self) -> i32 {
        match self {
            Ok(_) => OK,
            Err(err) => err.status_code(),
        }
    }
}

impl StatusCode for crate::error::DocumentStoreError {
    fn status_code(&self) -> i32 {
        use crate::error::DocumentStoreError::*;

        match self {
            NoMatchingDocument(_) | DocumentAlreadyExists(..) | InvalidDocument(_) => DEF_ERR,
            UnfilteredDelete(_) | UnsupportedQuery(_) => WRONG_REQ,
            _ => SYS_ERR,
        }
    }
}

impl StatusCode for crate::error::CacheError {
    fn status_code(&self) -> i32 {
        SYS_ERR
    }
}

impl StatusCode for crate::error::ConfigError {
    fn status_code(&self) -> i32 {
        SYS_ERR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentStoreError;

    #[test]
    fn results_map_to_codes() {
        let ok: Result<(), DocumentStoreError> = Ok(());
        let missing: Result<(), _> = Err(DocumentStoreError::NoMatchingDocument("users".into()));
        let guarded: Result<(), _> = Err(DocumentStoreError::UnfilteredDelete("users".into()));
        let down: Result<(), _> = Err(DocumentStoreError::Backend("down".into()));

        assert_eq!(ok.status_code(), OK);
        assert_eq!(missing.status_code(), DEF_ERR);
        assert_eq!(guarded.status_code(), WRONG_REQ);
        assert_eq!(down.status_code(), SYS_ERR);
    }
}
