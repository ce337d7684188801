//! Domain errors raised by the library seams.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid attendance status: {0}")]
    InvalidStatus(String),

    #[error("invalid date {value}: expected YYYY-MM-DD")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("invalid report request: {0}")]
    InvalidReportRequest(String),

    #[error("too many recipients: {got} (max {max})")]
    TooManyRecipients { max: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
