use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid report: {0}")]
    InvalidReport(String),

    #[error("clock error: {0}")]
    Clock(String),
}
