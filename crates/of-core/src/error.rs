use thiserror::Error;

pub type OfResult<T> = Result<T, OfError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OfError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}
