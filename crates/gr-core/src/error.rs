use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("configuration error")]
    Configuration,
    #[error("corruption error")]
    Corruption,
    #[error("unknown column")]
    UnknownColumn,
    #[error("value encoding error")]
    ValueEncoding,
    #[error("column store error")]
    Store,
    #[error("publish sink error")]
    Sink,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::Configuration => 1001,
            Self::Corruption => 1002,
            Self::UnknownColumn => 1003,
            Self::ValueEncoding => 1004,
            Self::Store => 1005,
            Self::Sink => 1006,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;
