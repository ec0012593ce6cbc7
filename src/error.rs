use std::fmt::{Display, Formatter};
use std::sync::PoisonError;

use config::ConfigError;

use crate::buffer::FrameId;

pub type Result<T> = std::result::Result<T, Error>;

// All except Internal are considered user-facing.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Internal(String),
    /// The frame id is outside the range the replacer was built for.
    InvalidFrameId(FrameId),
    /// The frame is tracked but pinned, so it cannot be removed.
    FrameNotEvictable(FrameId),
}

impl Error {
    pub fn internal<E: ToString>(msg: E) -> Error {
        Error::Internal(msg.to_string())
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal(s) => write!(f, "{}", s),
            Error::InvalidFrameId(frame_id) => write!(f, "invalid frame id {}", frame_id),
            Error::FrameNotEvictable(frame_id) => {
                write!(f, "frame {} is not evictable", frame_id)
            }
        }
    }
}

impl std::error::Error for Error {}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::internal(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::internal(err)
    }
}
