//! Unified diagnostic type for the whole pipeline.
//!
//! Most errors already know which token to point at and are built as
//! [`Error::Located`] directly; a few low-level helpers (e.g. "expected an
//! identifier before the comma") don't have a token in hand yet and return
//! [`Error::Pending`], which the caller upgrades with [`Error::at`] once an
//! anchoring token is available. No `thiserror`/`anyhow` here, just a plain
//! `Result<T, String>`-flavored error enum.

use std::fmt;

use crate::debug::DebugInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A diagnostic pinned to an exact source location.
    Located { info: DebugInfo, message: String },
    /// A diagnostic without a location yet; must be anchored with `.at(..)`
    /// before it is shown to the user.
    Pending { message: String },
}

impl Error {
    pub fn located(info: DebugInfo, message: impl Into<String>) -> Self {
        Error::Located {
            info,
            message: message.into(),
        }
    }

    pub fn pending(message: impl Into<String>) -> Self {
        Error::Pending {
            message: message.into(),
        }
    }

    /// Upgrade a `Pending` error to a `Located` one. A `Located` error is
    /// left unchanged, since its own position is more precise than
    /// whatever anchor the caller has on hand.
    pub fn at(self, info: DebugInfo) -> Self {
        match self {
            Error::Pending { message } => Error::Located { info, message },
            located => located,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Located { message, .. } => message,
            Error::Pending { message } => message,
        }
    }

    pub fn debug_info(&self) -> Option<&DebugInfo> {
        match self {
            Error::Located { info, .. } => Some(info),
            Error::Pending { .. } => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Located { info, message } => {
                write!(f, "{}:{}:{}: {}", info.file, info.line, info.column, message)
            }
            Error::Pending { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
