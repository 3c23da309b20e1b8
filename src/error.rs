// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

/// Represent the types of errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The KVS connection is unreachable or a command timed out.
    Transport,

    /// A record read back from the KVS does not have the shape this crate
    /// expects (missing `type` field, unknown in-flight record type, ...).
    ContractViolation,

    /// A maintained invariant was found broken (negative trie counter,
    /// orphaned in-flight or retained id). The caller sees this error once;
    /// the store itself clamps and repairs the underlying counter.
    InvariantDrift,

    /// Configuration file or environment could not be loaded.
    Config,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Error {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Error { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::from_string(ErrorKind::Config, format!("IoError {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::from_string(ErrorKind::Config, format!("Invalid config: {err}"))
    }
}

#[cfg(feature = "redis_conn")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::from_string(ErrorKind::Transport, format!("Redis error: {err}"))
    }
}
