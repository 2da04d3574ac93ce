// mm2batch: Batch alignment boundary codec and buffer ownership.
//
// Copyright 2025 Tommi Mäklin [tommi@maklin.fi].
//
// Copyrights in this project are retained by contributors. No copyright assignment
// is required to contribute to this project.
//
// Except as otherwise noted (below and/or in individual files), this
// project is licensed under the Apache License, Version 2.0
// <LICENSE-APACHE> or <http://www.apache.org/licenses/LICENSE-2.0> or
// the MIT license, <LICENSE-MIT> or <http://opensource.org/licenses/MIT>,
// at your option.
//

//! Errors reported across the boundary.
//!
//! Every failure is reported once, as a [BridgeError] carrying a descriptive
//! message. Nothing in the library terminates the process.

/// A failed boundary operation.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Memory for a buffer could not be obtained.
    Allocation(String),
    /// A buffer handle does not resolve to live memory.
    Address(String),
    /// A null or destroyed index handle was used.
    InvalidHandle(String),
    /// An index file could not be opened or read.
    Io(String),
    /// The preset name is not one of [Preset](crate::options::Preset).
    UnknownPreset(String),
    /// The sequence batch does not fill its buffer exactly.
    MalformedBatch(String),
    /// A fixed-layout record could not be encoded or decoded.
    Codec(String),
}

impl BridgeError {
    pub fn message(&self) -> &str {
        match self {
            BridgeError::Allocation(msg) => msg,
            BridgeError::Address(msg) => msg,
            BridgeError::InvalidHandle(msg) => msg,
            BridgeError::Io(msg) => msg,
            BridgeError::UnknownPreset(msg) => msg,
            BridgeError::MalformedBatch(msg) => msg,
            BridgeError::Codec(msg) => msg,
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let kind = match self {
            BridgeError::Allocation(_) => "allocation error",
            BridgeError::Address(_) => "address error",
            BridgeError::InvalidHandle(_) => "invalid handle",
            BridgeError::Io(_) => "I/O error",
            BridgeError::UnknownPreset(_) => "unknown preset",
            BridgeError::MalformedBatch(_) => "malformed sequence batch",
            BridgeError::Codec(_) => "codec error",
        };
        write!(f, "{}: {}", kind, self.message())
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BridgeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BridgeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BridgeError::Codec(err.to_string())
    }
}

// Tests
#[cfg(test)]
mod tests {

    #[test]
    fn display_includes_kind_and_message() {
        use super::BridgeError;

        let err = BridgeError::Allocation("can't allocate memory for alignment buffer".to_string());
        assert_eq!(err.to_string(), "allocation error: can't allocate memory for alignment buffer");
        assert_eq!(err.message(), "can't allocate memory for alignment buffer");
    }

    #[test]
    fn io_error_converts_to_io_variant() {
        use super::BridgeError;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let got: BridgeError = io.into();
        assert_eq!(got, BridgeError::Io("no such file".to_string()));
    }
}
