//! Error taxonomy for the allocator and its component data structures.
//!
//! Every fallible operation in this crate returns `Result<T, Error>` rather
//! than writing into an out-parameter error slot: the kind taxonomy below
//! mirrors the error list of the C library this crate's design is distilled
//! from, but propagation is ordinary `?`-based bubbling, not a slot the
//! caller must remember to inspect.

use core::fmt;

/// The category of failure. There is no `Ok` variant — the absence of an
/// error is represented by `Result::Ok`, not by a member of this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The OS refused a resource request (mapping, unmapping, page query).
    System,
    /// A primitive was called with malformed input (bad descriptor, etc).
    Argument,
    /// Tuning/configuration is internally inconsistent or a required
    /// callback is missing.
    BadConfig,
    /// The operation requires at least one element but the container is
    /// empty.
    Empty,
    /// The operation requires spare capacity but the container is full.
    Full,
    /// A key-based lookup found no match.
    BadKey,
    /// A blocking syscall was interrupted (e.g. `EINTR`). The core never
    /// synthesizes this itself; it is here so an OS-interop collaborator
    /// can report through the same error type.
    Interrupted,
    /// A non-blocking operation would have blocked (e.g. `EAGAIN`).
    Again,
    /// A mutex could not be acquired without blocking.
    MutexBusy,
    /// Writing to a closed pipe.
    Pipe,
    /// The peer closed the connection.
    ConnectionClosed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::System => "system error",
            ErrorKind::Argument => "invalid argument",
            ErrorKind::BadConfig => "bad configuration",
            ErrorKind::Empty => "empty",
            ErrorKind::Full => "full",
            ErrorKind::BadKey => "key not found",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Again => "would block",
            ErrorKind::MutexBusy => "mutex busy",
            ErrorKind::Pipe => "broken pipe",
            ErrorKind::ConnectionClosed => "connection closed",
        };
        f.write_str(s)
    }
}

/// An error from a fallible operation, carrying its [`ErrorKind`] plus an
/// optional static string pinpointing which invariant or call site failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    context: &'static str,
}

impl Error {
    pub const fn new(kind: ErrorKind, context: &'static str) -> Self {
        Self { kind, context }
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn context(&self) -> &'static str {
        self.context
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.context)
        }
    }
}

impl std::error::Error for Error {}

macro_rules! error_ctor {
    ($name:ident, $kind:ident) => {
        #[allow(non_snake_case)]
        pub const fn $name(context: &'static str) -> Error {
            Error::new(ErrorKind::$kind, context)
        }
    };
}

error_ctor!(system, System);
error_ctor!(argument, Argument);
error_ctor!(bad_config, BadConfig);
error_ctor!(empty, Empty);
error_ctor!(full, Full);
error_ctor!(bad_key, BadKey);
