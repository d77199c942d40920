// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A coarse classification so callers can tell a bad schema from a corrupt file
//    without string matching.

use std::borrow::Cow;
use backtrace_error::DynBacktraceError;
use tracing::error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKind {
    // Duplicate or reserved column names, row length mismatch, type mismatch on append.
    Schema,
    // Null-ordering comparisons, non-boolean predicates, shape mismatches, unknown columns.
    Contract,
    // Unknown id flag, missing index entry, truncated container.
    Corruption,
    // File layout older (or newer) than anything we can read.
    Version,
    // A value with no registered store, bad config values.
    Config,
    // Anything converted from a foreign error type: io, codecs, csv.
    External,
    Other,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    #[allow(dead_code)]
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::External, err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} error: {}", self.kind, self.msg)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "tabula", ?kind, "{:?}", err);
        let msg = err.to_string();
        let inner = DynBacktraceError::from(err);
        Error { kind, msg, inner }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

fn simple(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Other, msg)
}

pub fn schema_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Schema, msg)
}

pub fn contract_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Contract, msg)
}

pub fn corrupt_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Corruption, msg)
}

pub fn version_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Version, msg)
}

pub fn config_err(msg: impl Into<Cow<'static, str>>) -> Error {
    simple(ErrorKind::Config, msg)
}
