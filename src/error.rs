//! Crate-level error taxonomy.
//!
//! Mirrors the behavioral categories fixed by the core's error-handling
//! design: bounds, closed-state, I/O, format, alignment, and contract
//! errors. Each variant carries enough context to reconstruct a useful
//! message without paying for a backtrace on the happy path; closed-state
//! and contract errors additionally capture one under `trace-reservations`
//! or debug builds, since those are the two categories the design calls out
//! as wanting a release-site trace for diagnosis.

use core::fmt;
use std::backtrace::Backtrace;

use crate::refcount::ReferenceOwner;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, BytesError>;

fn capture_backtrace() -> Option<Backtrace> {
    if cfg!(any(feature = "trace-reservations", debug_assertions)) {
        Some(Backtrace::capture())
    } else {
        None
    }
}

#[derive(Debug)]
pub enum BytesError {
    // ── Bounds errors ───────────────────────────────────────────────────
    /// A read would advance `readPosition` past `readLimit`.
    ReadUnderflow {
        position: usize,
        requested: usize,
        limit: usize,
    },
    /// A write would advance `writePosition` past `writeLimit` on a
    /// non-elastic cursor (or past `MAX_CAPACITY` on an elastic one).
    WriteOverflow {
        position: usize,
        requested: usize,
        limit: usize,
    },
    /// An absolute offset access fell outside `[start, realCapacity)`.
    OffsetOutOfRange {
        offset: usize,
        start: usize,
        real_capacity: usize,
    },

    // ── Closed-state errors ─────────────────────────────────────────────
    /// Operation attempted on a store whose `refCount` reached zero.
    Closed { released_at: Option<Backtrace> },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Mapping, extension, or sync of a memory-mapped file failed.
    Io(std::io::Error),

    // ── Format errors ───────────────────────────────────────────────────
    /// A decoded byte sequence was not valid UTF-8.
    InvalidUtf8,
    /// A numeric text form did not match the expected grammar.
    MalformedNumber,
    /// A stop-bit integer exceeded the 10-byte maximum encoded length.
    StopBitTooLong,
    /// An operation requires a value representable as `(i64 mantissa, u8 scale)`
    /// but the input needs arbitrary precision.
    DecimalPrecisionUnsupported,

    // ── Alignment errors ─────────────────────────────────────────────────
    /// A volatile or CAS access targeted an address that is not naturally
    /// aligned for the access width.
    Unaligned { address: usize, width: usize },

    // ── Contract errors ──────────────────────────────────────────────────
    /// `release(owner)` was called twice by the same owner, or by an owner
    /// that never reserved.
    DoubleRelease {
        owner: ReferenceOwner,
        trace: Option<Backtrace>,
    },
    /// `releaseLast()` was called while other owners still hold a reservation.
    NotLastReference { remaining: usize },
    /// A buffer-wrapping operation received a read-only buffer where a
    /// mutable one was required.
    InvalidArgument(&'static str),
}

impl BytesError {
    pub(crate) fn closed() -> Self {
        BytesError::Closed {
            released_at: capture_backtrace(),
        }
    }

    pub(crate) fn double_release(owner: ReferenceOwner) -> Self {
        BytesError::DoubleRelease {
            owner,
            trace: capture_backtrace(),
        }
    }
}

impl fmt::Display for BytesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytesError::ReadUnderflow {
                position,
                requested,
                limit,
            } => write!(
                f,
                "read underflow: position {position} + {requested} exceeds limit {limit}"
            ),
            BytesError::WriteOverflow {
                position,
                requested,
                limit,
            } => write!(
                f,
                "write overflow: position {position} + {requested} exceeds limit {limit}"
            ),
            BytesError::OffsetOutOfRange {
                offset,
                start,
                real_capacity,
            } => write!(
                f,
                "offset {offset} out of range [{start}, {real_capacity})"
            ),
            BytesError::Closed { .. } => write!(f, "operation on closed/released store"),
            BytesError::Io(e) => write!(f, "I/O error: {e}"),
            BytesError::InvalidUtf8 => write!(f, "invalid UTF-8 sequence"),
            BytesError::MalformedNumber => write!(f, "malformed numeric text"),
            BytesError::StopBitTooLong => write!(f, "stop-bit integer exceeds 10 bytes"),
            BytesError::DecimalPrecisionUnsupported => {
                write!(f, "decimal value requires arbitrary precision")
            }
            BytesError::Unaligned { address, width } => write!(
                f,
                "unaligned access: address {address:#x} is not {width}-byte aligned"
            ),
            BytesError::DoubleRelease { owner, .. } => {
                write!(f, "double release or release by unknown owner: {owner:?}")
            }
            BytesError::NotLastReference { remaining } => write!(
                f,
                "releaseLast() called while {remaining} other reservation(s) remain"
            ),
            BytesError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for BytesError {}

impl From<std::io::Error> for BytesError {
    fn from(e: std::io::Error) -> Self {
        BytesError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_non_empty() {
        let errs = [
            BytesError::ReadUnderflow {
                position: 4,
                requested: 8,
                limit: 8,
            },
            BytesError::WriteOverflow {
                position: 16,
                requested: 1,
                limit: 16,
            },
            BytesError::InvalidUtf8,
            BytesError::MalformedNumber,
            BytesError::StopBitTooLong,
        ];
        for e in errs {
            assert!(!e.to_string().is_empty());
        }
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e: BytesError = io_err.into();
        assert!(matches!(e, BytesError::Io(_)));
    }
}
