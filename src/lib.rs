//! bytes-core — a low-level byte-buffer library for high-throughput
//! serialization, modeled on Chronicle-Bytes.
//!
//! Four subsystems, from the ground up:
//!
//! - [`mem`]: the unsafe raw-memory primitive layer (native allocation,
//!   volatile/CAS access, heap-slice accessors). Everything above this
//!   module is safe code.
//! - [`store`] and [`mapped`]: the [`store::BytesStore`] trait and its
//!   concrete backings — native fixed/elastic, heap, wrapped, pointer, and
//!   the chunked memory-mapped file store — plus the reference-counted
//!   lifetime model in [`refcount`] they all share.
//! - [`bytes`]: [`bytes::Bytes`], the dual-cursor read/write view over a
//!   single store.
//! - [`codec`]: stop-bit varints, length-prefixed strings, and decimal
//!   text formatting built on top of a `Bytes` cursor.
//!
//! [`uniquetime`] provides the host-wide monotonic timestamp generator;
//! [`config`] and [`error`] are the ambient configuration and error-handling
//! layers the rest of the crate is built on.

pub mod bytes;
pub mod codec;
pub mod config;
pub mod error;
pub mod mapped;
pub mod mem;
pub mod refcount;
pub mod store;
pub mod uniquetime;

pub use bytes::Bytes;
pub use error::{BytesError, Result};
pub use mem::byte_checksum;
pub use refcount::{RefCount, ReferenceOwner};

pub use config::ChunkConfig;
pub use mapped::{ChunkedFileStore, FileLock, SyncMode};
pub use store::{
    BytesStore, HeapStore, NativeElasticStore, NativeFixedStore, PointerStore, Store, StoreHandle,
    WrappedStore,
};

pub use codec::decimal::{
    append_decimal, append_double, append_double_with_precision, append_long, append_long_padded,
    append_str, parse_double, parse_long,
};
pub use codec::stopbit::{
    read_decimal, read_signed, read_unsigned, write_decimal, write_signed, write_unsigned,
};
pub use codec::string::{parse_8bit, read_8bit, read_utf8, write_8bit, write_utf8};

pub use uniquetime::{to_micros, unique_micros, unique_nanos};
