//! Primitive wire encodings layered on top of [`crate::bytes::Bytes`]:
//! stop-bit varints, length-prefixed strings, and decimal text
//! formatting/parsing. Hex-dump rendering is out of scope.

pub mod decimal;
pub mod stopbit;
pub mod string;
