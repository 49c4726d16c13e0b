//! Byte-range model shared by swarm files and the HTTP responder

pub mod range;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

pub use range::{ByteRange, RangeError, parse_range_header};

/// Ordered stream of file bytes. Dropping it releases the underlying read.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;
