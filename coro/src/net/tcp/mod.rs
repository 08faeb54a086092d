//! TCP implementation of the stream capabilities.
//!
//! It is split into:
//! - [`listener`]: accepting incoming connections,
//! - [`stream`]: connected streams.

pub mod listener;
pub mod stream;
