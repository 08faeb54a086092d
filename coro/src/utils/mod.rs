//! Internal data structures.
//!
//! [`Slab`] backs both the coroutine table and the I/O source registry;
//! its generation-checked [`Key`]s are what scheduling structures hold
//! instead of owning references.

mod slab;

pub(crate) use slab::{Key, Slab};
