#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod bucket;
mod error;

pub mod hash;

/// The low-level dense hash table.
///
/// This module provides `DenseTable`, which stores plain values and requires
/// the caller to supply hashes and equality predicates. Prefer the
/// [`DenseMap`] wrapper for a keyed interface unless you are building your
/// own map-like structure.
pub mod table;

/// The keyed map facade over the dense table.
pub mod map;

/// The sharded concurrent map.
#[cfg(feature = "std")]
pub mod sharded;

pub use error::Error;
pub use hash::DefaultHashBuilder;
pub use map::DenseMap;
pub use map::Entry;
#[cfg(feature = "std")]
pub use sharded::ShardedMap;
pub use table::DenseTable;
