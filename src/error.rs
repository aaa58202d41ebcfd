use core::fmt::Display;

/// Errors surfaced by the fallible portions of the map API.
///
/// Most operations on these maps are infallible by construction: duplicate
/// inserts and missing erase targets are ordinary return values, and
/// allocation on the hot paths follows the standard collection convention of
/// aborting through the global allocation handler. The exceptions are
/// [`DenseMap::at`] and friends, which report a missing key, and
/// [`DenseMap::try_reserve`], which reports allocation failure without
/// touching the table.
///
/// [`DenseMap::at`]: crate::DenseMap::at
/// [`DenseMap::try_reserve`]: crate::DenseMap::try_reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested key is not present in the map.
    KeyNotFound,
    /// The allocator refused to provide the requested capacity. The map is
    /// unchanged.
    AllocationFailed,
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::KeyNotFound => write!(f, "key not found"),
            Error::AllocationFailed => write!(f, "allocation failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
