//! Hash plumbing: the fingerprint fold and the strong 64-bit mixer.
//!
//! The tables in this crate consume hashes through the standard
//! [`BuildHasher`] capability and derive everything else themselves. For each
//! operation a key's 64-bit hash is *folded* into the pair the probe loop
//! needs: the (possibly remixed) hash that selects the home slot, and an
//! 8-bit fingerprint cached in bucket metadata for cheap negative
//! comparisons.
//!
//! A fingerprint of zero is reserved: empty and tombstone buckets carry a
//! zero fingerprint, so a metadata scan can treat `fingerprint == 0` as
//! never-equal without a state check. A hash whose low byte is zero is also a
//! weak-hash tell for trivial hashers (an identity hash of a small integer,
//! for example), so the fold routes such hashes through [`mix64`] before
//! deriving the fingerprint again. The fold is idempotent on its own output,
//! which lets the tables cache folded hashes and re-derive fingerprints from
//! them during rebuilds without consulting the key type.
//!
//! [`BuildHasher`]: core::hash::BuildHasher

/// The default hasher builder for maps in this crate.
///
/// `foldhash`'s fast variant: a high-quality 64-bit mixer with per-instance
/// seeding. Any [`BuildHasher`](core::hash::BuildHasher) can be substituted
/// through the `with_hasher` constructors.
pub type DefaultHashBuilder = foldhash::fast::RandomState;

/// Strong 64-bit finalization mixer (xor-shift-multiply chain).
///
/// Full-avalanche: every input bit affects every output bit. Used to repair
/// weak hashes whose low byte collides with the reserved zero fingerprint,
/// and usable on its own wherever a cheap integer mix is needed.
#[inline]
pub const fn mix64(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^= hash >> 33;
    hash
}

/// Folds a raw 64-bit hash into the `(hash, fingerprint)` pair used by the
/// probe loops.
///
/// The fingerprint is the low byte of the hash. If that byte is zero the hash
/// is remixed through [`mix64`] and the fingerprint re-derived; the returned
/// fingerprint is always non-zero. When the input already has a non-zero low
/// byte (which includes every value this function returns), the input is
/// passed through unchanged.
#[inline]
pub(crate) const fn fold(mut hash: u64) -> (u64, u8) {
    if hash as u8 == 0 {
        hash = mix64(hash);
        if hash as u8 == 0 {
            // Two consecutive zero low bytes out of the mixer is not a case
            // any real hash function produces; force the invariant rather
            // than loop.
            hash |= 1;
        }
    }
    (hash, hash as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix64_avalanches_small_inputs() {
        let mut seen = alloc::vec::Vec::new();
        for i in 0u64..64 {
            let mixed = mix64(i);
            assert!(!seen.contains(&mixed));
            seen.push(mixed);
        }
        // Low bytes of mixed consecutive integers should not be consecutive.
        let a = mix64(1) as u8;
        let b = mix64(2) as u8;
        assert_ne!(a.wrapping_add(1), b);
    }

    #[test]
    fn fold_never_returns_zero_fingerprint() {
        for i in 0u64..4096 {
            let (_, fp) = fold(i << 8);
            assert_ne!(fp, 0, "zero fingerprint for input {:#x}", i << 8);
        }
        let (_, fp) = fold(0);
        assert_ne!(fp, 0);
    }

    #[test]
    fn fold_is_idempotent() {
        for i in [0u64, 1, 0x100, 0xFF00, u64::MAX, 0xdead_beef_0000_0000] {
            let (h1, fp1) = fold(i);
            let (h2, fp2) = fold(h1);
            assert_eq!(h1, h2);
            assert_eq!(fp1, fp2);
        }
    }

    #[test]
    fn fold_passes_through_strong_hashes() {
        let h = 0xdead_beef_cafe_f00d_u64;
        assert_ne!(h as u8, 0);
        assert_eq!(fold(h), (h, h as u8));
    }
}
