//! HTTP Cache-Control directives feeding the freshness algorithm
//! (spec.md §3/§4.D).
//!
//! Grounded on `original_source/object.c`'s `CacheControlRec` (a flags
//! bitfield plus a handful of signed integer directives, `-1` meaning
//! "not present"). Expressed here as a `bitflags`-style flag set plus a
//! plain struct of `i64` fields using the same `-1` sentinel convention as
//! the source, rather than wrapping every field in an `Option`, since the
//! freshness algorithm treats "unset" and "negative" identically (per
//! `object.c`'s own comparisons against `-1`).

use bitflags::bitflags;

bitflags! {
    /// Directives that are booleans in HTTP (no associated value). Matches
    /// spec.md §3's object `cache_control` bitset vocabulary exactly, which
    /// also doubles as the request-side directive set passed to the
    /// freshness algorithm (`req_cc` in `objectIsStale`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheControlFlags: u16 {
        /// Plain `no-cache` (NO in the glossary's bitset).
        const NO               = 1 << 0;
        /// `no-cache` with a field-name list (request never sees filled
        /// fields stripped out here; tracked only as presence).
        const NO_HIDDEN        = 1 << 1;
        const NO_STORE         = 1 << 2;
        const PUBLIC           = 1 << 3;
        const PRIVATE          = 1 << 4;
        const NO_TRANSFORM     = 1 << 5;
        const MUST_REVALIDATE  = 1 << 6;
        const PROXY_REVALIDATE = 1 << 7;
        /// Representation varies by request header (Vary present).
        const MISMATCH         = 1 << 8;
        const VARY             = 1 << 9;
    }
}

impl Default for CacheControlFlags {
    fn default() -> Self {
        CacheControlFlags::empty()
    }
}

/// Parsed Cache-Control directives for one request or response, per
/// spec.md §3's "cache_control" field and §4.D's freshness inputs.
///
/// Integer fields default to `-1` ("not present"), matching
/// `object.c`'s `CacheControlRec` sentinel convention exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheControl {
    pub flags: CacheControlFlags,
    /// `max-age=N` (request or response).
    pub max_age: i64,
    /// `s-maxage=N` (response only; shared-cache override of `max_age`).
    pub s_maxage: i64,
    /// `min-fresh=N` (request only).
    pub min_fresh: i64,
    /// `max-stale=N`, or `i64::MAX` if present with no value ("any staleness
    /// acceptable"), per HTTP/1.1's optional-value grammar for this directive.
    pub max_stale: i64,
}

impl CacheControl {
    pub const UNSET: i64 = -1;

    pub fn new() -> Self {
        Self {
            flags: CacheControlFlags::empty(),
            max_age: Self::UNSET,
            s_maxage: Self::UNSET,
            min_fresh: Self::UNSET,
            max_stale: Self::UNSET,
        }
    }

    pub fn has(&self, flag: CacheControlFlags) -> bool {
        self.flags.contains(flag)
    }
}

impl Default for CacheControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_all_directives_unset() {
        let cc = CacheControl::new();
        assert_eq!(cc.max_age, CacheControl::UNSET);
        assert_eq!(cc.s_maxage, CacheControl::UNSET);
        assert!(cc.flags.is_empty());
    }

    #[test]
    fn flags_combine() {
        let mut cc = CacheControl::new();
        cc.flags |= CacheControlFlags::NO | CacheControlFlags::MUST_REVALIDATE;
        assert!(cc.has(CacheControlFlags::NO));
        assert!(cc.has(CacheControlFlags::MUST_REVALIDATE));
        assert!(!cc.has(CacheControlFlags::PUBLIC));
    }
}
