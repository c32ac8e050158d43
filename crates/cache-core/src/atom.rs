//! Atom Table — interned, refcounted immutable byte strings (spec §4.B).
//!
//! Atoms back header names/values and other small strings that recur across
//! many objects. Two atoms compare equal iff they are the same interned
//! entry (`Arc` pointer identity), never by content, matching the "equality
//! compared by identity" rule in spec.md §3.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// An interned byte string. Cloning is cheap (`Arc` clone); comparison is by
/// identity, not content.
#[derive(Clone, Debug)]
pub struct Atom(Arc<[u8]>);

impl Atom {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Builds an atom outside of any `AtomTable`. Equality stays
    /// identity-based, so a detached atom never compares equal to an
    /// interned one (or another detached one) built from the same bytes.
    /// Used for the rare case where `Object` needs to stash a one-off
    /// status message without a back-reference to the table (see
    /// DESIGN.md).
    pub(crate) fn detached(bytes: &[u8]) -> Self {
        Atom(Arc::from(bytes))
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Atom {}

impl std::ops::Deref for Atom {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// The intern table. One instance is owned by the `Engine`; atoms created
/// from it stay alive for as long as their refcount is nonzero.
///
/// Grounded on `dedup_index.rs`'s `DashMap`-backed concurrent index: here the
/// key is the byte string itself rather than a content hash, and entries are
/// refcounted instead of LRU-evicted, since atoms are never evicted except by
/// explicit `release`.
pub struct AtomTable {
    interned: DashMap<Vec<u8>, Arc<[u8]>>,
    refcounts: Mutex<std::collections::HashMap<Vec<u8>, usize>>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            interned: DashMap::new(),
            refcounts: Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// Interns `bytes`, returning an `Atom` referencing the single shared
    /// copy. Bumps the refcount if an entry already exists.
    pub fn intern(&self, bytes: &[u8]) -> Atom {
        let arc = self
            .interned
            .entry(bytes.to_vec())
            .or_insert_with(|| Arc::from(bytes))
            .clone();

        *self.refcounts.lock().entry(bytes.to_vec()).or_insert(0) += 1;
        Atom(arc)
    }

    /// Interns the ASCII-lowercased form of `bytes` (spec.md §4.B
    /// `intern_lower`), matching the original's `internAtomLowerCase` used
    /// for case-insensitive header-name lookups. The returned atom's bytes
    /// are the lowercased copy, not the original casing.
    pub fn intern_lower(&self, bytes: &[u8]) -> Atom {
        let lower: Vec<u8> = bytes.iter().map(u8::to_ascii_lowercase).collect();
        self.intern(&lower)
    }

    /// Bumps the refcount of an atom already present in the table (spec.md
    /// §4.B `retain`), without creating a new entry. Returns `None` if
    /// `bytes` is not currently interned.
    pub fn retain(&self, bytes: &[u8]) -> Option<Atom> {
        let arc = self.interned.get(bytes)?.clone();
        *self.refcounts.lock().entry(bytes.to_vec()).or_insert(0) += 1;
        Some(Atom(arc))
    }

    /// Releases one reference to the atom with the given content. Once the
    /// refcount reaches zero the entry is dropped from the table; the
    /// `Atom` handles already cloned out remain valid (they hold their own
    /// `Arc`) until they themselves are dropped.
    pub fn release(&self, bytes: &[u8]) {
        let mut refcounts = self.refcounts.lock();
        if let Some(count) = refcounts.get_mut(bytes) {
            *count -= 1;
            if *count == 0 {
                refcounts.remove(bytes);
                self.interned.remove(bytes);
            }
        }
    }

    /// Number of distinct interned byte strings currently live.
    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }

    /// Current refcount for `bytes`, or 0 if not interned.
    pub fn refcount(&self, bytes: &[u8]) -> usize {
        self.refcounts.lock().get(bytes).copied().unwrap_or(0)
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_bytes_returns_identical_atom() {
        let table = AtomTable::new();
        let a = table.intern(b"Content-Type");
        let b = table.intern(b"Content-Type");
        assert_eq!(a, b);
        assert_eq!(table.refcount(b"Content-Type"), 2);
    }

    #[test]
    fn different_bytes_are_not_equal() {
        let table = AtomTable::new();
        let a = table.intern(b"Content-Type");
        let b = table.intern(b"Content-Length");
        assert_ne!(a, b);
    }

    #[test]
    fn intern_lower_normalizes_case_to_the_same_atom() {
        let table = AtomTable::new();
        let a = table.intern_lower(b"Content-Type");
        let b = table.intern_lower(b"CONTENT-TYPE");
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), b"content-type");
    }

    #[test]
    fn retain_bumps_refcount_without_inserting() {
        let table = AtomTable::new();
        assert!(table.retain(b"Host").is_none());

        table.intern(b"Host");
        assert_eq!(table.refcount(b"Host"), 1);

        let retained = table.retain(b"Host").unwrap();
        assert_eq!(retained.as_bytes(), b"Host");
        assert_eq!(table.refcount(b"Host"), 2);
    }

    #[test]
    fn detached_atom_never_equals_an_interned_one() {
        let table = AtomTable::new();
        let interned = table.intern(b"Via");
        let detached = Atom::detached(b"Via");
        assert_ne!(interned, detached);
    }

    #[test]
    fn release_drops_entry_at_zero_refcount() {
        let table = AtomTable::new();
        table.intern(b"ETag");
        table.intern(b"ETag");
        assert_eq!(table.len(), 1);

        table.release(b"ETag");
        assert_eq!(table.len(), 1);

        table.release(b"ETag");
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn atom_survives_table_release_while_cloned() {
        let table = AtomTable::new();
        let atom = table.intern(b"Vary");
        table.release(b"Vary");
        assert_eq!(atom.as_bytes(), b"Vary");
    }
}
