//! Object digests and the digest-backed registration store.
//!
//! Each object id digests to `H(le32(source) || name)`. A set of objects
//! digests to `H` over the concatenation of the member digests in
//! lexicographic order, so two equal sets always produce equal digests
//! regardless of insertion order. `H` is SHA-1 by default, behind a small
//! trait so tests can substitute.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use ticl_proto::ObjectId;

/// Incremental digest function used for registration summaries and the
/// persistent-state authentication code.
pub trait DigestFunction: Send {
    /// Discard accumulated input.
    fn reset(&mut self);

    /// Feed bytes into the digest.
    fn update(&mut self, data: &[u8]);

    /// Produce the digest of everything fed since the last reset, and
    /// reset.
    fn digest(&mut self) -> Vec<u8>;
}

/// The default digest function, SHA-1.
pub struct Sha1DigestFunction {
    hasher: Sha1,
}

impl Sha1DigestFunction {
    /// Create a fresh SHA-1 digest function.
    pub fn new() -> Self {
        Sha1DigestFunction { hasher: Sha1::new() }
    }
}

impl Default for Sha1DigestFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestFunction for Sha1DigestFunction {
    fn reset(&mut self) {
        self.hasher = Sha1::new();
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.hasher, data);
    }

    fn digest(&mut self) -> Vec<u8> {
        self.hasher.finalize_reset().to_vec()
    }
}

/// Digest a single object id: `H(le32(source) || name)`.
pub fn object_id_digest(object_id: &ObjectId, digest_fn: &mut dyn DigestFunction) -> Vec<u8> {
    digest_fn.reset();
    digest_fn.update(&object_id.source.to_le_bytes());
    digest_fn.update(&object_id.name);
    digest_fn.digest()
}

/// A set of object ids with a memoised summary digest and prefix
/// enumeration for registration sync.
///
/// Objects are keyed by their digest, which keeps iteration in
/// lexicographic digest order - exactly the order the set digest is
/// defined over.
pub struct SimpleRegistrationStore {
    digest_fn: Box<dyn DigestFunction>,
    registrations: BTreeMap<Vec<u8>, ObjectId>,
    digest: Vec<u8>,
}

impl SimpleRegistrationStore {
    /// Create an empty store using `digest_fn`.
    pub fn new(mut digest_fn: Box<dyn DigestFunction>) -> Self {
        digest_fn.reset();
        let digest = digest_fn.digest();
        SimpleRegistrationStore {
            digest_fn,
            registrations: BTreeMap::new(),
            digest,
        }
    }

    /// Add an object. Returns true if it was not already present.
    pub fn add(&mut self, object_id: ObjectId) -> bool {
        let key = object_id_digest(&object_id, self.digest_fn.as_mut());
        let added = self.registrations.insert(key, object_id).is_none();
        self.recompute_digest();
        added
    }

    /// Remove an object. Returns true if it was present.
    pub fn remove(&mut self, object_id: &ObjectId) -> bool {
        let key = object_id_digest(object_id, self.digest_fn.as_mut());
        let removed = self.registrations.remove(&key).is_some();
        self.recompute_digest();
        removed
    }

    /// Remove everything, returning the removed objects.
    pub fn remove_all(&mut self) -> Vec<ObjectId> {
        let removed: Vec<ObjectId> =
            std::mem::take(&mut self.registrations).into_values().collect();
        self.recompute_digest();
        removed
    }

    /// True if `object_id` is in the store.
    pub fn contains(&mut self, object_id: &ObjectId) -> bool {
        let key = object_id_digest(object_id, self.digest_fn.as_mut());
        self.registrations.contains_key(&key)
    }

    /// Number of objects in the store.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// True if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// The memoised digest over the whole set.
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Objects whose digest starts with the given bit prefix.
    ///
    /// The simple store returns every element and leaves prefix filtering
    /// to the server, which tolerates over-approximation.
    pub fn elements_with_prefix(&self, _prefix: &[u8], _prefix_len: i32) -> Vec<ObjectId> {
        self.registrations.values().cloned().collect()
    }

    fn recompute_digest(&mut self) {
        self.digest_fn.reset();
        for object_digest in self.registrations.keys() {
            self.digest_fn.update(object_digest);
        }
        self.digest = self.digest_fn.digest();
    }
}
