//! # ULID Service
//!
//! Generation and validation of ULIDs - the 26-character, Crockford-base32,
//! lexicographically sortable identifiers used for every external record id
//! and pagination cursor.
//!
//! ## Why ULID?
//!
//! - Sortable by creation time, which makes `id` a natural cursor key
//! - URL-safe, fixed-width, case-insensitive on input
//! - No coordination required between writers
//!
//! ## Monotonicity
//!
//! Two ULIDs generated in the same millisecond must still sort in issue
//! order, otherwise cursor pagination could skip rows inserted in the same
//! tick. The generator is therefore a process-wide singleton guarded by a
//! mutex, using the `ulid` crate's monotonic source.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::ulid::UlidService;
//!
//! let ids = UlidService::new();
//! let id = ids.generate();          // "01ARZ3NDEKTSV4RRFFQ69G5FAV"
//! assert!(UlidService::is_valid(&id));
//! ```

use std::sync::Mutex;

// Leading `::` disambiguates the crate from this module's own path
use ::ulid::{Generator, Ulid};

/// Process-wide monotonic ULID generator.
///
/// # Thread Safety
///
/// The internal generator is mutex-guarded; `generate` can be called from
/// any worker. Lock hold time is a few nanoseconds per id.
pub struct UlidService {
    generator: Mutex<Generator>,
}

impl std::fmt::Debug for UlidService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UlidService").finish_non_exhaustive()
    }
}

impl UlidService {
    /// Creates a new service instance. One per process is enough.
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }

    /// Generates the next ULID, monotonic within this process.
    ///
    /// On the (practically unreachable) random-overflow error inside a
    /// single millisecond, falls back to a fresh non-monotonic ULID rather
    /// than failing the request.
    pub fn generate(&self) -> String {
        let mut generator = self
            .generator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match generator.generate() {
            Ok(id) => id.to_string(),
            Err(_) => Ulid::new().to_string(),
        }
    }

    /// Validates a ULID in its canonical 26-character form.
    ///
    /// Used for cursors and record ids; invalid input is a caller error
    /// (400), never a lookup miss.
    pub fn is_valid(s: &str) -> bool {
        s.len() == 26 && Ulid::from_string(s).is_ok()
    }
}

impl Default for UlidService {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_valid() {
        let svc = UlidService::new();
        let id = svc.generate();
        assert_eq!(id.len(), 26);
        assert!(UlidService::is_valid(&id));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let svc = UlidService::new();
        let mut prev = svc.generate();
        for _ in 0..1000 {
            let next = svc.generate();
            assert!(next > prev, "{} should sort after {}", next, prev);
            prev = next;
        }
    }

    #[test]
    fn test_invalid_ulids_rejected() {
        assert!(!UlidService::is_valid(""));
        assert!(!UlidService::is_valid("not-a-ulid"));
        assert!(!UlidService::is_valid("01ARZ3NDEKTSV4RRFFQ69G5FA")); // 25 chars
        assert!(!UlidService::is_valid("01ARZ3NDEKTSV4RRFFQ69G5FAVX")); // 27 chars
        // 'U' is not in the Crockford alphabet
        assert!(!UlidService::is_valid("01ARZ3NDEKTSV4RRFFQ69G5FAU"));
    }

    #[test]
    fn test_lowercase_input_accepted() {
        // Crockford base32 decoding is case-insensitive
        assert!(UlidService::is_valid("01arz3ndektsv4rrffq69g5fav"));
    }
}
