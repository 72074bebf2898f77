// Name registry: the set of display names currently in use.
//
// One `parking_lot::Mutex` guards an insertion-ordered `IndexSet`, so every
// check-then-insert happens under a single lock acquisition and snapshots list
// reserved names first, then players in the order they claimed. Reserved
// names are claimed at construction and `release` refuses to drop them.
//
// Exact string equality is the only uniqueness criterion ("bob" and "Bob"
// are different names).

use std::collections::HashSet;

use indexmap::IndexSet;
use parking_lot::Mutex;

pub struct NameRegistry {
    names: Mutex<IndexSet<String>>,
    reserved: HashSet<String>,
}

impl NameRegistry {
    /// Create a registry with `reserved` already claimed.
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: IndexSet<String> = reserved.into_iter().map(Into::into).collect();
        let reserved = names.iter().cloned().collect();
        Self {
            names: Mutex::new(names),
            reserved,
        }
    }

    /// Claim `name` if nobody holds it. Returns whether the claim succeeded.
    pub fn claim(&self, name: &str) -> bool {
        let mut names = self.names.lock();
        if names.contains(name) {
            return false;
        }
        names.insert(name.to_string());
        true
    }

    /// Release `name`. No-op if absent or reserved.
    pub fn release(&self, name: &str) {
        if self.reserved.contains(name) {
            return;
        }
        self.names.lock().shift_remove(name);
    }

    /// Swap `old` for `new` in one step: claims `new` and releases `old`, or
    /// changes nothing if `new` is taken.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        let mut names = self.names.lock();
        if names.contains(new) {
            return false;
        }
        if !self.reserved.contains(old) {
            names.shift_remove(old);
        }
        names.insert(new.to_string());
        true
    }

    /// Claim the first free name among `base`, `base_2`, `base_3`, ...
    pub fn claim_unique(&self, base: &str) -> String {
        let mut names = self.names.lock();
        let mut candidate = base.to_string();
        let mut suffix = 2u32;
        while names.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        names.insert(candidate.clone());
        candidate
    }

    /// All claimed names, reserved names first, then in claim order.
    pub fn snapshot(&self) -> Vec<String> {
        self.names.lock().iter().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn registry() -> NameRegistry {
        NameRegistry::new(["Server", "Admin", "System"])
    }

    #[test]
    fn reserved_names_are_taken_from_the_start() {
        let names = registry();
        assert!(!names.claim("Admin"));
        assert_eq!(names.snapshot(), vec!["Server", "Admin", "System"]);
    }

    #[test]
    fn claim_then_release_frees_the_name() {
        let names = registry();
        assert!(names.claim("User1"));
        assert!(!names.claim("User1"));
        names.release("User1");
        assert!(names.claim("User1"));
    }

    #[test]
    fn release_is_noop_for_absent_and_reserved() {
        let names = registry();
        names.release("Nobody");
        names.release("Server");
        assert_eq!(names.len(), 3);
        assert!(names.contains("Server"));
    }

    #[test]
    fn snapshot_keeps_claim_order_after_removal() {
        let names = registry();
        names.claim("User1");
        names.claim("User2");
        names.claim("User3");
        names.release("User2");
        assert_eq!(
            names.snapshot(),
            vec!["Server", "Admin", "System", "User1", "User3"]
        );
    }

    #[test]
    fn rename_is_atomic() {
        let names = registry();
        names.claim("User1");
        names.claim("Bob");

        assert!(!names.rename("User1", "Bob"));
        assert!(names.contains("User1"), "failed rename keeps the old name");

        assert!(names.rename("User1", "Alice"));
        assert!(!names.contains("User1"));
        assert!(names.contains("Alice"));
    }

    #[test]
    fn uniqueness_is_case_sensitive() {
        let names = registry();
        assert!(names.claim("bob"));
        assert!(names.claim("Bob"));
        assert!(names.claim("server"));
    }

    #[test]
    fn claim_unique_skips_taken_defaults() {
        let names = registry();
        names.claim("User4");
        names.claim("User4_2");
        assert_eq!(names.claim_unique("User4"), "User4_3");
        assert_eq!(names.claim_unique("User5"), "User5");
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        let names = Arc::new(registry());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let names = Arc::clone(&names);
                thread::spawn(move || names.claim("Contested"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
