//! Symbol interning.
//!
//! A [`SymbolTable`] maps strings to compact `u64` ids so that `Term::String`
//! values (and predicate/rule names) can be compared and hashed without
//! touching the underlying bytes. Every table reserves a fixed default
//! region for well-known symbols, with user-defined symbols starting at
//! [`USER_SYMBOL_OFFSET`].

use std::collections::HashMap;

/// First id available to user-inserted symbols. Ids below this are reserved
/// for [`DEFAULT_SYMBOLS`].
pub const USER_SYMBOL_OFFSET: u64 = 1024;

/// The reserved, process-wide default symbol list. Order is load-bearing:
/// a symbol's id is its index in this list.
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "read", "write", "resource", "operation", "right", "time", "role",
    "owner", "tenant", "namespace", "group", "member", "ip_address",
    "client", "authority", "ambient", "allow", "deny", "query",
    "current_time", "revocation_id", "expiration", "check_if", "policy",
    "unbound", "error", "variable", "set",
];

/// The reserved symbol marking authority-only facts/rules (§4.5).
pub const AUTHORITY_SYMBOL: &str = "authority";

/// An owned, growable symbol table.
///
/// `insert` is idempotent: inserting the same string twice returns the same
/// id. Ids issued by a given table are stable for that table's lifetime;
/// comparing ids across two unrelated tables is meaningless unless the
/// tables were merged (see [`SymbolTable::extend`]).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// User-region strings in insertion order; id = `USER_SYMBOL_OFFSET + index`.
    user: Vec<String>,
    by_str: HashMap<String, u64>,
}

impl SymbolTable {
    /// Create an empty table (only the default region is implicitly available).
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `s`, returning its stable id. Idempotent.
    pub fn insert(&mut self, s: &str) -> u64 {
        if let Some(id) = default_symbol_id(s) {
            return id;
        }
        if let Some(&id) = self.by_str.get(s) {
            return id;
        }
        let id = USER_SYMBOL_OFFSET + self.user.len() as u64;
        self.user.push(s.to_string());
        self.by_str.insert(s.to_string(), id);
        id
    }

    /// Look up `s` without inserting it.
    pub fn sym(&self, s: &str) -> Option<u64> {
        if let Some(id) = default_symbol_id(s) {
            return Some(id);
        }
        self.by_str.get(s).copied()
    }

    /// Resolve an id back to its string, or `None` if it names nothing in
    /// this table (never panics).
    pub fn str(&self, id: u64) -> Option<&str> {
        if id < USER_SYMBOL_OFFSET {
            return DEFAULT_SYMBOLS.get(id as usize).copied();
        }
        let idx = (id - USER_SYMBOL_OFFSET) as usize;
        self.user.get(idx).map(|s| s.as_str())
    }

    /// User-region symbols only, as `(id, &str)` pairs.
    pub fn user_symbols(&self) -> impl Iterator<Item = (u64, &str)> {
        self.user
            .iter()
            .enumerate()
            .map(|(i, s)| (USER_SYMBOL_OFFSET + i as u64, s.as_str()))
    }

    /// True iff no user-region symbol of `self` is also a user-region symbol
    /// of `other`. Default-region symbols never conflict, since they always
    /// resolve to the same id everywhere.
    pub fn is_disjoint(&self, other: &SymbolTable) -> bool {
        self.user.iter().all(|s| !other.by_str.contains_key(s))
    }

    /// Insert every user-region symbol of `other` into `self`, in order.
    /// Symbols already present in `self` are skipped (by id, not just by
    /// string) per the "inserting excludes duplicates" contract.
    pub fn extend(&mut self, other: &SymbolTable) {
        for s in &other.user {
            self.insert(s);
        }
    }

    /// Split off a suffix view starting at symbol index `at` (within the
    /// user region), returning it as a new, owned table while `self`
    /// retains the prefix `[0, at)`.
    pub fn split_off(&mut self, at: usize) -> SymbolTable {
        let tail = self.user.split_off(at.min(self.user.len()));
        for s in &tail {
            self.by_str.remove(s);
        }
        let mut suffix = SymbolTable::new();
        for s in &tail {
            suffix.insert(s);
        }
        suffix
    }

    /// Number of user-region symbols.
    pub fn len(&self) -> usize {
        self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty()
    }
}

fn default_symbol_id(s: &str) -> Option<u64> {
    DEFAULT_SYMBOLS.iter().position(|d| *d == s).map(|i| i as u64)
}
