//! Deterministic cache keys
//!
//! A key is `<scope>:<hash>` where the hash is FNV-1a over a canonical
//! `name=value` listing of every input. The readable scope (e.g.
//! `goal:123`) lets callers invalidate by substring.

use std::fmt::Display;

fn fnv1a64(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut h = FNV_OFFSET;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Accumulates named inputs and renders the cache key
#[derive(Debug, Clone)]
pub struct Fingerprint {
    scope: String,
    canonical: String,
}

impl Fingerprint {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            canonical: String::new(),
        }
    }

    /// Add an input; order matters
    pub fn field(mut self, name: &str, value: impl Display) -> Self {
        if !self.canonical.is_empty() {
            self.canonical.push('|');
        }
        self.canonical.push_str(name);
        self.canonical.push('=');
        self.canonical.push_str(&value.to_string());
        self
    }

    /// Canonical listing the hash is computed over
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn key(&self) -> String {
        format!("{}:{:016x}", self.scope, fnv1a64(&self.canonical))
    }
}
