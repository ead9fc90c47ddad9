//! Directory whitelist consulted before mutating and metadata operations.

use std::collections::HashSet;

use crate::paths;

/// Set of allowed directory prefixes.
///
/// Each registered prefix is stored trailing-slash-terminated in internal
/// form. An empty set allows everything; once any prefix is registered, a
/// candidate path is allowed only if it starts with a registered prefix and
/// contains no `..` segment.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allowed: HashSet<String>,
}

impl AccessGate {
    /// Create an unrestricted gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an allowed directory prefix. Empty input is ignored.
    pub fn register(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        self.allowed.insert(paths::add_trailing_slash(path));
    }

    /// Check whether a path is permitted.
    pub fn check(&self, path: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }

        let fixed = paths::add_trailing_slash(path);

        // Any attempt to reach a parent directory is a hard refusal.
        if fixed.contains("..") {
            return false;
        }

        self.allowed.iter().any(|prefix| fixed.starts_with(prefix))
    }

    /// True if no prefixes are registered (everything allowed).
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_gate_allows_all() {
        let gate = AccessGate::new();
        assert!(gate.check("/anything"));
        assert!(gate.check("relative/path"));
        assert!(gate.check("../even/this"));
    }

    #[test]
    fn test_prefix_match() {
        let mut gate = AccessGate::new();
        gate.register("/safe");

        assert!(gate.check("/safe/file.txt"));
        assert!(gate.check("/safe/"));
        assert!(!gate.check("/other/file.txt"));
        // Prefix match is on the slash-terminated form, so sibling
        // directories sharing a name prefix are not allowed.
        assert!(!gate.check("/safekeeping/file.txt"));
    }

    #[test]
    fn test_parent_segments_refused() {
        let mut gate = AccessGate::new();
        gate.register("/safe/");

        assert!(!gate.check("/safe/../etc"));
        assert!(!gate.check("/safe/sub/../../etc"));
    }

    #[test]
    fn test_widening_never_revokes() {
        let mut gate = AccessGate::new();
        gate.register("/safe/");
        assert!(gate.check("/safe/x"));

        gate.register("/more/");
        assert!(gate.check("/safe/x"));
        assert!(gate.check("/more/y"));
    }

    #[test]
    fn test_empty_registration_ignored() {
        let mut gate = AccessGate::new();
        gate.register("");
        assert!(gate.is_unrestricted());
    }
}
