//! Table alias allocation for one SELECT layer.
//!
//! Aliases are handed out in first-request order: the root source, then
//! every explicit join, then each navigation chain as the visitors reach
//! it. The same key always maps to the same alias, so a predicate and a
//! projector walking the same chain share one LEFT JOIN.

use tracing::trace;

/// LEFT JOIN added for a navigation chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationJoin {
    pub alias: String,
    /// Quoted table name
    pub table: String,
    /// Rendered `owner = target` key pairs
    pub on: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct AliasResolver {
    aliases: Vec<(String, String)>,
    navigations: Vec<NavigationJoin>,
}

impl AliasResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for `key`, allocating the next `tN` on first use.
    pub fn alias(&mut self, key: &str) -> String {
        if let Some(alias) = self.get(key) {
            return alias.to_string();
        }
        let alias = format!("t{}", self.aliases.len());
        trace!(key, alias = %alias, "allocated table alias");
        self.aliases.push((key.to_string(), alias.clone()));
        alias
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, a)| a.as_str())
    }

    pub fn add_navigation(&mut self, join: NavigationJoin) {
        self.navigations.push(join);
    }

    /// Navigation joins in allocation order.
    pub fn navigations(&self) -> &[NavigationJoin] {
        &self.navigations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_are_stable() {
        let mut r = AliasResolver::new();
        assert_eq!(r.alias("s0"), "t0");
        assert_eq!(r.alias("s1"), "t1");
        assert_eq!(r.alias("s0.Client"), "t2");
        assert_eq!(r.alias("s0"), "t0");
        assert_eq!(r.alias("s0.Client"), "t2");
        assert_eq!(r.get("s0.Server"), None);
    }
}
