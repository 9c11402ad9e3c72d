//! Symbol map.
//!
//! Maps addresses to names for the basic-block trace and for error
//! context. Populated by an external loader or from a plain text file of
//! `<hex-address> <name>` lines.

use std::collections::BTreeMap;

/// An address-to-name map.
#[derive(Default)]
pub struct SymbolMap {
    symbols: BTreeMap<u32, String>,
}

impl SymbolMap {
    /// Creates an empty symbol map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a symbol at an address.
    pub fn add(&mut self, address: u32, name: impl Into<String>) {
        self.symbols.insert(address, name.into());
    }

    /// True when a symbol is registered exactly at `address`.
    pub fn contains(&self, address: u32) -> bool {
        self.symbols.contains_key(&address)
    }

    /// The symbol registered exactly at `address`, if any.
    pub fn lookup(&self, address: u32) -> Option<&str> {
        self.symbols.get(&address).map(String::as_str)
    }

    /// The nearest symbol at or below `address`, used for error context.
    pub fn find_covering(&self, address: u32) -> Option<(u32, &str)> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(addr, name)| (*addr, name.as_str()))
    }

    /// Parses symbols from `<hex-address> <name>` lines.
    ///
    /// Empty lines and lines starting with `#` are skipped; malformed
    /// lines are ignored.
    pub fn parse(&mut self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(addr), Some(name)) = (parts.next(), parts.next()) else {
                continue;
            };
            let addr = addr.trim_start_matches("0x");
            if let Ok(addr) = u32::from_str_radix(addr, 16) {
                self.add(addr, name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_covering_lookup() {
        let mut map = SymbolMap::new();
        map.add(0x100, "main");
        map.add(0x200, "loop");

        assert!(map.contains(0x100));
        assert!(!map.contains(0x104));
        assert_eq!(map.lookup(0x200), Some("loop"));
        assert_eq!(map.find_covering(0x1FC), Some((0x100, "main")));
        assert_eq!(map.find_covering(0x50), None);
    }

    #[test]
    fn parses_symbol_lines() {
        let mut map = SymbolMap::new();
        map.parse("# comment\n0x100 main\n200 loop\n\nbroken\n");
        assert_eq!(map.lookup(0x100), Some("main"));
        assert_eq!(map.lookup(0x200), Some("loop"));
    }
}
