//! Per-channel note name to MIDI key bindings.

use std::collections::BTreeMap;

/// Maps `(channel, note)` to a MIDI key. An existing binding is never overwritten.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    keys: BTreeMap<(u8, char), u8>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: u8, note: char) -> Option<u8> {
        self.keys.get(&(channel, note)).copied()
    }

    /// Bind `note` to `key` on `channel`. Returns false if the pair is already bound.
    pub fn set(&mut self, channel: u8, note: char, key: u8) -> bool {
        if self.keys.contains_key(&(channel, note)) {
            return false;
        }
        self.keys.insert((channel, note), key);
        true
    }

    /// Visit every binding, ordered by channel and then note name.
    pub fn range(&self, mut f: impl FnMut(u8, char, u8)) {
        for (&(channel, note), &key) in &self.keys {
            f(channel, note, key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut keymap = KeyMap::new();
        assert!(keymap.set(0, 'c', 60));
        assert_eq!(keymap.get(0, 'c'), Some(60));
        assert_eq!(keymap.get(1, 'c'), None);
        assert_eq!(keymap.get(0, 'd'), None);
    }

    #[test]
    fn test_set_never_overwrites() {
        let mut keymap = KeyMap::new();
        assert!(keymap.set(0, 'c', 60));
        assert!(!keymap.set(0, 'c', 61));
        assert_eq!(keymap.get(0, 'c'), Some(60));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut keymap = KeyMap::new();
        assert!(keymap.set(0, 'c', 60));
        assert!(keymap.set(9, 'c', 36));
        assert_eq!(keymap.get(9, 'c'), Some(36));
        assert_eq!(keymap.len(), 2);
    }

    #[test]
    fn test_range_is_ordered() {
        let mut keymap = KeyMap::new();
        keymap.set(1, 'a', 1);
        keymap.set(0, 'b', 2);
        keymap.set(0, 'a', 3);

        let mut seen = Vec::new();
        keymap.range(|ch, note, key| seen.push((ch, note, key)));
        assert_eq!(seen, vec![(0, 'a', 3), (0, 'b', 2), (1, 'a', 1)]);
    }
}
