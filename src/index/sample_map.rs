use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{InlineStack, RecordId};
use crate::parser::string_table::{StringTable, Symbol};

/// Key shape of a sample index
pub trait SampleKey: Hash + Eq {
    /// Human-readable form of the key, used when reporting duplicates
    fn describe(&self, strings: &StringTable) -> String;
}

/// Key of the flat index: (file, function, line)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlatKey {
    pub filename: Symbol,
    pub func_name: Symbol,
    pub line: u32,
}

impl SampleKey for FlatKey {
    fn describe(&self, strings: &StringTable) -> String {
        format!(
            "{}:{} func_name:{}",
            strings.text(self.filename),
            self.line,
            strings.text(self.func_name)
        )
    }
}

/// Key of the inline index: full call stack plus the leaf (file, function, line).
///
/// Stacks compare frame by frame, so the same source line reached through
/// different inlining contexts gives distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InlineKey {
    pub stack: InlineStack,
    pub filename: Symbol,
    pub func_name: Symbol,
    pub line: u32,
}

impl SampleKey for InlineKey {
    fn describe(&self, strings: &StringTable) -> String {
        let frames = self
            .stack
            .iter()
            .map(|frame| format!("{}:{}", strings.text(frame.file), frame.line))
            .collect::<Vec<_>>()
            .join(" <- ");
        format!(
            "{}:{} func_name:{} stack:[{}]",
            strings.text(self.filename),
            self.line,
            strings.text(self.func_name),
            frames
        )
    }
}

/// Occupancy statistics of a sample map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStatistics {
    pub entries: usize,
    pub duplicates_rejected: usize,
}

/// Insert-if-absent map from a sample key to a record in the store's arena
#[derive(Debug, Clone)]
pub struct SampleMap<K> {
    entries: HashMap<K, RecordId>,
    duplicates_rejected: usize,
}

impl<K: SampleKey> Default for SampleMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: SampleKey> SampleMap<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            duplicates_rejected: 0,
        }
    }

    /// Insert `key` unless it is already present.
    ///
    /// Returns the record already holding the key when the insert is rejected.
    pub fn insert_if_absent(&mut self, key: K, id: RecordId) -> Result<(), RecordId> {
        match self.entries.get(&key) {
            Some(&existing) => {
                self.duplicates_rejected += 1;
                Err(existing)
            }
            None => {
                self.entries.insert(key, id);
                Ok(())
            }
        }
    }

    /// Exact-match lookup
    pub fn get(&self, key: &K) -> Option<RecordId> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> MapStatistics {
        MapStatistics {
            entries: self.entries.len(),
            duplicates_rejected: self.duplicates_rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_first_insert_wins() {
        let mut strings = StringTable::new(Bytes::from_static(b"a.c\0f\0"));
        let file = strings.resolve(0).unwrap();
        let func = strings.resolve(4).unwrap();
        let key = FlatKey { filename: file, func_name: func, line: 3 };

        let mut map = SampleMap::new();
        assert_eq!(map.insert_if_absent(key.clone(), 0), Ok(()));
        assert_eq!(map.insert_if_absent(key.clone(), 1), Err(0));
        assert_eq!(map.get(&key), Some(0));
        assert_eq!(
            map.statistics(),
            MapStatistics { entries: 1, duplicates_rejected: 1 }
        );
        assert_eq!(key.describe(&strings), "a.c:3 func_name:f");
    }
}
