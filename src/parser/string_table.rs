use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Interned name from the profile string table.
///
/// Two symbols are equal exactly when their text is equal, so index keys
/// can compare symbols instead of strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The profile's string table.
///
/// The raw bytes are kept as read from disk; every resolved name is a
/// slice of that buffer.
#[derive(Debug, Clone, Default)]
pub struct StringTable {
    data: Bytes,
    symbols: Vec<Bytes>,
    by_text: HashMap<Bytes, Symbol>,
    by_offset: HashMap<u32, Symbol>,
}

impl StringTable {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            symbols: Vec::new(),
            by_text: HashMap::new(),
            by_offset: HashMap::new(),
        }
    }

    /// Size of the raw table in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of distinct names resolved so far
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Resolve the NUL-terminated name starting at `offset`
    pub fn resolve(&mut self, offset: u32) -> Result<Symbol> {
        if let Some(&symbol) = self.by_offset.get(&offset) {
            return Ok(symbol);
        }

        let start = offset as usize;
        if start >= self.data.len() {
            return Err(Error::FormatError(format!(
                "string offset {} is outside the string table ({} bytes)",
                offset,
                self.data.len()
            )));
        }
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                Error::FormatError(format!("string at offset {} is not NUL-terminated", offset))
            })?;
        let text = self.data.slice(start..start + len);
        std::str::from_utf8(&text).map_err(|e| {
            Error::FormatError(format!("string at offset {} is not valid UTF-8: {}", offset, e))
        })?;

        let symbol = match self.by_text.get(&text) {
            Some(&symbol) => symbol,
            None => {
                let symbol = Symbol(self.symbols.len() as u32);
                self.symbols.push(text.clone());
                self.by_text.insert(text, symbol);
                symbol
            }
        };
        self.by_offset.insert(offset, symbol);
        Ok(symbol)
    }

    /// Find the symbol for a name; `None` if the profile never mentions it
    pub fn lookup(&self, text: &str) -> Option<Symbol> {
        self.by_text.get(text.as_bytes()).copied()
    }

    /// Text of a resolved symbol
    pub fn text(&self, symbol: Symbol) -> &str {
        self.symbols
            .get(symbol.index())
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or("")
    }
}
