//! Deduplicated string and type pools.
//!
//! Both map an already-written value to its image offset. The maps iterate
//! in insertion order, which keeps output byte-identical between runs.

use gir_typelib::format::align;
use indexmap::IndexMap;
use log::debug;

/// NUL-terminated, 4-aligned strings, written once each.
#[derive(Debug, Default)]
pub struct StringPool {
    offsets: IndexMap<String, u32>,
    writes: u64,
    bytes: u64,
}

impl StringPool {
    pub fn new() -> StringPool {
        StringPool::default()
    }

    /// Return the offset of `text`, appending it at `*offset2` when unseen.
    pub fn write(&mut self, data: &mut [u8], offset2: &mut u32, text: &str) -> u32 {
        self.writes += 1;
        if let Some(&existing) = self.offsets.get(text) {
            return existing;
        }
        self.bytes += text.len() as u64 + 1;

        let start = *offset2;
        let bytes = text.as_bytes();
        let end = start as usize + bytes.len();
        data[start as usize..end].copy_from_slice(bytes);
        data[end] = 0;
        *offset2 = align(start + bytes.len() as u32 + 1, 4);

        self.offsets.insert(text.to_string(), start);
        start
    }

    pub fn log_stats(&self) {
        debug!(
            "string pool: {} writes, {} unique ({} bytes)",
            self.writes,
            self.offsets.len(),
            self.bytes
        );
    }
}

/// Pool of nested type descriptors keyed by canonical text.
#[derive(Debug, Default)]
pub struct TypePool {
    offsets: IndexMap<String, u32>,
    lookups: u64,
}

impl TypePool {
    pub fn new() -> TypePool {
        TypePool::default()
    }

    pub fn get(&mut self, key: &str) -> Option<u32> {
        self.lookups += 1;
        self.offsets.get(key).copied()
    }

    pub fn insert(&mut self, key: String, offset: u32) {
        self.offsets.insert(key, offset);
    }

    pub fn log_stats(&self) {
        debug!(
            "type pool: {} lookups, {} unique descriptors",
            self.lookups,
            self.offsets.len()
        );
    }
}
