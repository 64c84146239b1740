//! Reference counted URI interning.
//!
//! OSC 8 hyperlinks and auto-matched URIs are interned once and
//! referenced from cell attributes by id.  Every attribute table entry
//! holding a URI owns one reference; when the count drops to zero the
//! slot is reclaimed.

use std::collections::HashMap;

/// Non-owning index into the intern table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UriId(u32);

#[derive(Debug)]
struct Entry {
    uri: String,
    /// The explicit `id=` parameter of OSC 8, when given; links with
    /// equal ids highlight together.
    external_id: Option<String>,
    refs: u32,
}

#[derive(Debug, Default)]
pub struct UriTable {
    entries: Vec<Option<Entry>>,
    free: Vec<u32>,
    index: HashMap<(String, Option<String>), u32>,
}

impl UriTable {
    /// Intern the pair, returning an id holding one new reference.
    pub fn intern(&mut self, uri: &str, external_id: Option<&str>) -> UriId {
        let key = (uri.to_string(), external_id.map(str::to_string));
        if let Some(&slot) = self.index.get(&key) {
            let entry = self.entries[slot as usize].as_mut().unwrap();
            entry.refs += 1;
            return UriId(slot);
        }

        let entry = Entry {
            uri: key.0.clone(),
            external_id: key.1.clone(),
            refs: 1,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.entries[slot as usize] = Some(entry);
                slot
            }
            None => {
                self.entries.push(Some(entry));
                (self.entries.len() - 1) as u32
            }
        };
        self.index.insert(key, slot);
        UriId(slot)
    }

    /// Look up without adding a reference.
    pub fn lookup(&self, uri: &str, external_id: Option<&str>) -> Option<UriId> {
        let key = (uri.to_string(), external_id.map(str::to_string));
        self.index.get(&key).map(|&slot| UriId(slot))
    }

    pub fn incref(&mut self, id: UriId) {
        if let Some(Some(entry)) = self.entries.get_mut(id.0 as usize) {
            entry.refs += 1;
        }
    }

    pub fn decref(&mut self, id: UriId) {
        let slot = id.0 as usize;
        let dead = match self.entries.get_mut(slot) {
            Some(Some(entry)) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            _ => {
                log::warn!("unref of dead uri slot {}", slot);
                false
            }
        };
        if dead {
            let entry = self.entries[slot].take().unwrap();
            self.index.remove(&(entry.uri, entry.external_id));
            self.free.push(id.0);
        }
    }

    pub fn uri(&self, id: UriId) -> &str {
        match self.entries.get(id.0 as usize) {
            Some(Some(entry)) => &entry.uri,
            _ => "",
        }
    }

    pub fn external_id(&self, id: UriId) -> Option<&str> {
        match self.entries.get(id.0 as usize) {
            Some(Some(entry)) => entry.external_id.as_deref(),
            _ => None,
        }
    }

    pub fn refcount(&self, id: UriId) -> u32 {
        match self.entries.get(id.0 as usize) {
            Some(Some(entry)) => entry.refs,
            _ => 0,
        }
    }

    /// Number of live entries; diagnostics and tests.
    pub fn live(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    #[test]
    fn intern_and_release() {
        let mut table = UriTable::default();
        let a = table.intern("https://example.com", None);
        let b = table.intern("https://example.com", None);
        assert_eq!(a, b);
        assert_eq!(table.refcount(a), 2);
        assert_eq!(table.uri(a), "https://example.com");

        table.decref(a);
        table.decref(a);
        assert_eq!(table.live(), 0);
    }

    #[test]
    fn distinct_external_ids_are_distinct_links() {
        let mut table = UriTable::default();
        let a = table.intern("https://example.com", Some("x"));
        let b = table.intern("https://example.com", None);
        assert!(a != b);
        assert_eq!(table.external_id(a), Some("x"));
    }

    #[test]
    fn slots_are_reused() {
        let mut table = UriTable::default();
        let a = table.intern("https://one", None);
        table.decref(a);
        let b = table.intern("https://two", None);
        // Same backing slot, different content.
        assert_eq!(table.uri(b), "https://two");
        assert_eq!(table.live(), 1);
    }
}
