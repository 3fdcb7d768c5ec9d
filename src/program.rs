use std::sync::{Arc, RwLock};

/// The shared, append-only instruction buffer (SPEC_FULL §3/§5). Addresses
/// are absolute byte offsets and remain stable once appended. Modeled as
/// `Arc<RwLock<Vec<u8>>>`: the compiler takes the write guard for an entire
/// emission so other threads' program counters never observe a partial
/// instruction; the scheduler takes a read guard per tick.
#[derive(Clone)]
pub struct ProgramStore {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl ProgramStore {
    pub fn new() -> ProgramStore {
        ProgramStore {
            bytes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Begin an emission: callers hold the returned guard for the whole
    /// compile, appending bytes as the linearizer walks the intermediate
    /// tree, and return the start address of the appended region.
    pub fn writer(&self) -> ProgramWriter<'_> {
        ProgramWriter {
            guard: self.bytes.write().unwrap(),
        }
    }

    pub fn read_bytes(&self, addr: usize, len: usize) -> Vec<u8> {
        let guard = self.bytes.read().unwrap();
        guard[addr..addr + len].to_vec()
    }

    pub fn read_byte(&self, addr: usize) -> u8 {
        self.bytes.read().unwrap()[addr]
    }

    /// Read a NUL-terminated label starting at `addr`, returning the decoded
    /// string and the address just past the terminator.
    pub fn read_label(&self, addr: usize) -> (String, usize) {
        let guard = self.bytes.read().unwrap();
        let mut end = addr;
        while guard[end] != 0 {
            end += 1;
        }
        let s = String::from_utf8_lossy(&guard[addr..end]).into_owned();
        (s, end + 1)
    }
}

impl Default for ProgramStore {
    fn default() -> Self {
        ProgramStore::new()
    }
}

pub struct ProgramWriter<'a> {
    guard: std::sync::RwLockWriteGuard<'a, Vec<u8>>,
}

impl<'a> ProgramWriter<'a> {
    pub fn position(&self) -> usize {
        self.guard.len()
    }

    pub fn emit_byte(&mut self, b: u8) {
        self.guard.push(b);
    }

    pub fn emit_addr(&mut self, addr: u32) {
        self.guard.extend_from_slice(&addr.to_be_bytes());
    }

    pub fn emit_label(&mut self, label: &str) {
        self.guard.extend_from_slice(label.as_bytes());
        self.guard.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_stable_and_readable() {
        let store = ProgramStore::new();
        {
            let mut w = store.writer();
            w.emit_byte(1);
            w.emit_addr(0xdead_beef);
            w.emit_label("x");
        }
        assert_eq!(store.len(), 1 + 4 + 2);
        assert_eq!(store.read_byte(0), 1);
        assert_eq!(store.read_bytes(1, 4), vec![0xde, 0xad, 0xbe, 0xef]);
        let (label, next) = store.read_label(5);
        assert_eq!(label, "x");
        assert_eq!(next, 7);
    }
}
