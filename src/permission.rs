use crate::type_key::TypeKey;

/// Declared resource access of a task: the types it reads and the types it
/// writes. A write subsumes a read of the same type, so the two sets never
/// overlap. Kept sorted for deterministic iteration.
#[derive(Clone, Debug, Default)]
pub struct Permission {
    reads: Vec<TypeKey>,
    writes: Vec<TypeKey>,
}

impl Permission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read<T: 'static>(&mut self) {
        self.insert_read(TypeKey::of::<T>());
    }

    pub fn add_write<T: 'static>(&mut self) {
        self.insert_write(TypeKey::of::<T>());
    }

    pub fn insert_read(&mut self, key: TypeKey) {
        if self.writes.binary_search(&key).is_ok() {
            return;
        }
        if let Err(index) = self.reads.binary_search(&key) {
            self.reads.insert(index, key);
        }
    }

    pub fn insert_write(&mut self, key: TypeKey) {
        if let Ok(index) = self.reads.binary_search(&key) {
            self.reads.remove(index);
        }
        if let Err(index) = self.writes.binary_search(&key) {
            self.writes.insert(index, key);
        }
    }

    /// Would a write of `key` have to wait for this permission's holder?
    pub fn conflicts_write(&self, key: TypeKey) -> bool {
        self.reads.binary_search(&key).is_ok() || self.writes.binary_search(&key).is_ok()
    }

    /// Would a read of `key` have to wait for this permission's holder?
    pub fn conflicts_read(&self, key: TypeKey) -> bool {
        self.writes.binary_search(&key).is_ok()
    }

    pub fn reads(&self) -> &[TypeKey] {
        &self.reads
    }

    pub fn writes(&self) -> &[TypeKey] {
        &self.writes
    }
}
