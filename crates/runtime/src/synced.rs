/// A value mirrored to the other side of the bridge.
///
/// Writes only mark the value dirty. The change becomes visible to observers
/// when [`Synced::notify`] bumps the version, so several writes in a row
/// coalesce into a single resync.
#[derive(Debug, Clone, Default)]
pub struct Synced<T> {
    value: T,
    version: u64,
    dirty: bool,
}

impl<T> Synced<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            version: 0,
            dirty: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn edit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        self.dirty = true;
        f(&mut self.value)
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    /// Marks the value dirty without changing it, forcing observers to
    /// re-read on the next notify.
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Publishes pending writes. Returns true if the version moved.
    pub fn notify(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;
        self.version += 1;
        true
    }
}

impl<T: PartialEq> Synced<T> {
    /// Writes `value` only if it differs from the current one.
    pub fn set_if_changed(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.set(value);
        true
    }
}
