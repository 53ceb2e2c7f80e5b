//! # Reader-Writer Lock
//!
//! Many concurrent readers or one exclusive writer. Reader/writer
//! priority is whatever the backing implementation provides; callers
//! must not rely on either.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A reader-writer lock guarding a region of code rather than a value.
pub struct ReaderWriterLock {
    inner: RwLock<()>,
}

/// Shared (reader) ownership; leaves the lock on drop.
pub struct ReaderGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
}

/// Exclusive (writer) ownership; leaves the lock on drop.
pub struct WriterGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl ReaderWriterLock {
    /// Creates a new, unowned lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
        }
    }

    /// Acquires shared access, blocking while a writer is inside.
    #[must_use]
    pub fn enter_reader(&self) -> ReaderGuard<'_> {
        ReaderGuard {
            _guard: self.inner.read(),
        }
    }

    /// Acquires exclusive access, blocking while anyone is inside.
    #[must_use]
    pub fn enter_writer(&self) -> WriterGuard<'_> {
        WriterGuard {
            _guard: self.inner.write(),
        }
    }

    /// Attempts shared access without blocking.
    #[must_use]
    pub fn try_enter_reader(&self) -> Option<ReaderGuard<'_>> {
        self.inner.try_read().map(|guard| ReaderGuard { _guard: guard })
    }

    /// Attempts exclusive access without blocking.
    #[must_use]
    pub fn try_enter_writer(&self) -> Option<WriterGuard<'_>> {
        self.inner.try_write().map(|guard| WriterGuard { _guard: guard })
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}
