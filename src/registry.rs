//! Concurrency safe registration table shared between mutating threads and
//! the polling thread.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::os::fd::RawFd;
use std::sync::{Mutex, MutexGuard};

use crate::error::Error;

/// Interest flags and associated context for one registered descriptor.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub context: T,
    pub read: bool,
    pub write: bool,
}

/// Maps descriptors to their registration. The lock is held only for the
/// duration of a mutation or a watched set snapshot, never across a blocking
/// wait or a user callback.
pub(crate) struct Registry<T> {
    entries: Mutex<HashMap<RawFd, Entry<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Registry<T> {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, fd: RawFd, context: T, read: bool, write: bool) -> Result<(), Error> {
        match self.lock().entry(fd) {
            MapEntry::Occupied(_) => Err(Error::AlreadyRegistered(fd)),
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry { context, read, write });
                Ok(())
            }
        }
    }

    pub fn update(&self, fd: RawFd, context: T, read: bool, write: bool) -> Result<(), Error> {
        match self.lock().get_mut(&fd) {
            Some(entry) => {
                *entry = Entry { context, read, write };
                Ok(())
            }
            None => Err(Error::NotRegistered(fd)),
        }
    }

    /// Erases the entry and hands the context back to the caller.
    pub fn remove(&self, fd: RawFd) -> Result<T, Error> {
        self.lock()
            .remove(&fd)
            .map(|entry| entry.context)
            .ok_or(Error::NotRegistered(fd))
    }

    pub fn lock(&self) -> MutexGuard<'_, HashMap<RawFd, Entry<T>>> {
        self.entries.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_double_add() {
        let registry = Registry::new();
        registry.add(3, "a", true, false).expect("unable to add entry");
        assert!(matches!(registry.add(3, "b", true, true), Err(Error::AlreadyRegistered(3))));
        // original registration is untouched
        let entries = registry.lock();
        let entry = entries.get(&3).expect("entry missing");
        assert_eq!("a", entry.context);
        assert!(entry.read);
        assert!(!entry.write);
    }

    #[test]
    fn should_replace_flags_and_context_on_update() {
        let registry = Registry::new();
        registry.add(5, "a", true, false).expect("unable to add entry");
        registry.update(5, "b", false, true).expect("unable to update entry");

        let entries = registry.lock();
        let entry = entries.get(&5).expect("entry missing");
        assert_eq!("b", entry.context);
        assert!(!entry.read);
        assert!(entry.write);
    }

    #[test]
    fn should_reject_update_and_remove_of_unknown_descriptor() {
        let registry = Registry::<&str>::new();
        assert!(matches!(registry.update(7, "a", true, true), Err(Error::NotRegistered(7))));
        assert!(matches!(registry.remove(7), Err(Error::NotRegistered(7))));
    }

    #[test]
    fn should_return_context_on_remove() {
        let registry = Registry::new();
        registry.add(9, "ctx", true, true).expect("unable to add entry");
        assert_eq!("ctx", registry.remove(9).expect("unable to remove entry"));
        assert!(matches!(registry.remove(9), Err(Error::NotRegistered(9))));
    }
}
