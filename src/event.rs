//! Readiness event types and `poll(2)` flag mapping.

use smallvec::SmallVec;

/// Maps interest flags to the event mask handed to the OS. A descriptor with
/// neither flag set yields an empty mask and is left out of the watched set.
pub(crate) fn interest_mask(read: bool, write: bool) -> libc::c_short {
    let mut events = 0;
    if read {
        events |= libc::POLLIN;
    }
    if write {
        events |= libc::POLLOUT;
    }
    events
}

/// Error, hangup and invalid descriptor conditions surface as read readiness
/// so the owner observes them on the next non-blocking read.
pub(crate) fn is_readable(revents: libc::c_short) -> bool {
    revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
}

pub(crate) fn is_writable(revents: libc::c_short) -> bool {
    revents & (libc::POLLOUT | libc::POLLERR) != 0
}

/// Single readiness notification captured for one registered descriptor.
#[derive(Debug, Clone)]
pub(crate) struct Event<T> {
    pub context: T,
    pub readable: bool,
    pub writable: bool,
}

/// Snapshot produced by one poll cycle. Valid until the next poll and
/// consumed by the next dispatch.
#[derive(Debug)]
pub(crate) struct EventSet<T> {
    pub wakeup: bool,
    pub events: SmallVec<[Event<T>; 16]>,
}

impl<T> Default for EventSet<T> {
    fn default() -> Self {
        Self {
            wakeup: false,
            events: SmallVec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_interest_to_event_mask() {
        assert_eq!(0, interest_mask(false, false));
        assert_eq!(libc::POLLIN, interest_mask(true, false));
        assert_eq!(libc::POLLOUT, interest_mask(false, true));
        assert_eq!(libc::POLLIN | libc::POLLOUT, interest_mask(true, true));
    }

    #[test]
    fn should_treat_error_conditions_as_readiness() {
        assert!(is_readable(libc::POLLIN));
        assert!(is_readable(libc::POLLHUP));
        assert!(is_readable(libc::POLLERR));
        assert!(is_readable(libc::POLLNVAL));
        assert!(!is_readable(libc::POLLOUT));

        assert!(is_writable(libc::POLLOUT));
        assert!(is_writable(libc::POLLERR));
        assert!(!is_writable(libc::POLLIN | libc::POLLHUP));
    }
}
