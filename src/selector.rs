//! Readiness selector combining the registration table, the OS wait primitive
//! and the dispatch step.

use std::io;
use std::os::fd::RawFd;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::trace;

use crate::error::Error;
use crate::event::{self, Event, EventSet};
use crate::registry::Registry;
use crate::waker::Waker;

/// Callbacks invoked by [`Selector::dispatch`].
pub trait Handler<T> {
    /// Invoked at most once per dispatch when a cross thread wakeup was
    /// captured by the preceding poll.
    fn handle_wakeup(&mut self);

    /// Invoked once per ready descriptor with its associated context and the
    /// readiness observed at poll time, already intersected with the
    /// descriptor's interest flags.
    fn handle_event(&mut self, context: &T, readable: bool, writable: bool);
}

/// Watches registered descriptors for read/write readiness.
///
/// The context `T` is caller owned; the selector stores it by value and hands
/// a snapshot back to [`Handler::handle_event`]. Use a cheap handle such as an
/// index or an `Arc` when the real per connection state lives elsewhere.
///
/// Any number of threads may call [`Selector::add`], [`Selector::update`],
/// [`Selector::remove`] and [`Selector::wakeup`] while another thread is
/// blocked in [`Selector::poll`]; the blocked call observes the change
/// promptly instead of waiting out its timeout. Exactly one thread at a time
/// should drive the `poll`/`dispatch` pair.
///
/// Readiness is level triggered: a condition is re-reported on every poll
/// cycle for as long as it holds.
///
/// # Examples
///
/// ```no_run
/// use std::os::fd::AsRawFd;
/// use std::os::unix::net::UnixStream;
/// use std::time::Duration;
/// use fdselect::selector::{Handler, Selector};
///
/// struct Ready;
///
/// impl Handler<usize> for Ready {
///     fn handle_wakeup(&mut self) {}
///     fn handle_event(&mut self, context: &usize, readable: bool, writable: bool) {
///         println!("source {context} readable={readable} writable={writable}");
///     }
/// }
///
/// let (a, _b) = UnixStream::pair().unwrap();
/// a.set_nonblocking(true).unwrap();
///
/// let selector = Selector::new().unwrap();
/// selector.add(a.as_raw_fd(), 0, true, true).unwrap();
/// selector.poll(Duration::from_secs(60)).unwrap();
/// selector.dispatch(&mut Ready);
/// ```
pub struct Selector<T> {
    registry: Registry<T>,
    waker: Waker,
    pending_wakeup: AtomicBool,
    result: Mutex<EventSet<T>>,
}

impl<T: Clone> Selector<T> {
    /// Creates an empty selector. Fails if the wakeup channel cannot be
    /// created, in which case no usable selector exists.
    pub fn new() -> io::Result<Selector<T>> {
        Ok(Self {
            registry: Registry::new(),
            waker: Waker::new()?,
            pending_wakeup: AtomicBool::new(false),
            result: Mutex::new(EventSet::default()),
        })
    }

    /// Registers a descriptor with its context and initial interest flags.
    /// The descriptor must already be in non-blocking mode. Visible to the
    /// very next poll cycle, including one currently blocked.
    pub fn add(&self, fd: RawFd, context: T, read: bool, write: bool) -> Result<(), Error> {
        self.registry.add(fd, context, read, write)?;
        trace!("added fd={fd} read={read} write={write}");
        self.waker.signal()?;
        Ok(())
    }

    /// Replaces the interest flags and context of a registered descriptor.
    pub fn update(&self, fd: RawFd, context: T, read: bool, write: bool) -> Result<(), Error> {
        self.registry.update(fd, context, read, write)?;
        trace!("updated fd={fd} read={read} write={write}");
        self.waker.signal()?;
        Ok(())
    }

    /// Unregisters a descriptor and returns its context. The descriptor is no
    /// longer watched from the next poll cycle onward; a result already
    /// captured by a completed poll still delivers its frozen snapshot.
    pub fn remove(&self, fd: RawFd) -> Result<T, Error> {
        let context = self.registry.remove(fd)?;
        trace!("removed fd={fd}");
        self.waker.signal()?;
        Ok(context)
    }

    /// Interrupts a blocked [`Selector::poll`] from any thread. Repeated
    /// calls before the next consuming dispatch collapse into a single
    /// [`Handler::handle_wakeup`] invocation.
    pub fn wakeup(&self) -> io::Result<()> {
        self.pending_wakeup.store(true, Ordering::Release);
        self.waker.signal()
    }

    /// Blocks until a registered descriptor is ready within its interest, a
    /// wakeup arrives or the timeout elapses, then stores the captured result
    /// for the next [`Selector::dispatch`].
    ///
    /// The watched set is rebuilt from the registration table at the start of
    /// every wait cycle, so a mutation made while this call is blocked takes
    /// effect within the same call. A zero timeout performs exactly one
    /// non-blocking check. Interrupted waits are retried transparently.
    pub fn poll(&self, timeout: Duration) -> io::Result<()> {
        let deadline = Instant::now().checked_add(timeout);
        let mut result = EventSet::default();
        let mut pollfds: Vec<libc::pollfd> = Vec::new();
        loop {
            pollfds.clear();
            pollfds.push(libc::pollfd {
                fd: self.waker.fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            {
                let entries = self.registry.lock();
                for (&fd, entry) in entries.iter() {
                    let events = event::interest_mask(entry.read, entry.write);
                    if events != 0 {
                        pollfds.push(libc::pollfd { fd, events, revents: 0 });
                    }
                }
            }

            let timeout_ms = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .as_millis()
                    .min(libc::c_int::MAX as u128) as libc::c_int,
                None => -1,
            };
            let num_ready = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
            if num_ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if num_ready == 0 {
                // timed out
                break;
            }

            if event::is_readable(pollfds[0].revents) {
                self.waker.drain()?;
                result.wakeup = self.pending_wakeup.swap(false, Ordering::AcqRel);
            }

            // intersect OS readiness with the current interest flags; an
            // entry removed while we were blocked is skipped
            {
                let entries = self.registry.lock();
                for pollfd in &pollfds[1..] {
                    if pollfd.revents == 0 {
                        continue;
                    }
                    if let Some(entry) = entries.get(&pollfd.fd) {
                        let readable = entry.read && event::is_readable(pollfd.revents);
                        let writable = entry.write && event::is_writable(pollfd.revents);
                        if readable || writable {
                            result.events.push(Event {
                                context: entry.context.clone(),
                                readable,
                                writable,
                            });
                        }
                    }
                }
            }

            if result.wakeup || !result.events.is_empty() {
                break;
            }

            // woken by a concurrent registration change, rebuild the watched
            // set and wait out the remaining timeout
            match deadline {
                Some(deadline) if Instant::now() >= deadline => break,
                _ => trace!("watched set changed, re-polling"),
            }
        }

        *self.result.lock().unwrap() = result;
        Ok(())
    }

    /// Consumes the result of the most recent poll: the wakeup callback first
    /// if one was captured, then one event callback per ready descriptor. No
    /// lock is held while handler code runs, so callbacks are free to call
    /// [`Selector::add`], [`Selector::update`] and [`Selector::remove`].
    pub fn dispatch<H: Handler<T>>(&self, handler: &mut H) {
        let result = std::mem::take(&mut *self.result.lock().unwrap());
        if result.wakeup {
            handler.handle_wakeup();
        }
        for event in &result.events {
            handler.handle_event(&event.context, event.readable, event.writable);
        }
    }
}
