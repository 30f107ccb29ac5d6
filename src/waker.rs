//! Cross thread wakeup channel used to interrupt a blocked poll.

use std::io;
use std::io::ErrorKind::{Interrupted, WouldBlock};
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Socket, Type};

/// Always connected non-blocking socket pair. The read end is part of every
/// watched set, the write end can be signalled from any thread.
pub(crate) struct Waker {
    reader: Socket,
    writer: Socket,
}

impl Waker {
    pub fn new() -> io::Result<Waker> {
        let (reader, writer) = Socket::pair(Domain::UNIX, Type::STREAM, None)?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer })
    }

    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Makes the read end readable. Signals coalesce in the socket buffer: a
    /// full buffer means a wakeup is already pending, so `WouldBlock` is not
    /// an error and the call never blocks.
    pub fn signal(&self) -> io::Result<()> {
        loop {
            return match self.writer.send(&[1u8]) {
                Ok(_) => Ok(()),
                Err(err) if err.kind() == WouldBlock => Ok(()),
                Err(err) if err.kind() == Interrupted => continue,
                Err(err) => Err(err),
            };
        }
    }

    /// Reads the channel dry and reports whether any signal was pending.
    pub fn drain(&self) -> io::Result<bool> {
        let mut buf = [MaybeUninit::<u8>::uninit(); 64];
        let mut pending = false;
        loop {
            match self.reader.recv(&mut buf) {
                Ok(0) => break,
                Ok(_) => pending = true,
                Err(err) if err.kind() == WouldBlock => break,
                Err(err) if err.kind() == Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn should_report_no_pending_signal_on_fresh_channel() {
        let waker = Waker::new().expect("unable to create waker");
        assert!(!waker.drain().expect("unable to drain waker"));
    }

    #[test]
    fn should_coalesce_signals_into_single_drain() {
        let waker = Waker::new().expect("unable to create waker");
        waker.signal().expect("unable to signal waker");
        waker.signal().expect("unable to signal waker");
        waker.signal().expect("unable to signal waker");
        assert!(waker.drain().expect("unable to drain waker"));
        assert!(!waker.drain().expect("unable to drain waker"));
    }

    #[test]
    fn should_never_block_when_buffer_is_full() {
        let waker = Waker::new().expect("unable to create waker");
        // far beyond any socket buffer capacity
        for _ in 0..1_000_000 {
            waker.signal().expect("unable to signal waker");
        }
        assert!(waker.drain().expect("unable to drain waker"));
        assert!(!waker.drain().expect("unable to drain waker"));
    }

    #[test]
    fn should_signal_from_another_thread() {
        let waker = Waker::new().expect("unable to create waker");
        thread::scope(|scope| {
            scope.spawn(|| waker.signal().expect("unable to signal waker"));
        });
        thread::sleep(Duration::from_millis(1));
        assert!(waker.drain().expect("unable to drain waker"));
    }
}
