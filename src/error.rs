use std::io;
use std::io::ErrorKind::Other;
use std::os::fd::RawFd;
use thiserror::Error;

/// Errors reported by selector operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("descriptor {0} is already registered")]
    AlreadyRegistered(RawFd),
    #[error("descriptor {0} is not registered")]
    NotRegistered(RawFd),
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        io::Error::new(Other, value)
    }
}
