pub mod error;
mod event;
mod registry;
pub mod selector;
mod waker;
