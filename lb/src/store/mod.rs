//! Stores layered over the coordination store

mod queue;
mod requests;
mod services;
pub(crate) mod version;

pub use queue::RequestQueue;
pub use requests::RequestRecordStore;
pub use services::{ServiceStateStore, UpdateOutcome};
