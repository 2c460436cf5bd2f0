//! Session history of completed searches.

pub mod store;

pub use store::{HistoryEntry, SessionStore, DEFAULT_CAPACITY};
