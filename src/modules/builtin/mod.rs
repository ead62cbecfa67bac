//! Modules that ship with the server.

pub mod event_queue;
pub mod region_info;

pub use event_queue::{EventQueue, EventQueueModule};
pub use region_info::RegionInfoModule;
