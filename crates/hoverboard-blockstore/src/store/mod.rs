//! Object store implementations

mod http;
mod memory;

pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;
