//! Sound cache maintenance: pull new clips, then keep the directory
//! under its byte cap by deleting the oldest files.

mod evictor;
mod sync;

pub use evictor::{scan_cache, CacheEntry, CacheEvictor, EvictionReport};
pub use sync::CommandSync;
