mod entry;
mod minder;
mod null;
mod pipeline;
mod store;

pub use entry::CacheEntry;
pub use minder::CacheMinder;
pub use null::NullCache;
pub use pipeline::{spawn_cache_pipeline, PIPELINE_CAPACITY};
pub use store::SpudCache;
