//! Cache façade used transparently inside the catalog store.
//!
//! Two entry classes exist, addressed by [`CacheKey`]:
//!
//! - `component:{name}:{version}` holds an exact version. Published versions
//!   are immutable, so these use the long TTL.
//! - `latest:{name}` holds the current latest version. New versions can
//!   appear at any time, so these use the short TTL and are invalidated on
//!   every write to that name.
//!
//! Writes never populate the cache; reads populate it on miss.

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod noop;
pub mod traits;

pub use key::{CacheEntryClass, CacheKey};
pub use lmdb_backend::{LmdbCache, LmdbCacheError};
pub use memory::InMemoryCache;
pub use noop::NoopCache;
pub use traits::{CacheStats, ComponentCache};
