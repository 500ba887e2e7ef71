//! Bounded-time memoization.
//!
//! Used to reuse authenticated directory handles for the lifetime of their
//! token instead of signing a new one per request.

mod keys;
mod memo;
mod memory;

pub use keys::{CacheKeys, NO_CACHE, hash_args};
pub use memo::{Memoized, memoize, memoize_with};
pub use memory::TtlCache;
