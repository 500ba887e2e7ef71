use std::{marker::PhantomData, time::Duration};

use serde::Serialize;

use super::{keys::hash_args, memory::TtlCache};

/// A function wrapped with a [`TtlCache`] keyed by a hash of its arguments.
///
/// ```ignore
/// let signer = memoize(|scopes: &TokenScopes| sign(scopes), Duration::from_secs(3595));
/// let token = signer.call(&scopes);
/// ```
pub struct Memoized<A: ?Sized, V, F> {
    func: F,
    hasher: fn(&A) -> String,
    cache: TtlCache<V>,
    _args: PhantomData<fn(&A)>,
}

/// Memoize `func` for `ttl`, keying entries with [`hash_args`].
pub fn memoize<A, V, F>(func: F, ttl: Duration) -> Memoized<A, V, F>
where
    A: Serialize + ?Sized,
    V: Clone,
    F: Fn(&A) -> V,
{
    memoize_with(func, ttl, hash_args::<A>)
}

/// Memoize `func` with a custom key function. A hasher returning
/// [`NO_CACHE`](super::NO_CACHE) skips the cache for that call.
pub fn memoize_with<A, V, F>(func: F, ttl: Duration, hasher: fn(&A) -> String) -> Memoized<A, V, F>
where
    A: ?Sized,
    V: Clone,
    F: Fn(&A) -> V,
{
    Memoized {
        func,
        hasher,
        cache: TtlCache::new(ttl),
        _args: PhantomData,
    }
}

impl<A: ?Sized, V: Clone, F: Fn(&A) -> V> Memoized<A, V, F> {
    pub fn call(&self, args: &A) -> V {
        let key = (self.hasher)(args);
        self.cache.get_or_insert_with(&key, || (self.func)(args))
    }

    pub fn cache(&self) -> &TtlCache<V> {
        &self.cache
    }
}
