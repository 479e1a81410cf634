//! Keyed query store with per-key request coalescing.
//!
//! Each cache is an explicit value: construct one per process (or per test),
//! clone the handle freely. At most one fetch per key is in flight at any
//! time; every fetch carries the generation of the entry it was issued for,
//! and a result whose generation no longer matches is dropped.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use crate::error::DexloanError;

pub type SharedError = Arc<DexloanError>;

type InFlight<V> = Shared<BoxFuture<'static, Result<V, SharedError>>>;

#[derive(Clone, Debug)]
pub enum QueryState<V> {
    /// Never requested, or disabled for lack of a scope
    Idle,
    Loading,
    Success(V),
    Error(SharedError),
}

impl<V> QueryState<V> {
    pub fn is_idle(&self) -> bool {
        matches!(self, QueryState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn data(&self) -> Option<&V> {
        match self {
            QueryState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DexloanError> {
        match self {
            QueryState::Error(err) => Some(err),
            _ => None,
        }
    }
}

struct Entry<V> {
    state: QueryState<V>,
    stale: bool,
    generation: u64,
    in_flight: Option<InFlight<V>>,
}

struct Store<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_generation: u64,
}

enum Begin<V> {
    /// Settled and not stale; nothing to do
    Settled(Result<V, SharedError>),
    /// Another caller's fetch is running
    Joined(u64, InFlight<V>),
    Started(u64, InFlight<V>),
}

pub struct QueryCache<K, V> {
    store: Arc<Mutex<Store<K, V>>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V> Default for QueryCache<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    pub fn get(&self, key: &K) -> QueryState<V> {
        self.store
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.state.clone())
            .unwrap_or(QueryState::Idle)
    }

    /// True while a fetch for `key` is running, including a refetch behind a
    /// settled value
    pub fn is_fetching(&self, key: &K) -> bool {
        self.store
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Returns the current state right away and fetches in the background
    /// when the entry is missing or stale.
    ///
    /// A stale value stays readable while its refetch runs. A settled error
    /// is not retried until the key is invalidated. Outside a tokio runtime
    /// nothing is fetched and the stored state is returned as is.
    pub fn query<F, Fut>(&self, key: K, fetcher: F) -> QueryState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, DexloanError>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(?key, "query outside a tokio runtime, not fetching");
            return self.get(&key);
        };

        match self.begin(&key, fetcher) {
            Begin::Settled(Ok(value)) => QueryState::Success(value),
            Begin::Settled(Err(err)) => QueryState::Error(err),
            Begin::Joined(generation, in_flight) | Begin::Started(generation, in_flight) => {
                let current = self.get(&key);
                let cache = self.clone();
                runtime.spawn(async move {
                    let result = in_flight.await;
                    cache.complete(&key, generation, result);
                });
                current
            }
        }
    }

    /// Like [`QueryCache::query`] but waits for the (possibly shared) result.
    pub async fn fetch<F, Fut>(&self, key: K, fetcher: F) -> Result<V, SharedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, DexloanError>> + Send + 'static,
    {
        match self.begin(&key, fetcher) {
            Begin::Settled(result) => result,
            Begin::Joined(generation, in_flight) | Begin::Started(generation, in_flight) => {
                let result = in_flight.await;
                self.complete(&key, generation, result.clone());
                result
            }
        }
    }

    /// Invalidates then queries, for a user-triggered retry
    pub fn refetch<F, Fut>(&self, key: K, fetcher: F) -> QueryState<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, DexloanError>> + Send + 'static,
    {
        self.invalidate(&key);
        self.query(key, fetcher)
    }

    /// Applies `transform` to a settled value without refetching. Returns
    /// false when there is no settled value for `key`.
    ///
    /// A fetch running at the time is disowned and the entry marked stale,
    /// whether or not a value was rewritten, so data read before the write
    /// can never land in the entry.
    pub fn mutate<T>(&self, key: &K, transform: T) -> bool
    where
        T: FnOnce(&V) -> V,
    {
        let mut guard = self.store.lock();
        let store = &mut *guard;

        let Some(entry) = store.entries.get_mut(key) else {
            debug!(?key, "mutate on missing entry");
            return false;
        };

        let mutated = if let QueryState::Success(value) = &entry.state {
            let updated = transform(value);
            entry.state = QueryState::Success(updated);
            true
        } else {
            debug!(?key, "mutate on unsettled entry");
            false
        };

        if entry.in_flight.take().is_some() {
            entry.generation = store.next_generation;
            store.next_generation += 1;
            entry.stale = true;
            debug!(?key, generation = entry.generation, "running fetch disowned");
        }

        mutated
    }

    /// Marks the entry stale so the next read fetches again
    pub fn invalidate(&self, key: &K) {
        if let Some(entry) = self.store.lock().entries.get_mut(key) {
            entry.stale = true;
        }
    }

    pub fn invalidate_where<P>(&self, predicate: P)
    where
        P: Fn(&K) -> bool,
    {
        for (key, entry) in self.store.lock().entries.iter_mut() {
            if predicate(key) {
                entry.stale = true;
            }
        }
    }

    pub fn invalidate_all(&self) {
        self.invalidate_where(|_| true);
    }

    /// Evicts the entry. A fetch still running for it is discarded on arrival.
    pub fn remove(&self, key: &K) {
        self.store.lock().entries.remove(key);
    }

    pub fn clear(&self) {
        self.store.lock().entries.clear();
    }

    fn begin<F, Fut>(&self, key: &K, fetcher: F) -> Begin<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, DexloanError>> + Send + 'static,
    {
        let mut guard = self.store.lock();
        let store = &mut *guard;

        let entry = store.entries.entry(key.clone()).or_insert_with(|| Entry {
            state: QueryState::Idle,
            stale: false,
            generation: 0,
            in_flight: None,
        });

        if let Some(in_flight) = &entry.in_flight {
            return Begin::Joined(entry.generation, in_flight.clone());
        }

        if !entry.stale {
            match &entry.state {
                QueryState::Success(value) => return Begin::Settled(Ok(value.clone())),
                QueryState::Error(err) => return Begin::Settled(Err(Arc::clone(err))),
                QueryState::Idle | QueryState::Loading => {}
            }
        }

        let in_flight = fetcher().map(|result| result.map_err(Arc::new)).boxed().shared();

        entry.generation = store.next_generation;
        store.next_generation += 1;
        entry.in_flight = Some(in_flight.clone());
        if !matches!(entry.state, QueryState::Success(_)) {
            entry.state = QueryState::Loading;
        }

        debug!(?key, generation = entry.generation, "fetch started");

        Begin::Started(entry.generation, in_flight)
    }

    fn complete(&self, key: &K, generation: u64, result: Result<V, SharedError>) {
        let mut store = self.store.lock();

        match store.entries.get_mut(key) {
            Some(entry) if entry.generation == generation && entry.in_flight.is_some() => {
                entry.in_flight = None;
                entry.stale = false;
                entry.state = match result {
                    Ok(value) => QueryState::Success(value),
                    Err(err) => {
                        warn!(?key, error = %err, "query failed");
                        QueryState::Error(err)
                    }
                };
            }
            _ => debug!(?key, generation, "discarding result for replaced entry"),
        }
    }
}
