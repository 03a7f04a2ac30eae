//! Observable value cells and derived computations.
//!
//! [`ValueCell`] is a mutable observable holding one value and a list of
//! subscribers. Subscribing replays the current value immediately and returns
//! a [`Disposer`]; `set` notifies every registered subscriber synchronously,
//! in subscription order, with no deduplication.
//!
//! [`DerivedCell`] recomputes a read-only value from one or more source cells
//! through a pure closure, with two composable modifiers: **distinct**
//! (suppress notification when the recomputed value equals the previous one)
//! and **debounce** (coalesce bursts of source notifications into a single
//! trailing-edge recomputation on a deferred timer).
//!
//! Cleanup is by explicit ownership: every `subscribe` returns a [`Disposer`]
//! and every derived cell has a [`DerivedCell::teardown`]; the owning
//! component collects disposers and invokes them on its own teardown. There
//! is no automatic reclamation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Removes a subscriber when invoked. Dropping a disposer without calling
/// [`Disposer::dispose`] leaves the subscriber registered.
pub struct Disposer(Option<Box<dyn FnOnce() + Send>>);

impl Disposer {
    fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Disposer(Some(Box::new(f)))
    }

    /// Unregister the associated subscriber.
    pub fn dispose(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

struct Shared<T> {
    value: Mutex<T>,
    subs: Mutex<Subscribers<T>>,
    /// Optional two-way projection into an external record. Established at
    /// construction, immutable afterwards.
    writeback: Option<Box<dyn Fn(&T) + Send + Sync>>,
}

/// A mutable observable holding one value.
pub struct ValueCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self {
        ValueCell {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> ValueCell<T> {
    pub fn new(initial: T) -> Self {
        Self::build(initial, None)
    }

    /// A cell bound to an external record: every `set` also invokes `write`
    /// with the new value. The initial value is taken as already present in
    /// the record, so `write` is not called at construction.
    pub fn bound(initial: T, write: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self::build(initial, Some(Box::new(write)))
    }

    fn build(initial: T, writeback: Option<Box<dyn Fn(&T) + Send + Sync>>) -> Self {
        ValueCell {
            shared: Arc::new(Shared {
                value: Mutex::new(initial),
                subs: Mutex::new(Subscribers {
                    next_id: 0,
                    entries: Vec::new(),
                }),
                writeback,
            }),
        }
    }

    /// Current value, by clone.
    pub fn get(&self) -> T {
        self.shared.value.lock().unwrap().clone()
    }

    /// Store a new value and synchronously notify every registered
    /// subscriber in subscription order.
    pub fn set(&self, value: T) {
        {
            let mut v = self.shared.value.lock().unwrap();
            *v = value.clone();
        }
        if let Some(write) = &self.shared.writeback {
            write(&value);
        }
        self.notify(&value);
    }

    /// Register `f` and immediately invoke it with the current value.
    pub fn subscribe(&self, f: impl FnMut(&T) + Send + 'static) -> Disposer {
        let (id, disposer) = self.register(Box::new(f));
        let current = self.get();
        self.invoke_one(id, &current);
        disposer
    }

    /// Register without the replay-on-subscribe call. Used by derived cells,
    /// which compute their initial value themselves.
    pub(crate) fn subscribe_silent(&self, f: impl FnMut(&T) + Send + 'static) -> Disposer {
        self.register(Box::new(f)).1
    }

    fn register(&self, f: Callback<T>) -> (u64, Disposer) {
        let id = {
            let mut subs = self.shared.subs.lock().unwrap();
            let id = subs.next_id;
            subs.next_id += 1;
            subs.entries.push((id, f));
            id
        };
        let shared = Arc::clone(&self.shared);
        let disposer = Disposer::new(move || {
            let mut subs = shared.subs.lock().unwrap();
            subs.entries.retain(|(eid, _)| *eid != id);
        });
        (id, disposer)
    }

    /// Deliver `value` to all subscribers registered at the start of the
    /// pass. Callbacks run outside the subscriber lock, so a callback may
    /// subscribe, dispose, or set cells (including this one) re-entrantly;
    /// subscribers added mid-pass are not visited until the next `set`.
    /// A callback that sets its own cell does not receive that nested
    /// notification itself (it is swapped out while it runs); the other
    /// subscribers do.
    fn notify(&self, value: &T) {
        let ids: Vec<u64> = {
            let subs = self.shared.subs.lock().unwrap();
            subs.entries.iter().map(|(id, _)| *id).collect()
        };
        for id in ids {
            self.invoke_one(id, value);
        }
    }

    fn invoke_one(&self, id: u64, value: &T) {
        // Take the callback out while it runs so the lock is not held across
        // user code, then put it back unless it was disposed meanwhile.
        let taken = {
            let mut subs = self.shared.subs.lock().unwrap();
            subs.entries
                .iter_mut()
                .find(|(eid, _)| *eid == id)
                .map(|entry| std::mem::replace(&mut entry.1, Box::new(|_| {})))
        };
        let Some(mut cb) = taken else { return };
        cb(value);
        let mut subs = self.shared.subs.lock().unwrap();
        if let Some(entry) = subs.entries.iter_mut().find(|(eid, _)| *eid == id) {
            entry.1 = cb;
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.shared.subs.lock().unwrap().entries.len()
    }
}

/// Type-erased "something changed" hook, the seam between a derived cell and
/// its sources. Implemented by [`ValueCell`] for any value type.
pub trait Observe: Send + Sync {
    /// Register a change hook (no replay). Fired after every `set`.
    fn watch(&self, hook: Arc<dyn Fn() + Send + Sync>) -> Disposer;
}

impl<T: Clone + Send + 'static> Observe for ValueCell<T> {
    fn watch(&self, hook: Arc<dyn Fn() + Send + Sync>) -> Disposer {
        self.subscribe_silent(move |_| hook())
    }
}

/// Modifiers for [`DerivedCell`]. Defaults match the common case: distinct
/// suppression on, no debounce.
#[derive(Clone, Copy, Debug)]
pub struct DeriveOptions {
    /// Skip notifying downstream when the recomputed value equals the
    /// previous output.
    pub distinct: bool,
    /// Coalesce source notifications arriving within the window into a
    /// single trailing-edge recomputation using the latest inputs.
    pub debounce: Option<Duration>,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        DeriveOptions {
            distinct: true,
            debounce: None,
        }
    }
}

struct DerivedInner<T> {
    out: ValueCell<T>,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    last: Mutex<T>,
    opts: DeriveOptions,
    /// Bumped on every source notification; a debounce timer only fires if
    /// its generation is still current when it wakes.
    generation: AtomicU64,
    pending: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T: Clone + PartialEq + Send + 'static> DerivedInner<T> {
    fn recompute(self: &Arc<Self>) {
        let value = (self.compute)();
        {
            let mut last = self.last.lock().unwrap();
            if self.opts.distinct && *last == value {
                return;
            }
            *last = value.clone();
        }
        self.out.set(value);
    }

    fn on_source_change(self: &Arc<Self>) {
        let Some(window) = self.opts.debounce else {
            self.recompute();
            return;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if inner.generation.load(Ordering::SeqCst) == generation {
                inner.recompute();
            }
        });
        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }
}

/// A read-only cell recomputed from source cells via a pure transform.
pub struct DerivedCell<T> {
    inner: Arc<DerivedInner<T>>,
    sources: Mutex<Vec<Disposer>>,
}

impl<T: Clone + PartialEq + Send + 'static> DerivedCell<T> {
    /// Build a derived cell. `compute` reads the current values of the cells
    /// it captures; `sources` lists the cells whose changes trigger a
    /// recomputation. The initial value is computed eagerly.
    ///
    /// With a debounce window the recomputation runs on a tokio timer, so
    /// construction must happen inside a runtime.
    pub fn new<F>(sources: &[&dyn Observe], compute: F, opts: DeriveOptions) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let initial = compute();
        let inner = Arc::new(DerivedInner {
            out: ValueCell::new(initial.clone()),
            compute: Box::new(compute),
            last: Mutex::new(initial),
            opts,
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
        });
        let hook: Arc<dyn Fn() + Send + Sync> = {
            let inner = Arc::clone(&inner);
            Arc::new(move || inner.on_source_change())
        };
        let disposers = sources
            .iter()
            .map(|source| source.watch(Arc::clone(&hook)))
            .collect();
        DerivedCell {
            inner,
            sources: Mutex::new(disposers),
        }
    }

    /// Current derived value.
    pub fn get(&self) -> T {
        self.inner.out.get()
    }

    /// Subscribe to the derived output (replay-on-subscribe, like any cell).
    pub fn subscribe(&self, f: impl FnMut(&T) + Send + 'static) -> Disposer {
        self.inner.out.subscribe(f)
    }

    /// The output cell, for wiring into further derivations.
    pub fn output(&self) -> ValueCell<T> {
        self.inner.out.clone()
    }

    /// Unsubscribe from every source and cancel any pending debounce timer.
    /// The owner must call this when the derived value is no longer needed.
    pub fn teardown(&self) {
        for disposer in self.sources.lock().unwrap().drain(..) {
            disposer.dispose();
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.inner.pending.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_replays_current_value() {
        let cell = ValueCell::new(7i32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _d = cell.subscribe(move |v| log.lock().unwrap().push(*v));
        assert_eq!(*seen.lock().unwrap(), vec![7]);
        cell.set(8);
        assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
    }

    #[test]
    fn disposed_subscriber_receives_nothing() {
        let cell = ValueCell::new(0i32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let d = cell.subscribe(move |v| log.lock().unwrap().push(*v));
        cell.set(1);
        d.dispose();
        cell.set(2);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn notification_order_follows_subscription_order() {
        let cell = ValueCell::new(0i32);
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);
        let _da = cell.subscribe(move |v| a.lock().unwrap().push(("a", *v)));
        let _db = cell.subscribe(move |v| b.lock().unwrap().push(("b", *v)));
        cell.set(1);
        assert_eq!(
            *order.lock().unwrap(),
            vec![("a", 0), ("b", 0), ("a", 1), ("b", 1)]
        );
    }

    #[test]
    fn set_has_no_deduplication() {
        let cell = ValueCell::new(5i32);
        let count = Arc::new(Mutex::new(0usize));
        let c = Arc::clone(&count);
        let _d = cell.subscribe(move |_| *c.lock().unwrap() += 1);
        cell.set(5);
        cell.set(5);
        // one replay plus two sets, equal values notwithstanding
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn reentrant_set_skips_the_running_subscriber() {
        let cell = ValueCell::new(0i32);
        let self_seen = Arc::new(Mutex::new(Vec::new()));
        let other_seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&self_seen);
        let c = cell.clone();
        let _d1 = cell.subscribe(move |v| {
            log.lock().unwrap().push(*v);
            if *v == 1 {
                c.set(2);
            }
        });
        let log = Arc::clone(&other_seen);
        let _d2 = cell.subscribe(move |v| log.lock().unwrap().push(*v));
        cell.set(1);
        // the setter misses its own nested notification; the other
        // subscriber sees the nested value first, then the outer one
        assert_eq!(*self_seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(*other_seen.lock().unwrap(), vec![0, 2, 1]);
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn subscriber_may_set_another_cell() {
        let file = ValueCell::new(String::new());
        let title = ValueCell::new(String::new());
        let t = title.clone();
        let _d = file.subscribe(move |name| {
            if !name.is_empty() {
                t.set(name.clone());
            }
        });
        file.set("report.pdf".to_string());
        assert_eq!(title.get(), "report.pdf");
    }

    #[test]
    fn bound_cell_projects_into_record() {
        #[derive(Default)]
        struct Form {
            title: String,
        }
        let record = Arc::new(Mutex::new(Form::default()));
        let target = Arc::clone(&record);
        let cell = ValueCell::bound(String::new(), move |v: &String| {
            target.lock().unwrap().title = v.clone();
        });
        cell.set("Spec v1".to_string());
        assert_eq!(record.lock().unwrap().title, "Spec v1");
    }

    #[test]
    fn derived_distinct_suppresses_equal_outputs() {
        let source = ValueCell::new(1i32);
        let derived = DerivedCell::new(
            &[&source],
            {
                let source = source.clone();
                move || source.get() / 10
            },
            DeriveOptions::default(),
        );
        let count = Arc::new(Mutex::new(0usize));
        let c = Arc::clone(&count);
        let _d = derived.subscribe(move |_| *c.lock().unwrap() += 1);
        source.set(2);
        source.set(3); // still 0 after the transform
        assert_eq!(*count.lock().unwrap(), 1); // replay only
        source.set(25);
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(derived.get(), 2);
    }

    #[test]
    fn derived_without_distinct_notifies_every_recompute() {
        let source = ValueCell::new(1i32);
        let derived = DerivedCell::new(
            &[&source],
            {
                let source = source.clone();
                move || source.get() / 10
            },
            DeriveOptions {
                distinct: false,
                debounce: None,
            },
        );
        let count = Arc::new(Mutex::new(0usize));
        let c = Arc::clone(&count);
        let _d = derived.subscribe(move |_| *c.lock().unwrap() += 1);
        source.set(2);
        source.set(3);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn derived_combines_multiple_sources() {
        let a = ValueCell::new(2i32);
        let b = ValueCell::new(3i32);
        let sum = DerivedCell::new(
            &[&a, &b],
            {
                let a = a.clone();
                let b = b.clone();
                move || a.get() + b.get()
            },
            DeriveOptions::default(),
        );
        assert_eq!(sum.get(), 5);
        a.set(10);
        assert_eq!(sum.get(), 13);
        b.set(-3);
        assert_eq!(sum.get(), 7);
    }

    #[test]
    fn teardown_detaches_from_sources() {
        let source = ValueCell::new(1i32);
        let derived = DerivedCell::new(
            &[&source],
            {
                let source = source.clone();
                move || source.get() * 2
            },
            DeriveOptions::default(),
        );
        derived.teardown();
        source.set(50);
        assert_eq!(derived.get(), 2);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_coalesces_bursts_to_trailing_edge() {
        let source = ValueCell::new(0i32);
        let derived = DerivedCell::new(
            &[&source],
            {
                let source = source.clone();
                move || source.get()
            },
            DeriveOptions {
                distinct: true,
                debounce: Some(Duration::from_millis(100)),
            },
        );
        let count = Arc::new(Mutex::new(0usize));
        let c = Arc::clone(&count);
        let _d = derived.subscribe(move |_| *c.lock().unwrap() += 1);

        for v in 1..=5 {
            source.set(v);
            tokio::time::advance(Duration::from_millis(10)).await;
        }
        // inside the window: nothing beyond the replay yet
        assert_eq!(*count.lock().unwrap(), 1);

        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(derived.get(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_pending_debounce() {
        let source = ValueCell::new(0i32);
        let derived = DerivedCell::new(
            &[&source],
            {
                let source = source.clone();
                move || source.get()
            },
            DeriveOptions {
                distinct: true,
                debounce: Some(Duration::from_millis(50)),
            },
        );
        source.set(9);
        derived.teardown();
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(derived.get(), 0);
    }
}
