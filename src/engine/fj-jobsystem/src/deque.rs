//! The work-stealing deque: a fixed-capacity ring of `T` with lock-free
//! `push`/`pop` for the owning thread and `steal` for any other thread.
//!
//! This is a from-scratch Chase-Lev deque, not a wrapper around a stealing-
//! queue crate — it is the component the rest of the job system is built on
//! top of. `top`/`bottom` are signed so the `t <= b` / `t < b` comparisons in
//! the protocol below are plain integer comparisons; at 64 bits wide they
//! cannot wrap during any realistic run, which sidesteps the 32-bit
//! wrapping-compare hazard of the original C++.

use crossbeam_utils::CachePadded;
use fj_core::sync::SyncUnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{fence, AtomicIsize, Ordering};

pub const QUEUE_SIZE: usize = 4096;

pub struct Deque<T: Copy> {
    /// Next free slot at the producer end. Written only by the owner.
    bottom: CachePadded<AtomicIsize>,
    /// Next slot to steal from. Advanced by the owner (last-element pop) and
    /// by thieves (successful steal), always via CAS.
    top: CachePadded<AtomicIsize>,
    buffer: Box<[SyncUnsafeCell<MaybeUninit<T>>]>,
}

impl<T: Copy> Deque<T> {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "deque capacity must be a power of two");
        let buffer = (0..capacity)
            .map(|_| SyncUnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            bottom: CachePadded::new(AtomicIsize::new(0)),
            top: CachePadded::new(AtomicIsize::new(0)),
            buffer,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    fn slot(&self, index: isize) -> *mut MaybeUninit<T> {
        let mask = self.capacity() - 1;
        self.buffer[(index as usize) & mask].get()
    }

    /// Owner only. Undefined behavior (silent overwrite of live entries) if
    /// called when `bottom - top == capacity` — callers must bound
    /// outstanding work; debug builds assert.
    pub fn push(&self, value: T) {
        let b = self.bottom.load(Ordering::Relaxed);
        let t = self.top.load(Ordering::Acquire);
        debug_assert!(
            b - t < self.capacity() as isize,
            "work-stealing deque overflow: push with no free slots"
        );

        unsafe {
            self.slot(b).write(MaybeUninit::new(value));
        }
        // Release: any thief observing the new `bottom` must see the slot
        // write above; a compiler-only fence would suffice on x86/64 but not
        // on weaker memory models.
        self.bottom.store(b + 1, Ordering::Release);
    }

    /// Owner only.
    pub fn pop(&self) -> Option<T> {
        let b = self.bottom.load(Ordering::Relaxed) - 1;
        // `swap` doubles as the store of the decremented bottom and as a full
        // fence between that store and the following load of `top`: a plain
        // store here could be reordered with the load on weaker hardware.
        self.bottom.swap(b, Ordering::SeqCst);
        let t = self.top.load(Ordering::SeqCst);

        if t <= b {
            // At least one element claimed.
            let value = unsafe { self.slot(b).read().assume_init() };
            if t != b {
                return Some(value);
            }

            // Last element in the queue: race any thief for it.
            let won = self
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            self.bottom.store(t + 1, Ordering::Relaxed);
            if won {
                Some(value)
            } else {
                None
            }
        } else {
            // Already empty; restore the aligned empty state.
            self.bottom.store(t, Ordering::Relaxed);
            None
        }
    }

    /// Called by any thread other than the owner.
    pub fn steal(&self) -> Option<T> {
        let t = self.top.load(Ordering::Acquire);
        // The load of `top` must precede the load of `bottom`; an explicit
        // fence makes that ordering portable across weaker memory models.
        fence(Ordering::Acquire);
        let b = self.bottom.load(Ordering::Acquire);

        if t < b {
            let value = unsafe { self.slot(t).read().assume_init() };
            if self
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok()
            {
                Some(value)
            } else {
                // Lost the race against the owner's pop or another thief.
                None
            }
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        let b = self.bottom.load(Ordering::SeqCst);
        let t = self.top.load(Ordering::SeqCst);
        (b - t).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Copy> Default for Deque<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the owner/thief protocol above is what makes concurrent access to
// the shared slots and indices sound; any `T: Copy` can ride along since the
// deque never interprets the value, only moves it between slots.
unsafe impl<T: Copy> Send for Deque<T> {}
unsafe impl<T: Copy> Sync for Deque<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn owner_push_then_pop_is_lifo() {
        let deque: Deque<i32> = Deque::with_capacity(16);
        for i in 1..=8 {
            deque.push(i);
        }
        let mut popped = Vec::new();
        while let Some(v) = deque.pop() {
            popped.push(v);
        }
        assert_eq!(popped, vec![8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn thief_steal_is_fifo() {
        let deque: Deque<i32> = Deque::with_capacity(16);
        for i in 1..=8 {
            deque.push(i);
        }
        let mut stolen = Vec::new();
        while let Some(v) = deque.steal() {
            stolen.push(v);
        }
        assert_eq!(stolen, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_deque_pop_and_steal_return_none() {
        let deque: Deque<i32> = Deque::with_capacity(16);
        assert_eq!(deque.pop(), None);
        assert_eq!(deque.steal(), None);
    }

    #[test]
    fn pop_after_emptying_realigns_indices() {
        let deque: Deque<i32> = Deque::with_capacity(16);
        deque.push(1);
        assert_eq!(deque.pop(), Some(1));
        assert_eq!(deque.pop(), None);
        // Ring must be back to an aligned empty state, not stuck with stale
        // top/bottom that would reject the next push's worth of capacity.
        for i in 0..16 {
            deque.push(i);
        }
        assert_eq!(deque.len(), 16);
    }

    #[test]
    fn concurrent_owner_and_thieves_lose_nothing_and_dup_nothing() {
        const N: i32 = 20_000;
        let deque: Arc<Deque<i32>> = Arc::new(Deque::with_capacity(32 * 1024));
        for i in 0..N {
            deque.push(i);
        }

        let stolen_count = Arc::new(AtomicUsize::new(0));
        let mut thieves = Vec::new();
        let mut all_results: Vec<i32> = Vec::new();
        let results = Arc::new(parking_lot_free_mutex());

        for _ in 0..4 {
            let deque = deque.clone();
            let stolen_count = stolen_count.clone();
            let results = results.clone();
            thieves.push(thread::spawn(move || {
                let mut local = Vec::new();
                while let Some(v) = deque.steal() {
                    local.push(v);
                    stolen_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                results.lock().unwrap().extend(local);
            }));
        }

        while let Some(v) = deque.pop() {
            all_results.push(v);
        }

        for t in thieves {
            t.join().unwrap();
        }
        all_results.extend(results.lock().unwrap().drain(..));

        all_results.sort_unstable();
        let expected: Vec<i32> = (0..N).collect();
        assert_eq!(all_results, expected);
    }

    // Small helper so the contention test doesn't need an extra dev-dependency
    // just for a `Vec` behind a lock.
    fn parking_lot_free_mutex() -> std::sync::Mutex<Vec<i32>> {
        std::sync::Mutex::new(Vec::new())
    }

    #[test]
    fn steal_and_pop_race_on_the_last_element_always_has_one_winner() {
        use std::sync::Barrier;

        const ITERATIONS: usize = 100_000;
        let mut owner_wins = 0usize;
        let mut thief_wins = 0usize;

        for _ in 0..ITERATIONS {
            let deque: Arc<Deque<i32>> = Arc::new(Deque::with_capacity(2));
            deque.push(1);

            // Both sides wait at the barrier so `pop` and `steal` start as
            // close together as possible, maximizing how often they land on
            // the last-element race instead of one finishing first.
            let barrier = Arc::new(Barrier::new(2));

            let thief_deque = deque.clone();
            let thief_barrier = barrier.clone();
            let thief = thread::spawn(move || {
                thief_barrier.wait();
                thief_deque.steal()
            });

            barrier.wait();
            let owner_result = deque.pop();
            let thief_result = thief.join().unwrap();

            match (owner_result, thief_result) {
                (Some(_), None) => owner_wins += 1,
                (None, Some(_)) => thief_wins += 1,
                other => panic!("last-element race had no winner or two winners: {other:?}"),
            }
        }

        assert_eq!(owner_wins + thief_wins, ITERATIONS);
    }

    proptest::proptest! {
        /// Whatever order pushes and owner-side pops interleave in, the
        /// values that come back out (with no thieves involved) must be
        /// exactly the pushed values in LIFO order.
        #[test]
        fn owner_only_is_always_lifo(values in proptest::collection::vec(0i32..10_000, 0..500)) {
            let deque: Deque<i32> = Deque::with_capacity(1024);
            for &v in &values {
                deque.push(v);
            }
            let mut popped = Vec::new();
            while let Some(v) = deque.pop() {
                popped.push(v);
            }
            let mut expected = values;
            expected.reverse();
            proptest::prop_assert_eq!(popped, expected);
        }

        /// A single thief stealing everything behind a non-popping owner
        /// must see values in FIFO order and nothing else.
        #[test]
        fn single_thief_is_always_fifo(values in proptest::collection::vec(0i32..10_000, 0..500)) {
            let deque: Deque<i32> = Deque::with_capacity(1024);
            for &v in &values {
                deque.push(v);
            }
            let mut stolen = Vec::new();
            while let Some(v) = deque.steal() {
                stolen.push(v);
            }
            proptest::prop_assert_eq!(stolen, values);
        }
    }
}
