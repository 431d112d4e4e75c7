//! Reference counting.
//!
//! `RefCount` is the shared-ownership primitive every [`crate::store`]
//! variant embeds: `reserve`/`release` pairs per [`ReferenceOwner`] must
//! balance, the transition to zero runs a release callback exactly once,
//! and every operation past that point fails with
//! [`BytesError::Closed`](crate::error::BytesError::Closed).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::error::{BytesError, Result};

#[cfg(any(feature = "trace-reservations", debug_assertions))]
use std::backtrace::Backtrace;

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// A named handle scoping one reservation on a store.
///
/// Two owners are equal (and hash equal) only if they are the exact same
/// handle — owner identity, not owner name, is what `reserve`/`release`
/// pairing keys off of.
#[derive(Clone)]
pub struct ReferenceOwner {
    id: u64,
    name: &'static str,
}

impl ReferenceOwner {
    /// Creates a fresh, uniquely-identified owner with a diagnostic name.
    pub fn new(name: &'static str) -> Self {
        ReferenceOwner {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            name,
        }
    }
}

impl PartialEq for ReferenceOwner {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for ReferenceOwner {}
impl std::hash::Hash for ReferenceOwner {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl std::fmt::Debug for ReferenceOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

#[cfg(any(feature = "trace-reservations", debug_assertions))]
type TraceRegistry = Mutex<HashMap<u64, Vec<(ReferenceOwner, Backtrace)>>>;

#[cfg(any(feature = "trace-reservations", debug_assertions))]
fn trace_registry() -> &'static TraceRegistry {
    static REGISTRY: OnceLock<TraceRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Shared-ownership reference count used by every `BytesStore` variant.
///
/// Construction starts the count at 1, held by `creator`. Additional
/// holders call [`RefCount::reserve`]; each must eventually call
/// [`RefCount::release`]. The creator calls [`RefCount::release_last`]
/// instead of `release`, which additionally asserts no other reservation
/// remains outstanding.
pub struct RefCount {
    id: u64,
    count: AtomicIsize,
    owners: Mutex<HashMap<ReferenceOwner, usize>>,
    released: AtomicBool,
    on_release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl RefCount {
    /// Creates a new reference count of 1, held by `creator`. `on_release`
    /// runs exactly once, the moment the count reaches zero.
    pub fn new(creator: ReferenceOwner, on_release: impl FnOnce() + Send + 'static) -> Self {
        let mut owners = HashMap::new();
        owners.insert(creator, 1usize);
        let rc = RefCount {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            count: AtomicIsize::new(1),
            owners: Mutex::new(owners),
            released: AtomicBool::new(false),
            on_release: Mutex::new(Some(Box::new(on_release))),
        };
        log::debug!("store {} created with refCount=1", rc.id);
        rc
    }

    /// Current reference count. May be read concurrently with
    /// `reserve`/`release` from other threads.
    pub fn ref_count(&self) -> usize {
        self.count.load(Ordering::Acquire).max(0) as usize
    }

    fn closed_check(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            Err(BytesError::closed())
        } else {
            Ok(())
        }
    }

    #[cfg(any(feature = "trace-reservations", debug_assertions))]
    fn record_trace(&self, owner: ReferenceOwner) {
        trace_registry()
            .lock()
            .unwrap()
            .entry(self.id)
            .or_default()
            .push((owner, Backtrace::capture()));
    }

    /// Adds a reservation for `owner`, incrementing the count.
    pub fn reserve(&self, owner: ReferenceOwner) -> Result<()> {
        self.closed_check()?;
        #[cfg(any(feature = "trace-reservations", debug_assertions))]
        self.record_trace(owner.clone());
        *self.owners.lock().unwrap().entry(owner).or_insert(0) += 1;
        self.count.fetch_add(1, Ordering::AcqRel);
        log::trace!("store {} reserved, refCount={}", self.id, self.ref_count());
        Ok(())
    }

    /// Releases `owner`'s reservation. Fails with
    /// [`BytesError::DoubleRelease`] if `owner` holds no outstanding
    /// reservation (double release, or release by an unknown owner).
    pub fn release(&self, owner: ReferenceOwner) -> Result<()> {
        self.closed_check()?;
        self.release_inner(owner)
    }

    /// Releases the original creator's reference. Fails with
    /// [`BytesError::NotLastReference`] if other holders remain.
    pub fn release_last(&self, creator: ReferenceOwner) -> Result<()> {
        self.closed_check()?;
        let remaining = self.ref_count();
        if remaining != 1 {
            return Err(BytesError::NotLastReference {
                remaining: remaining.saturating_sub(1),
            });
        }
        self.release_inner(creator)
    }

    fn release_inner(&self, owner: ReferenceOwner) -> Result<()> {
        {
            let mut owners = self.owners.lock().unwrap();
            match owners.get_mut(&owner) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    if *n == 0 {
                        owners.remove(&owner);
                    }
                }
                _ => return Err(BytesError::double_release(owner)),
            }
        }
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        log::trace!("store {} released, refCount={}", self.id, prev - 1);
        if prev == 1 {
            self.released.store(true, Ordering::Release);
            if let Some(cb) = self.on_release.lock().unwrap().take() {
                log::debug!("store {} refCount reached 0, releasing resources", self.id);
                cb();
            }
            #[cfg(any(feature = "trace-reservations", debug_assertions))]
            trace_registry().lock().unwrap().remove(&self.id);
        }
        Ok(())
    }

    /// `true` once the count has reached zero and resources were released.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RefCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCount")
            .field("id", &self.id)
            .field("count", &self.ref_count())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn scenario_b_reserve_release_sequence() {
        let release_calls = Arc::new(AtomicUsize::new(0));
        let calls = release_calls.clone();
        let creator = ReferenceOwner::new("creator");
        let rc = RefCount::new(creator.clone(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(rc.ref_count(), 1);
        let a = ReferenceOwner::new("A");
        let b = ReferenceOwner::new("B");

        rc.reserve(a.clone()).unwrap();
        assert_eq!(rc.ref_count(), 2);
        rc.reserve(b.clone()).unwrap();
        assert_eq!(rc.ref_count(), 3);
        rc.release(a).unwrap();
        assert_eq!(rc.ref_count(), 2);
        rc.release(b).unwrap();
        assert_eq!(rc.ref_count(), 1);
        rc.release_last(creator).unwrap();
        assert_eq!(rc.ref_count(), 0);
        assert!(rc.is_released());
        assert_eq!(release_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn double_release_fails() {
        let creator = ReferenceOwner::new("creator");
        let rc = RefCount::new(creator.clone(), || {});
        let a = ReferenceOwner::new("A");
        rc.reserve(a.clone()).unwrap();
        rc.release(a.clone()).unwrap();
        assert!(matches!(
            rc.release(a),
            Err(BytesError::DoubleRelease { .. })
        ));
    }

    #[test]
    fn release_by_unknown_owner_fails() {
        let creator = ReferenceOwner::new("creator");
        let rc = RefCount::new(creator, || {});
        let stranger = ReferenceOwner::new("stranger");
        assert!(matches!(
            rc.release(stranger),
            Err(BytesError::DoubleRelease { .. })
        ));
    }

    #[test]
    fn release_last_fails_while_others_hold_reservations() {
        let creator = ReferenceOwner::new("creator");
        let rc = RefCount::new(creator.clone(), || {});
        let a = ReferenceOwner::new("A");
        rc.reserve(a).unwrap();
        assert!(matches!(
            rc.release_last(creator),
            Err(BytesError::NotLastReference { remaining: 1 })
        ));
    }

    #[test]
    fn operations_after_release_are_closed() {
        let creator = ReferenceOwner::new("creator");
        let rc = RefCount::new(creator.clone(), || {});
        rc.release_last(creator.clone()).unwrap();
        assert!(matches!(
            rc.reserve(ReferenceOwner::new("late")),
            Err(BytesError::Closed { .. })
        ));
        assert!(matches!(
            rc.release(creator),
            Err(BytesError::Closed { .. })
        ));
    }

    #[test]
    fn release_callback_runs_exactly_once_under_concurrent_attempts() {
        let release_calls = Arc::new(AtomicUsize::new(0));
        let calls = release_calls.clone();
        let creator = ReferenceOwner::new("creator");
        let rc = Arc::new(RefCount::new(creator.clone(), move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }));

        let owners: Vec<_> = (0..8).map(|i| ReferenceOwner::new("concurrent")).collect();
        let _ = &owners;
        for o in &owners {
            rc.reserve(o.clone()).unwrap();
        }

        let mut handles = Vec::new();
        for o in owners.into_iter() {
            let rc = rc.clone();
            handles.push(std::thread::spawn(move || {
                rc.release(o).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        rc.release_last(creator).unwrap();
        assert_eq!(release_calls.load(Ordering::SeqCst), 1);
    }
}
