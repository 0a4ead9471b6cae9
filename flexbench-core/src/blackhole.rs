//! Blackhole Sink
//!
//! Folds a hash of every consumed value into a running checksum so the
//! optimizer cannot discard benchmarked work whose result is otherwise unused.
//! Every action's return value goes through [`consume`] automatically; call it
//! directly for intermediate values.
//!
//! Values are hashed by [`Consumable`]. Primitives hash by value, shared
//! (`Arc`) values hash by identity, heap containers by their allocation. The
//! checksum carries no meaning beyond being observable.

use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::hint::black_box;
use std::sync::{Arc, LazyLock, Weak};

/// `(a * 31) ^ b`, wrapping
#[inline]
pub fn mix(current: u32, value: u32) -> u32 {
    current.wrapping_mul(31) ^ value
}

/// Value that can be folded into a blackhole
pub trait Consumable {
    /// 32-bit hash folded into the checksum
    fn blackhole_hash(&self) -> u32;
}

/// Checksum accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Blackhole {
    checksum: u32,
    count: u32,
}

impl Blackhole {
    /// Empty sink
    pub const fn new() -> Self {
        Self {
            checksum: 0,
            count: 0,
        }
    }

    /// Fold a value into the checksum
    #[inline]
    pub fn consume<T: Consumable + ?Sized>(&mut self, value: &T) {
        self.count = self.count.wrapping_add(1);
        let hash = black_box(value).blackhole_hash();
        self.checksum = mix(mix(self.checksum, self.count), hash);
    }

    /// Checksum over everything consumed so far
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Number of values consumed
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Clear checksum and count
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

static SINK: Mutex<Blackhole> = parking_lot::const_mutex(Blackhole::new());

/// Fold a value into the process-wide sink
pub fn consume<T: Consumable>(value: T) {
    SINK.lock().consume(&value);
    drop(black_box(value));
}

/// Checksum of the process-wide sink
pub fn checksum() -> u32 {
    SINK.lock().checksum()
}

/// Number of values consumed by the process-wide sink
pub fn count() -> u32 {
    SINK.lock().count()
}

/// Reset the process-wide sink
pub fn reset() {
    SINK.lock().reset();
}

// ─── Identity table ──────────────────────────────────────────────────────────

const PRUNE_THRESHOLD: usize = 1024;

struct IdentityEntry {
    id: u32,
    alive: Box<dyn Fn() -> bool + Send>,
}

#[derive(Default)]
struct IdentityTable {
    next_id: u32,
    entries: FxHashMap<usize, IdentityEntry>,
    prune_at: usize,
}

impl IdentityTable {
    fn id_of<T: ?Sized + Send + Sync + 'static>(&mut self, value: &Arc<T>) -> u32 {
        let address = Arc::as_ptr(value).cast::<()>() as usize;

        if let Some(entry) = self.entries.get(&address) {
            // A dead entry means the address was freed and reused by a new value
            if (entry.alive)() {
                return entry.id;
            }
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        let weak: Weak<T> = Arc::downgrade(value);
        self.entries.insert(
            address,
            IdentityEntry {
                id,
                alive: Box::new(move || weak.strong_count() > 0),
            },
        );

        if self.entries.len() >= self.prune_at.max(PRUNE_THRESHOLD) {
            self.entries.retain(|_, entry| (entry.alive)());
            self.prune_at = self.entries.len() * 2;
        }
        id
    }
}

static IDENTITIES: LazyLock<Mutex<IdentityTable>> =
    LazyLock::new(|| Mutex::new(IdentityTable::default()));

/// Stable id of a shared value for as long as it is alive
fn identity<T: ?Sized + Send + Sync + 'static>(value: &Arc<T>) -> u32 {
    IDENTITIES.lock().id_of(value)
}

// ─── Consumable impls ────────────────────────────────────────────────────────

impl Consumable for () {
    fn blackhole_hash(&self) -> u32 {
        1
    }
}

impl Consumable for bool {
    fn blackhole_hash(&self) -> u32 {
        if *self { 2 } else { 3 }
    }
}

macro_rules! consumable_int {
    ($($t:ty),*) => {
        $(
            impl Consumable for $t {
                #[inline]
                fn blackhole_hash(&self) -> u32 {
                    *self as u32
                }
            }
        )*
    };
}

consumable_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl Consumable for f64 {
    fn blackhole_hash(&self) -> u32 {
        if self.is_finite() {
            (*self * 1000003.0) as i64 as i32 as u32
        } else {
            4
        }
    }
}

impl Consumable for f32 {
    fn blackhole_hash(&self) -> u32 {
        f64::from(*self).blackhole_hash()
    }
}

impl Consumable for char {
    fn blackhole_hash(&self) -> u32 {
        *self as u32
    }
}

impl Consumable for str {
    fn blackhole_hash(&self) -> u32 {
        self.chars()
            .fold(self.len() as u32, |hash, c| mix(hash, c as u32))
    }
}

impl Consumable for String {
    fn blackhole_hash(&self) -> u32 {
        self.as_str().blackhole_hash()
    }
}

impl<T: Consumable> Consumable for Option<T> {
    fn blackhole_hash(&self) -> u32 {
        match self {
            Some(value) => value.blackhole_hash(),
            None => 1,
        }
    }
}

impl<T: Consumable + ?Sized> Consumable for &T {
    fn blackhole_hash(&self) -> u32 {
        (**self).blackhole_hash()
    }
}

impl<T: ?Sized + Send + Sync + 'static> Consumable for Arc<T> {
    fn blackhole_hash(&self) -> u32 {
        mix(8, identity(self))
    }
}

fn allocation_hash(address: usize, len: usize) -> u32 {
    mix(mix(10, address as u32), len as u32)
}

impl<T> Consumable for Vec<T> {
    fn blackhole_hash(&self) -> u32 {
        allocation_hash(self.as_ptr() as usize, self.len())
    }
}

impl<T> Consumable for [T] {
    fn blackhole_hash(&self) -> u32 {
        allocation_hash(self.as_ptr() as usize, self.len())
    }
}

impl<T: ?Sized> Consumable for Box<T> {
    fn blackhole_hash(&self) -> u32 {
        allocation_hash((&**self as *const T).cast::<()>() as usize, 1)
    }
}

impl<A: Consumable, B: Consumable> Consumable for (A, B) {
    fn blackhole_hash(&self) -> u32 {
        mix(self.0.blackhole_hash(), self.1.blackhole_hash())
    }
}
