//! Interned time handles.
//!
//! Traces store every checkpoint time as an [`InternedTime`]: a handle into a
//! process-wide table holding one canonical copy of each distinct
//! [`DeltaTime`]. Because equal values always receive the same handle,
//! handle equality and hashing reduce to pointer identity, and the many
//! repeated times of a simulation share a single table entry.
//!
//! The table is the only process-wide state in the crate and is guarded by a
//! mutex, so traces may be built from several threads even though each
//! individual trace is single-threaded. Entries are never evicted; a
//! simulation revisits times far more often than it mints new ones.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{LazyLock, Mutex};

use fnv::FnvBuildHasher;

use super::DeltaTime;

static TABLE: LazyLock<Mutex<HashSet<&'static DeltaTime, FnvBuildHasher>>> =
    LazyLock::new(|| Mutex::new(HashSet::default()));

fn intern(time: DeltaTime) -> &'static DeltaTime {
    let mut table = TABLE.lock().expect("time interning table poisoned");
    match table.get(&time) {
        Some(&entry) => entry,
        None => {
            let entry: &'static DeltaTime = Box::leak(Box::new(time));
            table.insert(entry);
            entry
        }
    }
}

/// An interned handle to a [`DeltaTime`].
///
/// Copying a handle is free and never touches the table; only minting one
/// from a raw [`DeltaTime`] does. Equality and hashing are identity
/// operations, while the ordering delegates to the underlying value, which
/// stays consistent because equal values share their canonical copy.
#[derive(Copy, Clone)]
pub struct InternedTime(&'static DeltaTime);

impl InternedTime {
    /// Interns a time, returning its canonical handle.
    pub fn new(time: DeltaTime) -> Self {
        InternedTime(intern(time))
    }

    /// The underlying time value.
    #[inline]
    pub fn get(self) -> DeltaTime {
        *self.0
    }
}

impl From<DeltaTime> for InternedTime {
    fn from(time: DeltaTime) -> Self {
        InternedTime::new(time)
    }
}

impl Default for InternedTime {
    fn default() -> Self {
        InternedTime::new(DeltaTime::default())
    }
}

impl PartialEq for InternedTime {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for InternedTime {}

impl Hash for InternedTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl PartialOrd for InternedTime {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternedTime {
    #[inline]
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(other.0)
    }
}

impl Deref for InternedTime {
    type Target = DeltaTime;

    #[inline]
    fn deref(&self) -> &DeltaTime {
        self.0
    }
}

impl fmt::Display for InternedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for InternedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0, f)
    }
}
