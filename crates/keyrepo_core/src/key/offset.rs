//! Set-once end offsets.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Marker for an offset that has not been computed yet.
pub const NON_INITIALIZED: i32 = -1;

/// An end offset that moves from [`NON_INITIALIZED`] to a concrete value at
/// most once.
///
/// Racing writers are fine as long as they all cache the same value; caching
/// a different value than the one already stored is a broken identity and
/// panics.
pub struct CachedOffset(AtomicI32);

impl CachedOffset {
    /// Creates an offset holding `value` (which may be [`NON_INITIALIZED`]).
    pub fn new(value: i32) -> Self {
        Self(AtomicI32::new(value))
    }

    /// Creates an offset that is not cached yet.
    pub fn unset() -> Self {
        Self::new(NON_INITIALIZED)
    }

    /// Current value, [`NON_INITIALIZED`] until cached.
    #[inline]
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// True once a concrete value has been stored.
    #[inline]
    pub fn is_cached(&self) -> bool {
        self.get() != NON_INITIALIZED
    }

    /// Stores `value` unless one is already there.
    ///
    /// Caching [`NON_INITIALIZED`] is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if a different concrete value was cached before.
    pub fn cache(&self, value: i32) {
        if value == NON_INITIALIZED {
            return;
        }
        if let Err(current) =
            self.0
                .compare_exchange(NON_INITIALIZED, value, Ordering::AcqRel, Ordering::Acquire)
        {
            assert_eq!(
                current, value,
                "end offset already cached as {current}, refusing to overwrite with {value}"
            );
        }
    }
}

impl Clone for CachedOffset {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl Default for CachedOffset {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Debug for CachedOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            NON_INITIALIZED => f.write_str("?"),
            v => write!(f, "{v}"),
        }
    }
}
