//! Range bounds with an infinity sentinel.
//!
//! Every chain carries a `[low, high)` range. Only the leftmost node of a
//! level has an infinite low bound and only the rightmost has an infinite
//! high bound, so whether [`BoundKey::Infinite`] means minus or plus infinity
//! depends on which side it guards.
//!
//! Ordering operators between a bound and a concrete key panic when the
//! bound is infinite: callers branch on [`BoundKey::is_infinite`] first, or
//! use [`BoundKey::try_cmp`].

use std::cmp::Ordering;

use crate::error::BoundError;

/// A node range bound: a concrete key or infinity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoundKey<K> {
    /// Concrete bound.
    Finite(K),
    /// Unbounded side of the leftmost or rightmost node.
    Infinite,
}

impl<K> BoundKey<K> {
    /// The infinity sentinel.
    #[inline]
    #[must_use]
    pub const fn infinite() -> Self {
        Self::Infinite
    }

    /// A concrete bound.
    #[inline]
    #[must_use]
    pub const fn finite(key: K) -> Self {
        Self::Finite(key)
    }

    /// Whether this is the infinity sentinel.
    #[inline]
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// The concrete key, if any.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> Option<&K> {
        match self {
            Self::Finite(key) => Some(key),
            Self::Infinite => None,
        }
    }
}

impl<K: Ord> BoundKey<K> {
    /// Compare the bound against a concrete key.
    ///
    /// # Errors
    /// [`BoundError::Infinite`] if the bound is infinite.
    #[inline]
    pub fn try_cmp(&self, key: &K) -> Result<Ordering, BoundError> {
        self.key()
            .map(|bound| bound.cmp(key))
            .ok_or(BoundError::Infinite)
    }

    /// Read as a low (inclusive) bound: does it admit `key`?
    #[inline]
    #[must_use]
    pub fn admits_from_below(&self, key: &K) -> bool {
        self.key().is_none_or(|low| low <= key)
    }

    /// Read as a high (exclusive) bound: does it admit `key`?
    #[inline]
    #[must_use]
    pub fn admits_from_above(&self, key: &K) -> bool {
        self.key().is_none_or(|high| key < high)
    }

}

impl<K: Ord> PartialEq<K> for BoundKey<K> {
    fn eq(&self, other: &K) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl<K: Ord> PartialOrd<K> for BoundKey<K> {
    /// # Panics
    /// If the bound is infinite.
    fn partial_cmp(&self, other: &K) -> Option<Ordering> {
        match self.try_cmp(other) {
            Ok(ordering) => Some(ordering),
            Err(err) => panic!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_relational_operators() {
        let bound = BoundKey::finite(100);

        assert!(bound == 100);
        assert!(bound < 101);
        assert!(bound > 99);
        assert!(bound <= 100);
        assert!(bound >= 100);
        assert!(bound != 7);
    }

    #[test]
    #[should_panic(expected = "infinite bound")]
    fn test_infinite_eq_panics() {
        let bound: BoundKey<i32> = BoundKey::infinite();
        let _ = bound == 100;
    }

    #[test]
    #[should_panic(expected = "infinite bound")]
    fn test_infinite_lt_panics() {
        let bound: BoundKey<i32> = BoundKey::infinite();
        let _ = bound < 100;
    }

    #[test]
    #[should_panic(expected = "infinite bound")]
    fn test_infinite_gt_panics() {
        let bound: BoundKey<i32> = BoundKey::infinite();
        let _ = bound > 100;
    }

    #[test]
    fn test_try_cmp() {
        assert_eq!(BoundKey::finite(5).try_cmp(&3), Ok(Ordering::Greater));
        assert_eq!(BoundKey::<i32>::Infinite.try_cmp(&3), Err(BoundError::Infinite));
    }

    #[test]
    fn test_bound_to_bound_equality() {
        assert_eq!(BoundKey::finite(3), BoundKey::finite(3));
        assert_eq!(BoundKey::<i32>::infinite(), BoundKey::Infinite);
        assert_ne!(BoundKey::finite(3), BoundKey::Infinite);
    }

    #[test]
    fn test_admits() {
        let low = BoundKey::finite(10);
        assert!(low.admits_from_below(&10));
        assert!(!low.admits_from_below(&9));
        assert!(BoundKey::<i32>::Infinite.admits_from_below(&i32::MIN));

        let high = BoundKey::finite(20);
        assert!(high.admits_from_above(&19));
        assert!(!high.admits_from_above(&20));
        assert!(BoundKey::<i32>::Infinite.admits_from_above(&i32::MAX));
    }
}
