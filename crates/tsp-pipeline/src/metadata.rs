//! Packet metadata: labels, timestamps and per-slot validity.

/// Upper bound on the number of distinct packet labels.
pub const MAX_LABELS: u32 = 32;

/// A small-universe set of packet labels, backed by a single word.
///
/// Labels are plugin-defined integer tags in `0..MAX_LABELS`. The set
/// supports the three operations the ring and plugins actually need:
/// union, membership test, and clear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LabelSet(u32);

impl LabelSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Sets `label`. Panics in debug builds if `label >= MAX_LABELS`.
    pub fn set(&mut self, label: u32) {
        debug_assert!(label < MAX_LABELS, "label {label} out of range");
        self.0 |= 1 << label;
    }

    pub fn clear(&mut self, label: u32) {
        debug_assert!(label < MAX_LABELS, "label {label} out of range");
        self.0 &= !(1 << label);
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn test(&self, label: u32) -> bool {
        debug_assert!(label < MAX_LABELS, "label {label} out of range");
        self.0 & (1 << label) != 0
    }

    /// Unions `other` into `self` in place.
    pub fn union_with(&mut self, other: LabelSet) {
        self.0 |= other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Per-slot metadata, stored in lock-step with the packet buffer.
#[derive(Clone, Copy, Debug)]
pub struct PacketMetadata {
    pub labels: LabelSet,
    /// Monotonic timestamp in nanoseconds, plugin-assigned.
    pub timestamp_ns: u64,
    /// Whether this slot currently holds a packet a downstream stage should
    /// act on. Processors that logically "drop" a packet without shrinking
    /// the passed count clear this flag instead of shifting data around.
    pub valid: bool,
}

impl Default for PacketMetadata {
    fn default() -> Self {
        Self {
            labels: LabelSet::empty(),
            timestamp_ns: 0,
            valid: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_set_union_and_test() {
        let mut a = LabelSet::empty();
        a.set(3);
        let mut b = LabelSet::empty();
        b.set(5);
        a.union_with(b);
        assert!(a.test(3));
        assert!(a.test(5));
        assert!(!a.test(4));
    }

    #[test]
    fn label_set_clear() {
        let mut a = LabelSet::empty();
        a.set(1);
        a.clear(1);
        assert!(!a.test(1));
        assert!(a.is_empty());
    }
}
