//! The shared packet buffer.
//!
//! `PacketBuffer` owns B packet slots and B parallel metadata slots and
//! provides index arithmetic modulo B. It has no synchronization of its
//! own: the ring's shared mutex is the sole serializer of access, and
//! slot *ownership* (which stage may touch which index) is enforced by
//! the window invariant, not by any lock here.

use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;

/// Fixed-capacity storage for B packets and B metadata records.
pub struct PacketBuffer {
    packets: Box<[TsPacket]>,
    metadata: Box<[PacketMetadata]>,
}

impl PacketBuffer {
    /// Creates a buffer with `capacity` slots, all initially empty packets
    /// with default (valid, unlabeled) metadata.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "packet buffer capacity must be positive");
        Self {
            packets: vec![TsPacket::empty(); capacity].into_boxed_slice(),
            metadata: vec![PacketMetadata::default(); capacity].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.packets.len()
    }

    #[inline]
    fn wrap(&self, index: usize) -> usize {
        index % self.capacity()
    }

    /// # Safety
    /// Caller must guarantee no other stage's window overlaps `index`; the
    /// ring's window invariant is what makes this sound without a lock.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn packet_mut(&self, index: usize) -> &mut TsPacket {
        let idx = self.wrap(index);
        let ptr = self.packets.as_ptr().add(idx) as *mut TsPacket;
        &mut *ptr
    }

    /// # Safety
    /// Same contract as [`packet_mut`](Self::packet_mut).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn metadata_mut(&self, index: usize) -> &mut PacketMetadata {
        let idx = self.wrap(index);
        let ptr = self.metadata.as_ptr().add(idx) as *mut PacketMetadata;
        &mut *ptr
    }

    pub fn packet(&self, index: usize) -> &TsPacket {
        &self.packets[self.wrap(index)]
    }

    pub fn metadata(&self, index: usize) -> &PacketMetadata {
        &self.metadata[self.wrap(index)]
    }

    /// Splits a `count`-slot window starting at `first` into at most two
    /// contiguous `(start, len)` ranges, honoring wrap-around.
    pub fn window_ranges(&self, first: usize, count: usize) -> (std::ops::Range<usize>, Option<std::ops::Range<usize>>) {
        assert!(count <= self.capacity());
        let start = self.wrap(first);
        let head_len = (self.capacity() - start).min(count);
        let head = start..start + head_len;
        if head_len < count {
            let tail_len = count - head_len;
            (head, Some(0..tail_len))
        } else {
            (head, None)
        }
    }

    /// Mutable access to the (up to two) contiguous packet slices making up
    /// a stage's window. Safety follows the same window-exclusivity
    /// argument as [`packet_mut`](Self::packet_mut).
    ///
    /// # Safety
    /// The caller must hold exclusive ownership of `[first, first+count)`
    /// per the ring's window invariant.
    pub unsafe fn packet_window_mut(&self, first: usize, count: usize) -> (&mut [TsPacket], &mut [TsPacket]) {
        let (head, tail) = self.window_ranges(first, count);
        let base = self.packets.as_ptr() as *mut TsPacket;
        let head_slice = std::slice::from_raw_parts_mut(base.add(head.start), head.len());
        let tail_slice = match tail {
            Some(r) => std::slice::from_raw_parts_mut(base.add(r.start), r.len()),
            None => &mut [],
        };
        (head_slice, tail_slice)
    }

    /// Read-only counterpart of [`packet_window_mut`](Self::packet_window_mut),
    /// used by Output stages which only need to read their window.
    ///
    /// # Safety
    /// Same contract as [`packet_window_mut`](Self::packet_window_mut).
    pub unsafe fn packet_window(&self, first: usize, count: usize) -> (&[TsPacket], &[TsPacket]) {
        let (head, tail) = self.window_ranges(first, count);
        let base = self.packets.as_ptr();
        let head_slice = std::slice::from_raw_parts(base.add(head.start), head.len());
        let tail_slice = match tail {
            Some(r) => std::slice::from_raw_parts(base.add(r.start), r.len()),
            None => &[],
        };
        (head_slice, tail_slice)
    }

    /// # Safety
    /// Same contract as [`packet_window`](Self::packet_window).
    pub unsafe fn metadata_window(&self, first: usize, count: usize) -> (&[PacketMetadata], &[PacketMetadata]) {
        let (head, tail) = self.window_ranges(first, count);
        let base = self.metadata.as_ptr();
        let head_slice = std::slice::from_raw_parts(base.add(head.start), head.len());
        let tail_slice = match tail {
            Some(r) => std::slice::from_raw_parts(base.add(r.start), r.len()),
            None => &[],
        };
        (head_slice, tail_slice)
    }

    /// # Safety
    /// Same contract as [`packet_window_mut`](Self::packet_window_mut).
    pub unsafe fn metadata_window_mut(&self, first: usize, count: usize) -> (&mut [PacketMetadata], &mut [PacketMetadata]) {
        let (head, tail) = self.window_ranges(first, count);
        let base = self.metadata.as_ptr() as *mut PacketMetadata;
        let head_slice = std::slice::from_raw_parts_mut(base.add(head.start), head.len());
        let tail_slice = match tail {
            Some(r) => std::slice::from_raw_parts_mut(base.add(r.start), r.len()),
            None => &mut [],
        };
        (head_slice, tail_slice)
    }
}

// SAFETY: exclusivity is enforced by the ring's window protocol, not by
// `Sync`'s usual aliasing guarantees; every caller of the unsafe accessors
// above goes through the shared mutex first to read its window bounds.
unsafe impl Sync for PacketBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ranges_no_wrap() {
        let buf = PacketBuffer::new(8);
        let (head, tail) = buf.window_ranges(2, 3);
        assert_eq!(head, 2..5);
        assert!(tail.is_none());
    }

    #[test]
    fn window_ranges_with_wrap() {
        let buf = PacketBuffer::new(8);
        let (head, tail) = buf.window_ranges(6, 4);
        assert_eq!(head, 6..8);
        assert_eq!(tail, Some(0..2));
    }

    #[test]
    fn capacity_reported() {
        let buf = PacketBuffer::new(16);
        assert_eq!(buf.capacity(), 16);
    }
}
