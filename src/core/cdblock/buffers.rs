// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sector buffer pool and partition management
//!
//! The CD Block owns 200 fixed-size sector buffers shared between the free
//! pool and 24 partitions. Ownership is tracked with intrusive doubly-linked
//! lists: each buffer carries `prev`/`next` slot indices (0xFF = none), so a
//! buffer is always a member of exactly one list. The free count published
//! here is the backpressure signal the drive checks before storing a sector.

/// Number of sector buffers in the pool
pub const NUM_BUFFERS: usize = 200;

/// Number of buffer partitions (shared namespace with filters)
pub const NUM_PARTITIONS: usize = 24;

/// Raw sector payload size held by one buffer (sync + header + data + EDC/ECC)
pub const RAW_SECTOR_SIZE: usize = 2352;

/// Link value meaning "no buffer"
pub const NO_BUFFER: u8 = 0xFF;

/// One sector buffer slot
///
/// Holds a full raw sector plus the intrusive list links. The links are slot
/// indices into the pool, never pointers, which keeps the structure trivially
/// serializable.
#[derive(Clone)]
pub struct SectorBuffer {
    /// Raw sector bytes
    pub data: [u8; RAW_SECTOR_SIZE],

    /// Previous buffer in the owning list (0xFF = head)
    pub prev: u8,

    /// Next buffer in the owning list (0xFF = tail)
    pub next: u8,
}

impl Default for SectorBuffer {
    fn default() -> Self {
        Self {
            data: [0; RAW_SECTOR_SIZE],
            prev: NO_BUFFER,
            next: NO_BUFFER,
        }
    }
}

/// One partition: an ordered queue of sector buffers
#[derive(Debug, Clone, Copy)]
pub struct Partition {
    /// First buffer in the queue (0xFF = empty)
    pub first: u8,

    /// Last buffer in the queue (0xFF = empty)
    pub last: u8,

    /// Number of buffers queued
    pub count: u8,
}

impl Default for Partition {
    fn default() -> Self {
        Self {
            first: NO_BUFFER,
            last: NO_BUFFER,
            count: 0,
        }
    }
}

/// The sector buffer pool with its free list and partitions
pub struct BufferPool {
    /// All buffer slots
    pub(super) buffers: Vec<SectorBuffer>,

    /// Partition queues
    pub(super) partitions: [Partition; NUM_PARTITIONS],

    /// Head of the free list (0xFF = exhausted)
    pub(super) first_free: u8,

    /// Number of buffers on the free list
    pub(super) free_count: u8,
}

impl BufferPool {
    /// Create a pool with every buffer on the free list
    pub fn new() -> Self {
        let mut pool = Self {
            buffers: vec![SectorBuffer::default(); NUM_BUFFERS],
            partitions: [Partition::default(); NUM_PARTITIONS],
            first_free: 0,
            free_count: 0,
        };
        pool.reset();
        pool
    }

    /// Return every buffer to the free list and empty all partitions
    ///
    /// Buffer contents are left untouched; only ownership is rebuilt.
    pub fn reset(&mut self) {
        for (i, buf) in self.buffers.iter_mut().enumerate() {
            buf.prev = if i == 0 { NO_BUFFER } else { (i - 1) as u8 };
            buf.next = if i == NUM_BUFFERS - 1 {
                NO_BUFFER
            } else {
                (i + 1) as u8
            };
        }
        self.first_free = 0;
        self.free_count = NUM_BUFFERS as u8;
        self.partitions = [Partition::default(); NUM_PARTITIONS];
    }

    /// Number of buffers available for allocation
    pub fn free_count(&self) -> u8 {
        self.free_count
    }

    /// Access one partition's bookkeeping
    pub fn partition(&self, pnum: u8) -> &Partition {
        &self.partitions[pnum as usize]
    }

    /// Raw data of one buffer slot
    pub fn data(&self, index: u8) -> &[u8; RAW_SECTOR_SIZE] {
        &self.buffers[index as usize].data
    }

    /// Mutable raw data of one buffer slot
    pub fn data_mut(&mut self, index: u8) -> &mut [u8; RAW_SECTOR_SIZE] {
        &mut self.buffers[index as usize].data
    }

    /// Pop a buffer off the free list
    ///
    /// Callers must check `free_count()` first; allocating from an exhausted
    /// pool is a contract violation.
    ///
    /// # Arguments
    ///
    /// * `zero_fill` - Clear the buffer's data bytes before handing it out
    ///
    /// # Returns
    ///
    /// Slot index of the allocated buffer, unlinked from every list.
    pub fn allocate(&mut self, zero_fill: bool) -> u8 {
        assert!(self.free_count > 0, "sector buffer pool exhausted");

        let index = self.first_free;
        let next = self.buffers[index as usize].next;
        self.first_free = next;
        if next != NO_BUFFER {
            self.buffers[next as usize].prev = NO_BUFFER;
        }
        self.free_count -= 1;

        let buf = &mut self.buffers[index as usize];
        buf.prev = NO_BUFFER;
        buf.next = NO_BUFFER;
        if zero_fill {
            buf.data = [0; RAW_SECTOR_SIZE];
        }

        index
    }

    /// Push a buffer back onto the free list
    ///
    /// The buffer must already be unlinked from any partition; freeing a
    /// buffer twice corrupts the list.
    pub fn free(&mut self, index: u8) {
        let old_head = self.first_free;
        {
            let buf = &mut self.buffers[index as usize];
            buf.prev = NO_BUFFER;
            buf.next = old_head;
        }
        if old_head != NO_BUFFER {
            self.buffers[old_head as usize].prev = index;
        }
        self.first_free = index;
        self.free_count += 1;
    }

    /// Append a buffer to a partition's tail
    pub fn link(&mut self, pnum: u8, index: u8) {
        let part = &mut self.partitions[pnum as usize];
        let old_last = part.last;

        self.buffers[index as usize].prev = old_last;
        self.buffers[index as usize].next = NO_BUFFER;

        if old_last != NO_BUFFER {
            self.buffers[old_last as usize].next = index;
        }
        let part = &mut self.partitions[pnum as usize];
        if part.first == NO_BUFFER {
            part.first = index;
        }
        part.last = index;
        part.count += 1;
    }

    /// Detach a buffer from anywhere inside a partition
    ///
    /// O(1) given the buffer's own links; the caller still owns the buffer
    /// afterward and must free or re-link it.
    pub fn unlink(&mut self, pnum: u8, index: u8) {
        let (prev, next) = {
            let buf = &self.buffers[index as usize];
            (buf.prev, buf.next)
        };

        let part = &mut self.partitions[pnum as usize];
        if part.first == index {
            part.first = next;
        }
        if part.last == index {
            part.last = prev;
        }
        part.count -= 1;

        if prev != NO_BUFFER {
            self.buffers[prev as usize].next = next;
        }
        if next != NO_BUFFER {
            self.buffers[next as usize].prev = prev;
        }

        let buf = &mut self.buffers[index as usize];
        buf.prev = NO_BUFFER;
        buf.next = NO_BUFFER;
    }

    /// Find the buffer at a position within a partition
    ///
    /// Walks the queue from the head; partitions are small, so the O(offset)
    /// cost is acceptable.
    ///
    /// # Returns
    ///
    /// - `Some(index)` - Slot index of the buffer at `offset`
    /// - `None` - Offset past the end of the queue
    pub fn buffer_at(&self, pnum: u8, offset: usize) -> Option<u8> {
        let mut cur = self.partitions[pnum as usize].first;
        let mut remaining = offset;

        while cur != NO_BUFFER {
            if remaining == 0 {
                return Some(cur);
            }
            remaining -= 1;
            cur = self.buffers[cur as usize].next;
        }
        None
    }

    /// Iterate the buffer indices queued in a partition, head to tail
    pub fn iter_partition(&self, pnum: u8) -> PartitionIter<'_> {
        PartitionIter {
            pool: self,
            cur: self.partitions[pnum as usize].first,
        }
    }

    /// Drain a partition, returning every buffer to the free list
    pub fn clear_partition(&mut self, pnum: u8) {
        while self.partitions[pnum as usize].first != NO_BUFFER {
            let index = self.partitions[pnum as usize].first;
            self.unlink(pnum, index);
            self.free(index);
        }
    }

    /// Check that the persisted lists are structurally sound
    ///
    /// Used when restoring persisted state: out-of-range links, cyclic or
    /// cross-linked chains, or counts that disagree with the chains mean the
    /// persisted lists cannot be trusted and the pool must be rebuilt.
    /// Buffers held outside every list (mid-transfer) are allowed.
    pub fn links_valid(&self) -> bool {
        let ok = |v: u8| v == NO_BUFFER || (v as usize) < NUM_BUFFERS;
        if !(self.partitions.iter().all(|p| ok(p.first) && ok(p.last))
            && self.buffers.iter().all(|b| ok(b.prev) && ok(b.next))
            && ok(self.first_free))
        {
            return false;
        }

        // Walk each chain head to tail: every hop must be a fresh buffer with
        // a matching back-link, and the length must equal the published count.
        let mut seen = [false; NUM_BUFFERS];
        let mut walk = |first: u8, count: usize, want_last: Option<u8>| -> bool {
            let mut cur = first;
            let mut prev = NO_BUFFER;
            let mut len = 0usize;
            while cur != NO_BUFFER {
                if seen[cur as usize] || self.buffers[cur as usize].prev != prev {
                    return false;
                }
                seen[cur as usize] = true;
                len += 1;
                prev = cur;
                cur = self.buffers[cur as usize].next;
            }
            len == count && want_last.is_none_or(|last| last == prev)
        };

        if !walk(self.first_free, self.free_count as usize, None) {
            return false;
        }
        self.partitions
            .iter()
            .all(|p| walk(p.first, p.count as usize, Some(p.last)))
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one partition's queued buffer indices
pub struct PartitionIter<'a> {
    pool: &'a BufferPool,
    cur: u8,
}

impl Iterator for PartitionIter<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.cur == NO_BUFFER {
            return None;
        }
        let index = self.cur;
        self.cur = self.pool.buffers[index as usize].next;
        Some(index)
    }
}
