//! C8 — operations ring / shared header (shared-memory IPC).
//!
//! A named, memory-mapped region whose layout is the bit-exact wire
//! contract with an external reader process — the same "pin the layout,
//! declare it once, use it on both sides" approach as
//! `edge/wire.rs::EdgeTick`, scaled up to the full `SharedHeader` +
//! 100-slot operations ring. Field order, fixed-size byte arrays, and ring
//! capacity are a byte-for-byte transcription of the original engine's
//! `ipc/shared_memory.h`.

use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const RING_CAPACITY: usize = 100;
/// Shared-memory object name from the original `shm_create` call site.
pub const SHM_NAME: &str = "/draizer_v2";

/// C8 element. Packed, fixed layout, stable across language boundaries.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct ShmOperation {
    pub id: u64,
    pub timestamp_ns: u64,
    pub op_type: [u8; 20],
    pub strategy: [u8; 20],
    pub symbol: [u8; 12],
    pub buy_venue: [u8; 20],
    pub sell_venue: [u8; 20],
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub spread_bps: f64,
    pub fees_paid: f64,
    pub is_open: u8,
    pub padding: [u8; 7],
}

impl Default for ShmOperation {
    fn default() -> Self {
        Self {
            id: 0,
            timestamp_ns: 0,
            op_type: [0; 20],
            strategy: [0; 20],
            symbol: [0; 12],
            buy_venue: [0; 20],
            sell_venue: [0; 20],
            quantity: 0.0,
            entry_price: 0.0,
            exit_price: 0.0,
            pnl: 0.0,
            pnl_percent: 0.0,
            spread_bps: 0.0,
            fees_paid: 0.0,
            is_open: 0,
            padding: [0; 7],
        }
    }
}

/// C8 header. Host-native endian, field order and explicit padding a
/// byte-for-byte transcription of `SharedMemory` in the original
/// `ipc/shared_memory.h` — offsets matter here, not just field presence,
/// since an external reader process maps this struct directly.
#[repr(C)]
pub struct SharedHeader {
    pub engine_running: u8,
    pub strategy_enabled: [u8; 3],
    _padding1: [u8; 4],
    pub opps_detected: AtomicU64,
    pub opps_executed: AtomicU64,
    pub orders_placed: AtomicU64,
    pub orders_filled: AtomicU64,
    pub total_profit_usd: f64,
    pub balance_usd: f64,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub open_positions: u32,
    _padding2: [u8; 4],
    pub avg_latency_us: u32,
    pub p99_latency_us: u32,
    pub last_update_ns: u64,
    operations: [std::cell::UnsafeCell<ShmOperation>; RING_CAPACITY],
    head: AtomicU32,
    tail: AtomicU32,
    total_operations: AtomicU64,
}

// SAFETY: `operations` slots are only mutated by `push_operation`, which is
// only called by the matcher (the sole producer); `pop_operations` only
// copies already-released slots.
unsafe impl Sync for SharedHeader {}

pub const SHARED_HEADER_SIZE: usize = std::mem::size_of::<SharedHeader>();

impl SharedHeader {
    fn init_in_place(mem: &mut [u8]) {
        // SAFETY: `mem` is exactly `SHARED_HEADER_SIZE` bytes, suitably
        // aligned by the mmap allocator; zero-initialized memory is a valid
        // bit pattern for every field (atomics, floats, byte arrays).
        unsafe {
            std::ptr::write_bytes(mem.as_mut_ptr(), 0, mem.len());
        }
    }

    /// `push_operation`: drop-oldest on overflow, release-stores the new
    /// head only after the slot write is visible.
    pub fn push_operation(&self, mut op: ShmOperation) {
        let head = self.head.load(Ordering::Relaxed);
        let tail_acq = self.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % RING_CAPACITY as u32;
        if next_head == tail_acq {
            let next_tail = (tail_acq + 1) % RING_CAPACITY as u32;
            self.tail.store(next_tail, Ordering::Release);
        }
        op.id = self.total_operations.load(Ordering::Relaxed);
        // SAFETY: single producer (the matcher) owns slot `head`.
        unsafe {
            *self.operations[head as usize].get() = op;
        }
        self.head.store(next_head, Ordering::Release);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// `pop_operations`: acquire-loads tail/head, copies up to `max` slots,
    /// then release-stores the new tail.
    pub fn pop_operations(&self, out: &mut [ShmOperation]) -> usize {
        let mut tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        let mut n = 0;
        while tail != head && n < out.len() {
            // SAFETY: slot `tail` was released by the producer before `head`
            // advanced past it; the consumer is the sole reader of it.
            out[n] = unsafe { *self.operations[tail as usize].get() };
            tail = (tail + 1) % RING_CAPACITY as u32;
            n += 1;
        }
        self.tail.store(tail, Ordering::Release);
        n
    }

    pub fn ring_len(&self) -> u32 {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + RING_CAPACITY as u32 - tail) % RING_CAPACITY as u32
    }

    /// `update_stats`: EMA average, rolling-max "p99" (see `DESIGN.md` for
    /// why this mislabeled field is kept as-is per the open question),
    /// last-update timestamp.
    pub fn update_stats(&mut self, latency_us: u32, now_ns: u64) {
        self.avg_latency_us = ((9 * self.avg_latency_us as u64 + latency_us as u64) / 10) as u32;
        self.p99_latency_us = self.p99_latency_us.max(latency_us);
        self.last_update_ns = now_ns;
    }
}

/// Owns the memory-mapped region backing a [`SharedHeader`]. `create` sizes
/// and zero-initializes a backing file at `path`; `open` maps an existing one
/// read-write for an external consumer.
pub struct SharedRegion {
    mmap: MmapMut,
}

impl SharedRegion {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?;
        file.set_len(SHARED_HEADER_SIZE as u64)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        SharedHeader::init_in_place(&mut mmap);
        Ok(Self { mmap })
    }

    pub fn header(&self) -> &SharedHeader {
        // SAFETY: the mapping is exactly `SHARED_HEADER_SIZE` bytes and was
        // zero-initialized (a valid `SharedHeader` bit pattern) by `create`.
        unsafe { &*(self.mmap.as_ptr() as *const SharedHeader) }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn header_mut(&self) -> &mut SharedHeader {
        // SAFETY: the matcher is the sole writer of the header's non-atomic
        // fields; the mmap outlives every reference handed out from it.
        unsafe { &mut *(self.mmap.as_ptr() as *mut SharedHeader) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> (SharedRegion, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draizer_shm_test");
        (SharedRegion::create(&path).unwrap(), dir)
    }

    #[test]
    fn header_has_expected_ring_capacity() {
        let (region, _dir) = region();
        assert_eq!(region.header().ring_len(), 0);
    }

    #[test]
    fn push_then_pop_one_returns_exactly_that_operation() {
        let (region, _dir) = region();
        let header = region.header();
        let op = ShmOperation { quantity: 1.5, entry_price: 50000.0, ..Default::default() };
        header.push_operation(op);

        let mut out = [ShmOperation::default(); 1];
        let n = header.pop_operations(&mut out);
        assert_eq!(n, 1);
        let (quantity, entry_price) = (out[0].quantity, out[0].entry_price);
        assert_eq!(quantity, 1.5);
        assert_eq!(entry_price, 50000.0);
    }

    #[test]
    fn ring_len_invariant_holds_under_wraparound() {
        let (region, _dir) = region();
        let header = region.header();
        for i in 0..250u64 {
            let op = ShmOperation { pnl: i as f64, ..Default::default() };
            header.push_operation(op);
            assert!(header.ring_len() <= RING_CAPACITY as u32);
        }
    }

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let (region, _dir) = region();
        let header = region.header();
        for i in 0..(RING_CAPACITY as u64 + 5) {
            let op = ShmOperation { pnl: i as f64, ..Default::default() };
            header.push_operation(op);
        }
        let mut out = [ShmOperation::default(); RING_CAPACITY];
        let n = header.pop_operations(&mut out);
        // One slot is always kept empty to distinguish full from empty, so
        // RING_CAPACITY-1 items survive; the oldest 6 of 105 pushed are dropped.
        assert_eq!(n, RING_CAPACITY - 1);
        let pnl = out[0].pnl;
        assert_eq!(pnl, 6.0);
    }

}

#[cfg(test)]
mod layout_tests {
    use super::*;

    #[test]
    fn shared_header_size_matches_original_packed_layout() {
        // engine_running(1)+strategy_enabled(3)+padding1(4)+4*u64(32)
        // +2*f64(16)+2*u32(8)+f64(8)+u32(4)+padding2(4)+2*u32(8)+u64(8)
        // = 96 bytes of header fields before the operations ring.
        assert_eq!(std::mem::size_of::<ShmOperation>(), 172);
        let expected = 96 + RING_CAPACITY * 172 + 4 + 4 + 8;
        assert_eq!(std::mem::size_of::<SharedHeader>(), expected);
    }
}
