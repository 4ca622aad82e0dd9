//! Interrupt → main loop hand-off: double buffer plus event flags

use core::cell::UnsafeCell;
use core::ops::Deref;

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum SensorKind {
    Accel,
    Gyro,
    Microphone,
}

/// Raised in interrupt context, consumed by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Event {
    /// New sample (or full capture buffer) from a source
    DataReady(SensorKind),
    /// Button: end the session after the current block
    Stop,
    /// Button: copy the pre-record ring to a file
    Save,
    LowBattery,
}

impl Event {
    const fn bit(self) -> u8 {
        match self {
            Event::DataReady(SensorKind::Accel) => 1 << 0,
            Event::DataReady(SensorKind::Gyro) => 1 << 1,
            Event::DataReady(SensorKind::Microphone) => 1 << 2,
            Event::Stop => 1 << 3,
            Event::Save => 1 << 4,
            Event::LowBattery => 1 << 5,
        }
    }
}

/// One level flag per event. Handlers only raise flags and the main loop
/// only lowers them, so nothing raised is ever lost; repeats of an event
/// the loop has not reached yet collapse into one.
pub struct EventFlags {
    pending: AtomicU8,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
        }
    }

    /// Raise from interrupt context. Never blocks. Returns false when the
    /// flag was already up.
    pub fn raise(&self, event: Event) -> bool {
        let bit = event.bit();
        self.pending.fetch_or(bit, Ordering::Release) & bit == 0
    }

    /// Lower the flag, reporting whether it was up.
    pub fn take(&self, event: Event) -> bool {
        let bit = event.bit();
        self.pending.fetch_and(!bit, Ordering::Acquire) & bit != 0
    }

    pub fn is_raised(&self, event: Event) -> bool {
        self.pending.load(Ordering::Acquire) & event.bit() != 0
    }

    /// Drop everything pending, e.g. presses made between sessions.
    pub fn clear(&self) {
        self.pending.store(0, Ordering::Release);
    }
}

impl Default for EventFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Two fixed buffers whose roles alternate: the producer fills the active
/// one while the consumer drains the other.
///
/// Each field has one writer: the producer owns the active index and
/// raises `ready`, the consumer only lowers it once it is done reading.
pub struct DoubleBuffer<const N: usize> {
    slots: [UnsafeCell<[u8; N]>; 2],
    active: AtomicU8,
    ready: AtomicBool,
    overruns: AtomicU32,
}

// SAFETY: a slot is written only by the producer while it is active, and
// read only by the consumer while `ready` is set, during which the producer
// never swaps.
unsafe impl<const N: usize> Sync for DoubleBuffer<N> {}

impl<const N: usize> DoubleBuffer<N> {
    pub const fn new() -> Self {
        Self {
            slots: [UnsafeCell::new([0; N]), UnsafeCell::new([0; N])],
            active: AtomicU8::new(0),
            ready: AtomicBool::new(false),
            overruns: AtomicU32::new(0),
        }
    }

    /// Hand out the two halves. Taking `&mut self` makes this possible once
    /// per borrow.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        self.active.store(0, Ordering::Relaxed);
        self.ready.store(false, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        let this = &*self;
        (Producer { buf: this, pos: 0 }, Consumer { buf: this })
    }

    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for DoubleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Push {
    Stored,
    /// Buffer filled and handed to the consumer
    Swapped,
    /// Buffer filled but the consumer still holds the other one; the
    /// active buffer is refilled from the start
    Overrun,
}

/// Interrupt side.
pub struct Producer<'a, const N: usize> {
    buf: &'a DoubleBuffer<N>,
    pos: usize,
}

impl<const N: usize> Producer<'_, N> {
    pub fn push(&mut self, byte: u8) -> Push {
        let idx = self.buf.active.load(Ordering::Relaxed) as usize;
        // SAFETY: slot `idx` is active and only this producer touches it
        unsafe { (*self.buf.slots[idx].get())[self.pos] = byte };
        self.pos += 1;
        if self.pos < N {
            return Push::Stored;
        }
        self.pos = 0;
        if self.buf.ready.load(Ordering::Acquire) {
            self.buf.overruns.fetch_add(1, Ordering::Relaxed);
            return Push::Overrun;
        }
        self.buf.active.store(1 - idx as u8, Ordering::Relaxed);
        self.buf.ready.store(true, Ordering::Release);
        Push::Swapped
    }

    /// Push a whole record. Reports the most significant outcome.
    pub fn push_slice(&mut self, bytes: &[u8]) -> Push {
        let mut out = Push::Stored;
        for &b in bytes {
            match self.push(b) {
                Push::Stored => {}
                Push::Swapped if out == Push::Overrun => {}
                p => out = p,
            }
        }
        out
    }

    /// Bytes in the active buffer not yet handed over.
    pub fn pending(&self) -> usize {
        self.pos
    }

    /// Drop the partly filled active buffer, e.g. when capture resumes
    /// after a pause.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

/// Main-loop side.
pub struct Consumer<'a, const N: usize> {
    buf: &'a DoubleBuffer<N>,
}

impl<const N: usize> Consumer<'_, N> {
    /// The full buffer, if one is waiting. Dropping the guard lowers the
    /// ready flag and returns the buffer to the producer.
    pub fn poll(&mut self) -> Option<Drained<'_, N>> {
        if !self.buf.ready.load(Ordering::Acquire) {
            return None;
        }
        let idx = 1 - self.buf.active.load(Ordering::Relaxed) as usize;
        Some(Drained { buf: self.buf, idx })
    }

    pub fn overruns(&self) -> u32 {
        self.buf.overruns()
    }
}

pub struct Drained<'a, const N: usize> {
    buf: &'a DoubleBuffer<N>,
    idx: usize,
}

impl<const N: usize> Deref for Drained<'_, N> {
    type Target = [u8; N];

    fn deref(&self) -> &[u8; N] {
        // SAFETY: the producer does not swap while `ready` is set, so this
        // slot is not written until the guard drops
        unsafe { &*self.buf.slots[self.idx].get() }
    }
}

impl<const N: usize> Drop for Drained<'_, N> {
    fn drop(&mut self) {
        self.buf.ready.store(false, Ordering::Release);
    }
}
