//! Controller → worker capture signal.
//!
//! One atomic word carries the phase and an interval generation. The
//! controller is the only writer; workers hold a [`SignalReader`]. The
//! generation changes on every start/resume, so a worker that misses a
//! quick pause/resume between two polls still closes its old interval.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const PHASE_BITS: u64 = 2;
const PHASE_MASK: u64 = (1 << PHASE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Recording,
    Paused,
    Stopped,
}

impl CapturePhase {
    fn to_bits(self) -> u64 {
        match self {
            Self::Stopped => 0,
            Self::Recording => 1,
            Self::Paused => 2,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits & PHASE_MASK {
            1 => Self::Recording,
            2 => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Phase plus the generation of the interval it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSnapshot {
    pub phase: CapturePhase,
    pub generation: u64,
}

fn pack(phase: CapturePhase, generation: u64) -> u64 {
    (generation << PHASE_BITS) | phase.to_bits()
}

fn unpack(word: u64) -> SignalSnapshot {
    SignalSnapshot {
        phase: CapturePhase::from_bits(word),
        generation: word >> PHASE_BITS,
    }
}

/// Write side, owned by the session controller.
#[derive(Debug, Default)]
pub struct CaptureSignal {
    word: Arc<AtomicU64>,
}

impl CaptureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reader(&self) -> SignalReader {
        SignalReader {
            word: Arc::clone(&self.word),
        }
    }

    /// Enter `Recording` with a fresh interval generation.
    pub fn begin_interval(&self) -> u64 {
        let generation = self.snapshot().generation + 1;
        self.word.store(pack(CapturePhase::Recording, generation), Ordering::SeqCst);
        generation
    }

    pub fn pause(&self) {
        self.set_phase(CapturePhase::Paused);
    }

    pub fn stop(&self) {
        self.set_phase(CapturePhase::Stopped);
    }

    pub fn snapshot(&self) -> SignalSnapshot {
        unpack(self.word.load(Ordering::SeqCst))
    }

    fn set_phase(&self, phase: CapturePhase) {
        let generation = self.snapshot().generation;
        self.word.store(pack(phase, generation), Ordering::SeqCst);
    }
}

/// Read-only view handed to worker threads.
#[derive(Debug, Clone)]
pub struct SignalReader {
    word: Arc<AtomicU64>,
}

impl SignalReader {
    pub fn snapshot(&self) -> SignalSnapshot {
        unpack(self.word.load(Ordering::SeqCst))
    }
}
