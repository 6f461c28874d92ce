//! Fingerprint hashing of rendered traces.
//!
//! Fingerprints must stay stable across processes and toolchain versions, since hosts may
//! persist banned fingerprints. Bytes are folded in with FNV-1a and the final state gets an
//! extra avalanche step.

use crate::trace::TRACE_FORMAT_VERSION;

/// Hash builder for rendered stack traces
pub struct TraceFingerprint {
    /// Current hash state using FNV-1a algorithm principles
    state: u64,
}

impl TraceFingerprint {
    /// Create a new fingerprint builder, seeded with the trace format version
    #[must_use]
    pub fn new() -> Self {
        TraceFingerprint {
            state: 0xcbf2_9ce4_8422_2325_u64, // FNV-1a 64-bit offset basis
        }
        .add_bytes(&TRACE_FORMAT_VERSION.to_le_bytes())
    }

    /// Fingerprint of a complete rendered trace
    #[must_use]
    pub fn of(text: &str) -> u64 {
        Self::new().add_bytes(text.as_bytes()).finalize()
    }

    /// Fold raw bytes into the state
    #[must_use]
    pub fn add_bytes(mut self, bytes: &[u8]) -> Self {
        for byte in bytes {
            self.state ^= u64::from(*byte);
            self.state = self.state.wrapping_mul(0x0100_0000_01b3_u64); // FNV-1a 64-bit prime
        }
        self
    }

    /// Finalize the hash and return the fingerprint
    #[must_use]
    pub fn finalize(self) -> u64 {
        let mut state = self.state;
        state ^= state >> 33;
        state = state.wrapping_mul(0xff51_afd7_ed55_8ccd_u64);
        state ^= state >> 33;
        state
    }
}

impl Default for TraceFingerprint {
    fn default() -> Self {
        Self::new()
    }
}
