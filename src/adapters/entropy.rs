//! Random source for allocation jitter.
//!
//! ESP-IDF reads the hardware RNG. The simulation backend draws from
//! `RandomState`, which is enough to spread out simulated allocatees.

use crate::app::ports::RandomSource;

#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareRng;

impl RandomSource for HardwareRng {
    #[cfg(target_os = "espidf")]
    fn next_u32(&mut self) -> u32 {
        // SAFETY: esp_random has no preconditions.
        unsafe { esp_idf_svc::sys::esp_random() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn next_u32(&mut self) -> u32 {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};

        RandomState::new().build_hasher().finish() as u32
    }
}
