// CLASSIFICATION: COMMUNITY
// Filename: failure.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Probabilistic failure gate.
//!
//! One shared instance is consulted at the top of every mutating lake
//! operation. Each draw is independent; the gate keeps no history of past
//! outcomes.

use std::sync::{Mutex, PoisonError};

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LakeError, LakeResult};

/// Gate that turns a configured share of operations into
/// [`LakeError::SimulatedServiceFailure`].
pub struct FailureInjector {
    chance: f64,
    rng: Mutex<StdRng>,
}

impl FailureInjector {
    /// Gate seeded from OS entropy.
    pub fn new(chance: f64) -> LakeResult<Self> {
        Self::with_rng(chance, StdRng::from_entropy())
    }

    /// Deterministic gate for reproducible runs.
    pub fn seeded(chance: f64, seed: u64) -> LakeResult<Self> {
        Self::with_rng(chance, StdRng::seed_from_u64(seed))
    }

    fn with_rng(chance: f64, rng: StdRng) -> LakeResult<Self> {
        if !(0.0..=1.0).contains(&chance) {
            return Err(LakeError::InvalidConfig(format!(
                "failure chance {} is outside [0, 1]",
                chance
            )));
        }
        Ok(Self {
            chance,
            rng: Mutex::new(rng),
        })
    }

    pub fn chance(&self) -> f64 {
        self.chance
    }

    /// One weighted draw.
    pub fn should_fail(&self) -> bool {
        if self.chance <= 0.0 {
            return false;
        }
        if self.chance >= 1.0 {
            return true;
        }
        let draw: f64 = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen();
        draw < self.chance
    }

    /// Fail `op` if the draw says so.
    pub fn gate(&self, op: &str) -> LakeResult<()> {
        if self.should_fail() {
            warn!("injected failure for {}", op);
            return Err(LakeError::SimulatedServiceFailure);
        }
        Ok(())
    }
}
