use rand::{rngs::StdRng, SeedableRng};

/// Deterministic generator for an explicit seed.
pub fn rng_from_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Seed for a run that starts after `epochs_done` completed epochs, so a
/// resumed run does not replay the noise and batch order of its first epochs.
pub fn resume_seed(seed: u64, epochs_done: usize) -> u64 {
    seed.wrapping_add(epochs_done as u64)
}
