//! PCG32 (XSH-RR) generator, seedable and reproducible across platforms

use glam::Vec3;

#[derive(Debug, Clone)]
pub struct ParticleRng {
    state: u64,
    inc: u64,
}

impl ParticleRng {
    /// Create a generator from a seed and a stream selector.
    ///
    /// Seeding matches the reference `pcg32_srandom_r`, so the first draw
    /// already depends on both inputs.
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (stream << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(seed);
        rng.next_u32();
        rng
    }

    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old
            .wrapping_mul(6364136223846793005)
            .wrapping_add(self.inc);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Returns a float in [0, 1)
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    /// Three independent floats in [0, 1)
    pub fn next_vec3(&mut self) -> Vec3 {
        let x = self.next_f32();
        let y = self.next_f32();
        let z = self.next_f32();
        Vec3::new(x, y, z)
    }
}
