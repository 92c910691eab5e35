//! Particle storage: 4-wide lanes for simulation, packed records for the GPU

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Lane width of the simulation store
pub const LANES: usize = 4;

/// Life assigned to free slots, so they never compare as alive
pub const DEAD_LIFE: f32 = 1.0e20;
/// Anything at or above this life is a free slot
pub const DEAD_LIFE_THRESHOLD: f32 = 1.0e19;

/// Four particles, one field per vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle4 {
    pub px: Vec4,
    pub py: Vec4,
    pub pz: Vec4,
    pub vx: Vec4,
    pub vy: Vec4,
    pub vz: Vec4,
    /// Remaining life fraction, 1 at spawn
    pub life: Vec4,
    pub seed: Vec4,
}

impl Particle4 {
    /// A block with all four slots free
    pub fn dead() -> Self {
        Self {
            px: Vec4::ZERO,
            py: Vec4::ZERO,
            pz: Vec4::ZERO,
            vx: Vec4::ZERO,
            vy: Vec4::ZERO,
            vz: Vec4::ZERO,
            life: Vec4::splat(DEAD_LIFE),
            seed: Vec4::ZERO,
        }
    }

    pub fn position(&self, lane: usize) -> Vec3 {
        Vec3::new(self.px[lane], self.py[lane], self.pz[lane])
    }

    pub fn velocity(&self, lane: usize) -> Vec3 {
        Vec3::new(self.vx[lane], self.vy[lane], self.vz[lane])
    }

    pub fn set(&mut self, lane: usize, position: Vec3, velocity: Vec3, life: f32, seed: f32) {
        self.px[lane] = position.x;
        self.py[lane] = position.y;
        self.pz[lane] = position.z;
        self.vx[lane] = velocity.x;
        self.vy[lane] = velocity.y;
        self.vz[lane] = velocity.z;
        self.life[lane] = life;
        self.seed[lane] = seed;
    }

    /// Per-lane occupancy: alive or dead-pending-reuse, but not free
    pub fn occupied(&self) -> [bool; LANES] {
        let mask = self.life.cmplt(Vec4::splat(DEAD_LIFE_THRESHOLD));
        [mask.test(0), mask.test(1), mask.test(2), mask.test(3)]
    }

    /// Transpose the block into per-particle records, in lane order
    pub fn transpose(&self) -> [GpuParticle; LANES] {
        std::array::from_fn(|lane| GpuParticle {
            position: self.position(lane).to_array(),
            life: self.life[lane],
            velocity: self.velocity(lane).to_array(),
            seed: self.seed[lane],
        })
    }
}

/// Render-ready particle, matches the WGSL `Particle` struct (32 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    pub position: [f32; 3],
    pub life: f32,
    pub velocity: [f32; 3],
    pub seed: f32,
}

/// Lane-packed particle store with a slot free list.
///
/// Every slot index `block * 4 + lane` is either on the free list (life at
/// the dead sentinel) or occupied.
#[derive(Debug, Clone, Default)]
pub struct ParticleLanes {
    blocks: Vec<Particle4>,
    free: Vec<u32>,
}

impl ParticleLanes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_mut(&mut self) -> &mut [Particle4] {
        &mut self.blocks
    }

    /// Total slot count (`blocks * 4`)
    pub fn capacity(&self) -> usize {
        self.blocks.len() * LANES
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Slots not on the free list
    pub fn occupied_count(&self) -> usize {
        self.blocks
            .iter()
            .map(|b| b.occupied().iter().filter(|&&o| o).count())
            .sum()
    }

    /// Take a free slot, growing by one block when none is left
    pub fn alloc(&mut self) -> u32 {
        if self.free.is_empty() {
            let base = (self.blocks.len() * LANES) as u32;
            self.blocks.push(Particle4::dead());
            // Popped from the back, so lane 0 is handed out first
            self.free.extend((0..LANES as u32).rev().map(|i| base + i));
        }
        match self.free.pop() {
            Some(index) => index,
            None => unreachable!("free list refilled above"),
        }
    }

    /// Write a freshly spawned particle into `index`
    pub fn spawn(&mut self, index: u32, position: Vec3, velocity: Vec3, seed: f32) {
        let (block, lane) = split(index);
        debug_assert!(
            self.blocks[block].life[lane] >= DEAD_LIFE_THRESHOLD,
            "slot {index} is already occupied"
        );
        self.blocks[block].set(lane, position, velocity, 1.0, seed);
    }

    /// Return every slot whose life ran out to the free list.
    ///
    /// Blocks where all lanes are still above zero are skipped with a single
    /// vector compare.
    pub fn recycle_expired(&mut self) -> usize {
        let mut freed = 0;
        for (b, block) in self.blocks.iter_mut().enumerate() {
            if block.life.cmpgt(Vec4::ZERO).all() {
                continue;
            }
            for lane in 0..LANES {
                if block.life[lane] <= 0.0 {
                    self.free.push((b * LANES + lane) as u32);
                    block.life[lane] = DEAD_LIFE;
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Append occupied particles to `out` in slot order, returning their bounds
    pub fn compact_into(&self, out: &mut Vec<GpuParticle>) -> Option<(Vec3, Vec3)> {
        out.clear();
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for block in &self.blocks {
            let occupied = block.occupied();
            let records = block.transpose();
            for (record, keep) in records.iter().zip(occupied) {
                if keep {
                    let p = Vec3::from_array(record.position);
                    min = min.min(p);
                    max = max.max(p);
                    out.push(*record);
                }
            }
        }
        (!out.is_empty()).then_some((min, max))
    }

    #[cfg(test)]
    pub(crate) fn free_indices(&self) -> &[u32] {
        &self.free
    }
}

#[inline]
fn split(index: u32) -> (usize, usize) {
    (index as usize / LANES, index as usize % LANES)
}
