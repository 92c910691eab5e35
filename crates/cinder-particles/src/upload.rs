//! Frame-bounded streaming of particle data into a ring of GPU regions
//!
//! Each render frame appends into region `frame % ring_depth`. An effect's
//! upload stays valid while it is younger than `ring_depth` frames and its
//! particles have not changed since. There is no completion query, so the
//! ring depth must cover the GPU's frame latency.

use serde::{Deserialize, Serialize};

use crate::particle::GpuParticle;

pub const GPU_PARTICLE_SIZE: u64 = std::mem::size_of::<GpuParticle>() as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Number of ring regions
    pub ring_depth: u32,
    /// Particles that may be uploaded in one frame, across all effects
    pub max_particles_per_frame: u32,
    /// Effects that may be uploaded in one frame
    pub max_uploads_per_frame: u32,
    /// Alignment of every upload's byte offset within a region
    pub offset_alignment: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            ring_depth: 16,
            max_particles_per_frame: 4096,
            max_uploads_per_frame: 256,
            offset_alignment: 256,
        }
    }
}

impl UploadConfig {
    /// Bytes one ring region must hold, including worst-case alignment padding
    pub fn region_size(&self) -> u64 {
        self.max_particles_per_frame as u64 * GPU_PARTICLE_SIZE
            + self.max_uploads_per_frame as u64 * self.offset_alignment as u64
    }
}

/// Per-effect record of where its particles currently live on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadCache {
    pub slot: u32,
    pub byte_offset: u64,
    /// Frame of the last upload, `None` before the first one
    pub frame: Option<u64>,
    /// The particles changed since the last upload
    pub stale: bool,
}

impl UploadCache {
    pub fn new() -> Self {
        Self {
            slot: 0,
            byte_offset: 0,
            frame: None,
            stale: true,
        }
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }
}

impl Default for UploadCache {
    fn default() -> Self {
        Self::new()
    }
}

/// What the renderer should do with one effect this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// The cached region still holds current data
    Reuse { slot: u32, byte_offset: u64 },
    /// Write the particles at `byte_offset` of region `slot`
    Upload { slot: u32, byte_offset: u64 },
    /// Out of budget for this frame
    Skip,
}

#[derive(Debug)]
pub struct FrameUploadAllocator {
    config: UploadConfig,
    frame: u64,
    cursor: u64,
    particles_left: u32,
    uploads_left: u32,
}

impl FrameUploadAllocator {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            config,
            frame: 0,
            cursor: 0,
            particles_left: 0,
            uploads_left: 0,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn current_slot(&self) -> u32 {
        (self.frame % self.config.ring_depth.max(1) as u64) as u32
    }

    /// Advance to the next frame's region and reset the budget
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.cursor = 0;
        self.particles_left = self.config.max_particles_per_frame;
        self.uploads_left = self.config.max_uploads_per_frame;
    }

    /// Decide whether `count` particles cached in `cache` need an upload.
    ///
    /// On `Upload` the budget is consumed and `cache` is updated to point at
    /// the new location; the caller must then write the data there.
    pub fn acquire(&mut self, cache: &mut UploadCache, count: u32) -> UploadDecision {
        if let Some(frame) = cache.frame {
            if !cache.stale && self.frame - frame < self.config.ring_depth as u64 {
                return UploadDecision::Reuse {
                    slot: cache.slot,
                    byte_offset: cache.byte_offset,
                };
            }
        }

        let align = self.config.offset_alignment.max(1) as u64;
        let offset = self.cursor.div_ceil(align) * align;
        let end = offset + count as u64 * GPU_PARTICLE_SIZE;
        if count > self.particles_left || self.uploads_left == 0 || end > self.config.region_size() {
            return UploadDecision::Skip;
        }

        self.particles_left -= count;
        self.uploads_left -= 1;
        self.cursor = end;

        let slot = self.current_slot();
        *cache = UploadCache {
            slot,
            byte_offset: offset,
            frame: Some(self.frame),
            stale: false,
        };
        UploadDecision::Upload {
            slot,
            byte_offset: offset,
        }
    }

    /// Particles uploaded so far this frame
    pub fn uploaded_particles(&self) -> u32 {
        self.config.max_particles_per_frame - self.particles_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small() -> UploadConfig {
        UploadConfig {
            ring_depth: 3,
            max_particles_per_frame: 100,
            max_uploads_per_frame: 8,
            offset_alignment: 64,
        }
    }

    #[test]
    fn fresh_cache_uploads_then_reuses() {
        let mut alloc = FrameUploadAllocator::new(small());
        let mut cache = UploadCache::new();

        alloc.begin_frame();
        assert_eq!(
            alloc.acquire(&mut cache, 10),
            UploadDecision::Upload { slot: 1, byte_offset: 0 }
        );

        alloc.begin_frame();
        assert_eq!(
            alloc.acquire(&mut cache, 10),
            UploadDecision::Reuse { slot: 1, byte_offset: 0 }
        );
        assert_eq!(alloc.uploaded_particles(), 0);
    }

    #[test]
    fn cache_expires_after_ring_depth() {
        let mut alloc = FrameUploadAllocator::new(small());
        let mut cache = UploadCache::new();
        alloc.begin_frame();
        alloc.acquire(&mut cache, 1);
        for _ in 0..3 {
            alloc.begin_frame();
        }
        // Region 1 is about to be overwritten
        assert!(matches!(
            alloc.acquire(&mut cache, 1),
            UploadDecision::Upload { slot: 1, .. }
        ));
    }

    #[test]
    fn stale_cache_reuploads() {
        let mut alloc = FrameUploadAllocator::new(small());
        let mut cache = UploadCache::new();
        alloc.begin_frame();
        alloc.acquire(&mut cache, 4);
        cache.mark_stale();
        alloc.begin_frame();
        assert!(matches!(alloc.acquire(&mut cache, 4), UploadDecision::Upload { slot: 2, .. }));
    }

    #[test]
    fn offsets_are_aligned() {
        let mut alloc = FrameUploadAllocator::new(small());
        alloc.begin_frame();
        let mut a = UploadCache::new();
        let mut b = UploadCache::new();
        alloc.acquire(&mut a, 3);
        alloc.acquire(&mut b, 3);
        assert_eq!(a.byte_offset, 0);
        assert_eq!(b.byte_offset, 128);
    }

    #[test]
    fn skip_does_not_block_smaller_effects() {
        let mut alloc = FrameUploadAllocator::new(small());
        alloc.begin_frame();
        let mut big = UploadCache::new();
        let mut huge = UploadCache::new();
        let mut tiny = UploadCache::new();
        assert!(matches!(alloc.acquire(&mut big, 90), UploadDecision::Upload { .. }));
        assert_eq!(alloc.acquire(&mut huge, 20), UploadDecision::Skip);
        assert_eq!(huge, UploadCache::new());
        assert!(matches!(alloc.acquire(&mut tiny, 10), UploadDecision::Upload { .. }));
        assert_eq!(alloc.uploaded_particles(), 100);

        alloc.begin_frame();
        assert!(matches!(alloc.acquire(&mut huge, 20), UploadDecision::Upload { .. }));
    }

    proptest! {
        #[test]
        fn uploads_never_exceed_budget(counts in prop::collection::vec(0u32..60, 0..20)) {
            let config = small();
            let mut alloc = FrameUploadAllocator::new(config);
            alloc.begin_frame();
            let mut uploaded = 0u32;
            for count in counts {
                let mut cache = UploadCache::new();
                if let UploadDecision::Upload { byte_offset, .. } = alloc.acquire(&mut cache, count) {
                    uploaded += count;
                    prop_assert_eq!(byte_offset % config.offset_alignment as u64, 0);
                    prop_assert!(byte_offset + count as u64 * GPU_PARTICLE_SIZE <= config.region_size());
                }
            }
            prop_assert!(uploaded <= config.max_particles_per_frame);
        }
    }
}
