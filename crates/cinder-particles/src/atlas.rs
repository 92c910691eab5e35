//! Curve atlas: slot allocation and row packing for baked per-type curves

use cinder_core::{CinderError, Result};
use tracing::debug;

use crate::curves::{bake_curve, bake_gradient, linear_to_srgb_u8, unorm_u8, Curve, Gradient};

/// Horizontal samples per baked row
pub const SAMPLE_RATE: u32 = 64;
/// Slots along x
pub const ATLAS_SLOTS_X: u32 = 8;
/// Slots along y
pub const ATLAS_SLOTS_Y: u32 = 256;
/// Row 0 holds the curve channels, row 1 the gradient
pub const ROWS_PER_SLOT: u32 = 2;
pub const ATLAS_WIDTH: u32 = SAMPLE_RATE * ATLAS_SLOTS_X;
pub const ATLAS_HEIGHT: u32 = ROWS_PER_SLOT * ATLAS_SLOTS_Y;
pub const ATLAS_CAPACITY: u32 = ATLAS_SLOTS_X * ATLAS_SLOTS_Y;

/// Texel layout of one slot: RGBA8, `SAMPLE_RATE` wide, `ROWS_PER_SLOT` high
pub const SLOT_BYTES: usize = (SAMPLE_RATE * ROWS_PER_SLOT * 4) as usize;

/// A sub-rectangle of RGBA8 texels to copy into the GPU atlas
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasUpload {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl AtlasUpload {
    /// Bytes per texel row (always 4 bytes per texel)
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}

/// Authored curve set for one effect type
#[derive(Debug, Clone, Copy)]
pub struct CurveSet<'a> {
    pub scale: &'a Curve,
    pub alpha: &'a Curve,
    pub additive: &'a Curve,
    pub erosion: &'a Curve,
    pub gradient: &'a Gradient,
}

/// Baked rows plus whether any channel had to be reordered
#[derive(Debug, Clone)]
pub struct BakedCurves {
    pub texels: Vec<u8>,
    pub reordered: Vec<&'static str>,
}

fn bake_channel(
    curve: &Curve,
    default: f32,
    name: &'static str,
    reordered: &mut Vec<&'static str>,
) -> Vec<f32> {
    if curve.is_empty() {
        return vec![default; SAMPLE_RATE as usize];
    }
    let (samples, was_reordered) = bake_curve(curve, SAMPLE_RATE as usize, 0.0, 1.0);
    if was_reordered {
        reordered.push(name);
    }
    samples
}

/// Bake a curve set into the `SLOT_BYTES` texels of one slot.
///
/// Row 0 packs `(scale, alpha, 1 - additive, erosion)` per texel; row 1
/// stores the sRGB-encoded gradient with opaque alpha.
pub fn bake_slot(curves: &CurveSet<'_>) -> BakedCurves {
    let mut reordered = Vec::new();
    let scale = bake_channel(curves.scale, 1.0, "scale_curve", &mut reordered);
    let alpha = bake_channel(curves.alpha, 1.0, "alpha_curve", &mut reordered);
    let additive = bake_channel(curves.additive, 0.0, "additive_curve", &mut reordered);
    let erosion = bake_channel(curves.erosion, 0.0, "erosion_curve", &mut reordered);
    let gradient = bake_gradient(curves.gradient, SAMPLE_RATE as usize);

    let mut texels = Vec::with_capacity(SLOT_BYTES);
    for i in 0..SAMPLE_RATE as usize {
        texels.extend_from_slice(&[
            unorm_u8(scale[i]),
            unorm_u8(alpha[i]),
            unorm_u8(1.0 - additive[i]),
            unorm_u8(erosion[i]),
        ]);
    }
    for color in &gradient {
        texels.extend_from_slice(&[
            linear_to_srgb_u8(color.x),
            linear_to_srgb_u8(color.y),
            linear_to_srgb_u8(color.z),
            255,
        ]);
    }

    BakedCurves { texels, reordered }
}

/// Position of a slot in the atlas, in slot units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasSlot(u32);

impl AtlasSlot {
    pub fn index(self) -> u32 {
        self.0
    }

    pub fn slot_x(self) -> u32 {
        self.0 % ATLAS_SLOTS_X
    }

    pub fn slot_y(self) -> u32 {
        self.0 / ATLAS_SLOTS_X
    }

    /// Texel origin of the slot
    pub fn texel_origin(self) -> (u32, u32) {
        (self.slot_x() * SAMPLE_RATE, self.slot_y() * ROWS_PER_SLOT)
    }

    /// `(uv_scale.x, uv_scale.y, uv_bias.x, uv_bias.y)` so that
    /// `uv = vec2(age, row) * scale + bias` lands on texel centers of the slot
    pub fn spline_mad(self) -> [f32; 4] {
        let (x, y) = self.texel_origin();
        let res_x = ATLAS_WIDTH as f32;
        let res_y = ATLAS_HEIGHT as f32;
        [
            (SAMPLE_RATE - 1) as f32 / res_x,
            1.0 / res_y,
            (x as f32 + 0.5) / res_x,
            (y as f32 + 0.5) / res_y,
        ]
    }
}

/// CPU-side bookkeeping for the shared curve atlas
#[derive(Debug)]
pub struct CurveAtlas {
    next_slot: u32,
    free_slots: Vec<AtlasSlot>,
}

impl CurveAtlas {
    pub fn new() -> Self {
        Self {
            next_slot: 0,
            free_slots: Vec::new(),
        }
    }

    pub fn allocated(&self) -> u32 {
        self.next_slot - self.free_slots.len() as u32
    }

    pub fn allocate(&mut self) -> Result<AtlasSlot> {
        if let Some(slot) = self.free_slots.pop() {
            return Ok(slot);
        }
        if self.next_slot >= ATLAS_CAPACITY {
            return Err(CinderError::AtlasFull {
                capacity: ATLAS_CAPACITY,
            });
        }
        let slot = AtlasSlot(self.next_slot);
        self.next_slot += 1;
        debug!(target: "particles", slot = slot.0, "allocated curve atlas slot");
        Ok(slot)
    }

    pub fn free(&mut self, slot: AtlasSlot) {
        debug_assert!(slot.0 < self.next_slot, "slot {} was never allocated", slot.0);
        debug_assert!(!self.free_slots.contains(&slot), "slot {} freed twice", slot.0);
        self.free_slots.push(slot);
    }

    /// Wrap baked texels into an upload covering `slot`
    pub fn upload_for(&self, slot: AtlasSlot, texels: Vec<u8>) -> AtlasUpload {
        debug_assert_eq!(texels.len(), SLOT_BYTES);
        let (x, y) = slot.texel_origin();
        AtlasUpload {
            x,
            y,
            width: SAMPLE_RATE,
            height: ROWS_PER_SLOT,
            data: texels,
        }
    }
}

impl Default for CurveAtlas {
    fn default() -> Self {
        Self::new()
    }
}
