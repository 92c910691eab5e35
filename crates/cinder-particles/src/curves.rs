//! Curve baking: uniform cubic B-spline channels and color gradients
//!
//! Authored curves are small lists of 2D control points. They are baked once
//! per effect type into fixed-resolution rows of the curve atlas so the
//! shader can look them up by normalized particle age.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Binary-search resolution over the curve parameter of one segment
const INVERSION_STEPS: u32 = 512;

/// An authored curve: `(x, y)` control points, x usually in [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Curve {
    pub points: Vec<[f32; 2]>,
}

impl Curve {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One color stop of a gradient (linear RGB)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientPoint {
    pub t: f32,
    pub color: [f32; 3],
}

/// Piecewise-linear color over normalized age
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gradient {
    pub default_color: [f32; 3],
    pub points: Vec<GradientPoint>,
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            default_color: [1.0, 1.0, 1.0],
            points: Vec::new(),
        }
    }
}

#[inline]
fn bspline_weights(t: f32) -> [f32; 4] {
    let nt = 1.0 - t;
    let t2 = t * t;
    let t3 = t2 * t;
    [
        nt * nt * nt / 6.0,
        (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0,
        (-3.0 * t3 + 3.0 * t2 + 3.0 * t + 1.0) / 6.0,
        t3 / 6.0,
    ]
}

#[inline]
fn evaluate_bspline(w: [f32; 4], a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> Vec2 {
    a * w[0] + b * w[1] + c * w[2] + d * w[3]
}

/// Whether x(t) is non-decreasing. For a uniform cubic B-spline this holds
/// exactly when the control x values are sorted.
pub fn is_monotonic_x(points: &[Vec2]) -> bool {
    points.windows(2).all(|w| w[0].x <= w[1].x)
}

/// Sample `out.len()` evenly spaced y values of the curve over `[x_min, x_max]`.
///
/// Each segment blends a 4-point window (ends clamped by repeating the
/// boundary point). For every target x a fixed-iteration binary search finds
/// the first t whose blended x reaches the target; the blended y at that t is
/// written out. Targets past the end of the curve repeat the last value.
///
/// The search assumes `points` is sorted by x (see [`is_monotonic_x`]).
pub fn discretize_bspline_y(out: &mut [f32], points: &[Vec2], x_min: f32, x_max: f32) {
    let Some(last) = points.last() else {
        out.fill(0.0);
        return;
    };
    if out.is_empty() {
        return;
    }
    if out.len() == 1 || points.len() == 1 {
        out.fill(points[0].y);
        return;
    }
    debug_assert!(is_monotonic_x(points), "curve x must be non-decreasing");

    let x_step = (x_max - x_min) / (out.len() - 1) as f32;
    let step_size = 1.0 / (INVERSION_STEPS - 1) as f32;
    let n = points.len() as isize;
    let at = |i: isize| points[i.clamp(0, n - 1) as usize];

    let mut cur_x = x_min;
    let mut written = 0usize;

    'segments: for i in -1..n {
        let (a, b, c, d) = (at(i - 1), at(i), at(i + 1), at(i + 2));
        let seg_max_x = (b.x + 4.0 * c.x + d.x) * (1.0 / 6.0);

        while cur_x <= seg_max_x {
            let mut first = 0u32;
            let mut count = INVERSION_STEPS;
            while count > 0 {
                let step = count >> 1;
                let it = first + step;
                let x = evaluate_bspline(bspline_weights(it as f32 * step_size), a, b, c, d).x;
                if x < cur_x {
                    first = it + 1;
                    count -= step + 1;
                } else {
                    count = step;
                }
            }

            let t = first.min(INVERSION_STEPS - 1) as f32 * step_size;
            out[written] = evaluate_bspline(bspline_weights(t), a, b, c, d).y;
            written += 1;
            if written == out.len() {
                break 'segments;
            }
            cur_x = if written == out.len() - 1 {
                x_max
            } else {
                x_min + x_step * written as f32
            };
        }
    }

    let fill = if written > 0 { out[written - 1] } else { last.y };
    out[written..].fill(fill);
}

/// Bake a curve channel, sorting out-of-order control points first.
///
/// Returns the samples and whether the authored points had to be reordered.
pub fn bake_curve(curve: &Curve, samples: usize, x_min: f32, x_max: f32) -> (Vec<f32>, bool) {
    let mut points: Vec<Vec2> = curve.points.iter().map(|p| Vec2::from_array(*p)).collect();
    let reordered = !is_monotonic_x(&points);
    if reordered {
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    let mut out = vec![0.0; samples];
    discretize_bspline_y(&mut out, &points, x_min, x_max);
    (out, reordered)
}

/// Sample a gradient at `samples` evenly spaced t in [0, 1] (linear RGB)
pub fn bake_gradient(gradient: &Gradient, samples: usize) -> Vec<Vec3> {
    let fallback = [GradientPoint {
        t: 1.0,
        color: gradient.default_color,
    }];
    let points: &[GradientPoint] = if gradient.points.is_empty() {
        &fallback
    } else {
        &gradient.points
    };

    let step = if samples > 1 { 1.0 / (samples - 1) as f32 } else { 0.0 };
    let mut ix = 0usize;
    (0..samples)
        .map(|i| {
            let t = i as f32 * step;
            while ix < points.len() && t >= points[ix].t {
                ix += 1;
            }
            if ix == 0 {
                Vec3::from_array(points[0].color)
            } else if ix == points.len() {
                Vec3::from_array(points[points.len() - 1].color)
            } else {
                let p0 = &points[ix - 1];
                let p1 = &points[ix];
                let rel = (t - p0.t) / (p1.t - p0.t);
                Vec3::from_array(p0.color).lerp(Vec3::from_array(p1.color), rel)
            }
        })
        .collect()
}

/// Linear [0, 1] to 8-bit sRGB
pub fn linear_to_srgb_u8(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let s = if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    (s * 255.0 + 0.5) as u8
}

/// Quantize a [0, 1] channel value to a byte (truncating)
pub fn unorm_u8(v: f32) -> u8 {
    ((v * 255.0) as i32).clamp(0, 255) as u8
}
