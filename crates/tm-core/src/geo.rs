//! 3-D geometry primitives shared by every stage.
//!
//! All lengths are metres and all angles degrees, matching the host
//! simulator's conventions.  `f32` is deliberate: positions are bounded by
//! map extent (a few kilometres), so single precision keeps the per-actor
//! state cache half the size of an `f64` layout with no loss that matters
//! for control.

use std::ops::{Add, Mul, Neg, Sub};

// ── Vec3 ─────────────────────────────────────────────────────────────────────

/// A 3-D vector / location in metres.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, o: Vec3) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    #[inline]
    pub fn cross(self, o: Vec3) -> Vec3 {
        Vec3::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance_squared(self, o: Vec3) -> f32 {
        (self - o).length_squared()
    }

    #[inline]
    pub fn distance(self, o: Vec3) -> f32 {
        self.distance_squared(o).sqrt()
    }

    /// Planar (x/y) squared distance — junction and occupancy tests ignore z.
    #[inline]
    pub fn distance_squared_2d(self, o: Vec3) -> f32 {
        let dx = self.x - o.x;
        let dy = self.y - o.y;
        dx * dx + dy * dy
    }

    /// Unit vector in the same direction, or `ZERO` for a degenerate input.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    /// Copy with z forced to zero, for planar heading math.
    #[inline]
    pub fn flatten(self) -> Vec3 {
        Vec3::new(self.x, self.y, 0.0)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, o: Vec3) -> Vec3 {
        Vec3::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, s: f32) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    #[inline]
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ── Rotation ─────────────────────────────────────────────────────────────────

/// Euler rotation in degrees (pitch around Y, yaw around Z, roll around X).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    #[inline]
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Rotation with only a yaw component — the common case for road vehicles.
    #[inline]
    pub fn from_yaw(yaw: f32) -> Self {
        Self { pitch: 0.0, yaw, roll: 0.0 }
    }

    /// Unit vector pointing along the rotation's forward axis.
    pub fn forward_vector(self) -> Vec3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vec3::new(cp * cy, cp * sy, sp)
    }

    /// Unit vector pointing along the rotation's right axis.
    pub fn right_vector(self) -> Vec3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        let (sr, cr) = self.roll.to_radians().sin_cos();
        Vec3::new(cy * sr * sp - sy * cr, sy * sr * sp + cy * cr, -cp * sr)
    }
}

// ── Transform ────────────────────────────────────────────────────────────────

/// A pose: location plus orientation.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform {
    pub location: Vec3,
    pub rotation: Rotation,
}

impl Transform {
    #[inline]
    pub fn new(location: Vec3, rotation: Rotation) -> Self {
        Self { location, rotation }
    }

    #[inline]
    pub fn from_location(location: Vec3) -> Self {
        Self { location, rotation: Rotation::default() }
    }

    #[inline]
    pub fn forward_vector(self) -> Vec3 {
        self.rotation.forward_vector()
    }
}

// ── BoundingBox ──────────────────────────────────────────────────────────────

/// Axis-aligned half-extents of an actor in its local frame, plus the offset
/// of the box centre from the actor origin.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// Box centre relative to the actor's transform location.
    pub offset: Vec3,
    /// Half-extents along the local x (length), y (width), z (height) axes.
    pub extent: Vec3,
}

impl BoundingBox {
    #[inline]
    pub fn new(offset: Vec3, extent: Vec3) -> Self {
        Self { offset, extent }
    }

    /// Half the vehicle length — the forward reach of the box.
    #[inline]
    pub fn half_length(self) -> f32 {
        self.extent.x
    }

    /// Half the vehicle width.
    #[inline]
    pub fn half_width(self) -> f32 {
        self.extent.y
    }
}

/// Angle in degrees between two direction vectors, via planar dot product.
pub fn angle_between_deg(a: Vec3, b: Vec3) -> f32 {
    let dot = a.flatten().normalized().dot(b.flatten().normalized());
    dot.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Signed test: is `target` to the left (+) or right (−) of heading `forward`?
#[inline]
pub fn cross_sign_2d(forward: Vec3, target: Vec3) -> f32 {
    forward.x * target.y - forward.y * target.x
}
