//! # Spawn Modules
//!
//! A spawn module decides where a new particle starts and which way it
//! points. Shapes are plain data sampled with the owning group's seeded
//! rng - identical seeds reproduce identical emission patterns.
//!
//! All distributions are uniform over the shape unless documented
//! otherwise on the variant.

use crate::value::{ColorValue, ScalarValue, Vec3Value};
use cinder_core::{Transform, Vec3, Vec4};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Initial attribute row for one newly spawned particle.
///
/// Produced by [`SpawnParams::sample_init`]; consumed identically by
/// CPU storage writes and GPU staging rows.
#[derive(Clone, Copy, Debug)]
pub struct ParticleInit {
    /// Spawn position (world or emitter-local space).
    pub position: Vec3,
    /// Initial velocity.
    pub velocity: Vec3,
    /// Per-axis scale.
    pub scale: Vec3,
    /// Rotation in radians.
    pub rotation: f32,
    /// RGBA color.
    pub color: Vec4,
    /// Lifetime in seconds.
    pub lifetime: f32,
}

/// Emission shape for newly spawned particles.
///
/// `sample` returns a local-space `(position, direction)` pair; the
/// group maps both through the emitter origin transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SpawnShape {
    /// All particles start at the origin, pointing up.
    Point,
    /// Uniform inside an axis-aligned box.
    BoxVolume {
        /// Half extents along each axis.
        half_extents: Vec3,
    },
    /// Uniform inside a flat disc in the XZ plane; direction is radial.
    Circle {
        /// Disc radius.
        radius: f32,
    },
    /// Uniform over a cone of directions around +Y, starting inside a
    /// base disc.
    Cone {
        /// Half-angle of the cone in radians.
        angle: f32,
        /// Base disc radius.
        radius: f32,
    },
    /// Uniform inside a sphere; direction is radial.
    Sphere {
        /// Sphere radius.
        radius: f32,
    },
    /// Uniform inside the upper (+Y) half of a sphere; direction is
    /// radial.
    Hemisphere {
        /// Hemisphere radius.
        radius: f32,
    },
    /// One of the authored vertices, chosen uniformly; direction points
    /// away from the origin (up if the vertex is the origin).
    PolygonVertices {
        /// Vertex positions in emitter-local space.
        vertices: Vec<Vec3>,
    },
}

impl Default for SpawnShape {
    fn default() -> Self {
        Self::Point
    }
}

impl SpawnShape {
    /// Samples one `(position, direction)` pair in emitter-local space.
    ///
    /// The direction is always unit length (or +Y in degenerate cases),
    /// so callers can scale it by a speed without renormalizing.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> (Vec3, Vec3) {
        match self {
            Self::Point => (Vec3::ZERO, Vec3::Y),
            Self::BoxVolume { half_extents } => {
                let p = Vec3::new(
                    rng.gen_range(-1.0..=1.0_f32) * half_extents.x,
                    rng.gen_range(-1.0..=1.0_f32) * half_extents.y,
                    rng.gen_range(-1.0..=1.0_f32) * half_extents.z,
                );
                (p, Vec3::Y)
            }
            Self::Circle { radius } => {
                // sqrt keeps area density uniform across the disc
                let r = radius.max(0.0) * rng.gen::<f32>().sqrt();
                let theta = rng.gen_range(0.0..std::f32::consts::TAU);
                let dir = Vec3::new(theta.cos(), 0.0, theta.sin());
                (dir * r, radial_or_up(dir))
            }
            Self::Cone { angle, radius } => {
                // Uniform over the solid angle of the cone cap
                let cos_max = angle.clamp(0.0, std::f32::consts::PI).cos();
                let cos_theta = rng.gen_range(cos_max..=1.0_f32);
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = rng.gen_range(0.0..std::f32::consts::TAU);
                let dir = Vec3::new(phi.cos() * sin_theta, cos_theta, phi.sin() * sin_theta);

                let r = radius.max(0.0) * rng.gen::<f32>().sqrt();
                let base_theta = rng.gen_range(0.0..std::f32::consts::TAU);
                let base = Vec3::new(base_theta.cos() * r, 0.0, base_theta.sin() * r);
                (base, dir)
            }
            Self::Sphere { radius } => {
                let dir = unit_sphere_dir(rng);
                // cbrt keeps volume density uniform
                let r = radius.max(0.0) * rng.gen::<f32>().cbrt();
                (dir * r, dir)
            }
            Self::Hemisphere { radius } => {
                let mut dir = unit_sphere_dir(rng);
                dir.y = dir.y.abs();
                let r = radius.max(0.0) * rng.gen::<f32>().cbrt();
                (dir * r, dir)
            }
            Self::PolygonVertices { vertices } => {
                if vertices.is_empty() {
                    return (Vec3::ZERO, Vec3::Y);
                }
                let v = vertices[rng.gen_range(0..vertices.len())];
                (v, radial_or_up(v.normalize_or_zero()))
            }
        }
    }
}

/// Uniform direction on the unit sphere (Archimedes' cylinder mapping).
fn unit_sphere_dir<R: Rng>(rng: &mut R) -> Vec3 {
    let y = rng.gen_range(-1.0..=1.0_f32);
    let theta = rng.gen_range(0.0..std::f32::consts::TAU);
    let r = (1.0 - y * y).max(0.0).sqrt();
    Vec3::new(theta.cos() * r, y, theta.sin() * r)
}

/// Falls back to +Y when a radial direction is degenerate.
fn radial_or_up(dir: Vec3) -> Vec3 {
    if dir.length_squared() > f32::EPSILON {
        dir
    } else {
        Vec3::Y
    }
}

/// Everything a group needs to initialize one new particle.
///
/// All value definitions are evaluated at age zero; missing fields in
/// authored documents fall back to neutral defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnParams {
    /// Emission shape.
    pub shape: SpawnShape,
    /// Initial lifetime in seconds.
    pub lifetime: ScalarValue,
    /// Speed along the shape's sampled direction.
    pub speed: ScalarValue,
    /// Additive base velocity, independent of the shape direction.
    pub velocity: Vec3Value,
    /// Initial per-axis scale.
    pub scale: Vec3Value,
    /// Initial rotation in radians.
    pub rotation: ScalarValue,
    /// Initial color.
    pub color: ColorValue,
}

impl Default for SpawnParams {
    fn default() -> Self {
        Self {
            shape: SpawnShape::Point,
            lifetime: ScalarValue::Constant(1.0),
            speed: ScalarValue::Constant(0.0),
            velocity: Vec3Value::default(),
            scale: Vec3Value::Constant(Vec3::ONE),
            rotation: ScalarValue::default(),
            color: ColorValue::Constant(Vec4::ONE),
        }
    }
}

impl SpawnParams {
    /// Samples one complete initial row.
    ///
    /// When `world_space` is set the sampled position and direction are
    /// mapped through the emitter origin; otherwise they stay
    /// emitter-local and the renderer applies the origin per draw.
    pub fn sample_init<R: Rng>(
        &self,
        origin: &Transform,
        world_space: bool,
        rng: &mut R,
    ) -> ParticleInit {
        let (local_pos, local_dir) = self.shape.sample(rng);
        let (position, direction) = if world_space {
            (
                origin.transform_point(local_pos),
                origin.transform_vector(local_dir),
            )
        } else {
            (local_pos, local_dir)
        };
        let speed = self.speed.sample_spawn(rng);
        ParticleInit {
            position,
            velocity: direction * speed + self.velocity.sample_spawn(rng),
            scale: self.scale.sample_spawn(rng),
            rotation: self.rotation.sample_spawn(rng),
            color: self.color.sample_spawn(rng),
            lifetime: self.lifetime.sample_spawn(rng).max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sphere_samples_inside_radius() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let shape = SpawnShape::Sphere { radius: 2.0 };
        for _ in 0..256 {
            let (p, dir) = shape.sample(&mut rng);
            assert!(p.length() <= 2.0 + 1e-4);
            assert!((dir.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_hemisphere_stays_above_plane() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let shape = SpawnShape::Hemisphere { radius: 1.0 };
        for _ in 0..256 {
            let (p, _) = shape.sample(&mut rng);
            assert!(p.y >= -1e-6);
        }
    }

    #[test]
    fn test_cone_directions_within_angle() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let angle = 0.5_f32;
        let shape = SpawnShape::Cone { angle, radius: 0.0 };
        for _ in 0..256 {
            let (_, dir) = shape.sample(&mut rng);
            // dir.y = cos(theta); theta <= angle
            assert!(dir.y >= angle.cos() - 1e-4);
        }
    }

    #[test]
    fn test_box_inside_extents() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let he = Vec3::new(1.0, 2.0, 3.0);
        let shape = SpawnShape::BoxVolume { half_extents: he };
        for _ in 0..128 {
            let (p, _) = shape.sample(&mut rng);
            assert!(p.x.abs() <= he.x && p.y.abs() <= he.y && p.z.abs() <= he.z);
        }
    }

    #[test]
    fn test_empty_polygon_degrades() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let shape = SpawnShape::PolygonVertices { vertices: Vec::new() };
        let (p, dir) = shape.sample(&mut rng);
        assert_eq!(p, Vec3::ZERO);
        assert_eq!(dir, Vec3::Y);
    }

    #[test]
    fn test_spawn_params_round_trip() {
        let params = SpawnParams {
            shape: SpawnShape::Cone { angle: 0.4, radius: 0.1 },
            lifetime: ScalarValue::RandomRange { min: 1.0, max: 2.0 },
            speed: ScalarValue::Constant(3.0),
            ..SpawnParams::default()
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: SpawnParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn test_spawn_params_missing_fields_default() {
        let back: SpawnParams = serde_json::from_str(r#"{"speed": {"constant": 5.0}}"#).unwrap();
        assert_eq!(back.speed, ScalarValue::Constant(5.0));
        assert_eq!(back.shape, SpawnShape::Point);
        assert_eq!(back.lifetime, ScalarValue::Constant(1.0));
    }
}
