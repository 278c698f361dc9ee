use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{PI, TAU};

use crate::math::{clamp_u8, hsv_to_rgb, pack_rgb, Vec3};
use crate::surfel::{Material, Surfel};

/// Disc radius relative to the mean sample spacing; above 1 so neighbors
/// overlap and the surface closes.
const COVERAGE: f32 = 1.4;

// --- Demo surfel generators ---

fn jitter_color(rng: &mut impl Rng, rgb: [u8; 3], amount: f32) -> u32 {
    pack_rgb([
        clamp_u8(rgb[0] as f32 + rng.random_range(-amount..amount)),
        clamp_u8(rgb[1] as f32 + rng.random_range(-amount..amount)),
        clamp_u8(rgb[2] as f32 + rng.random_range(-amount..amount)),
    ])
}

fn disc_radius(area: f32, count: usize) -> f32 {
    (area / (count.max(1) as f32 * PI)).sqrt() * COVERAGE
}

/// Fibonacci-lattice sphere, hue banded by latitude.
pub fn generate_sphere(rng: &mut impl Rng, count: usize, center: Vec3, radius: f32) -> Vec<Surfel> {
    let golden = PI * (3.0 - 5.0_f32.sqrt());
    let surfel_radius = disc_radius(4.0 * PI * radius * radius, count);
    let material = Material {
        specular: 0.6,
        shininess: 32.0,
        ..Material::default()
    };

    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden * i as f32;
            let normal = Vec3::new(r * theta.cos(), y, r * theta.sin());
            let hue = (y * 0.5 + 0.5) * 240.0;
            let color = jitter_color(rng, hsv_to_rgb(hue, 0.75, 0.95), 8.0);
            Surfel::new(center + normal * radius, normal, surfel_radius, color)
                .with_material(material)
        })
        .collect()
}

/// Torus around the y axis sampled on a jittered grid.
pub fn generate_torus(
    rng: &mut impl Rng,
    count: usize,
    center: Vec3,
    major: f32,
    minor: f32,
) -> Vec<Surfel> {
    let rings = ((count as f32 * major / minor).sqrt().round() as usize).max(3);
    let sides = (count / rings).max(3);
    let surfel_radius = disc_radius(4.0 * PI * PI * major * minor, rings * sides);

    let mut surfels = Vec::with_capacity(rings * sides);
    for ring in 0..rings {
        for side in 0..sides {
            let u = (ring as f32 + rng.random_range(0.0..0.3)) / rings as f32 * TAU;
            let v = (side as f32 + rng.random_range(0.0..0.3)) / sides as f32 * TAU;
            let normal = Vec3::new(v.cos() * u.cos(), v.sin(), v.cos() * u.sin());
            let ring_center = Vec3::new(major * u.cos(), 0.0, major * u.sin());
            let hue = u / TAU * 360.0;
            let color = jitter_color(rng, hsv_to_rgb(hue, 0.8, 0.9), 6.0);
            let position = center + ring_center + normal * minor;
            surfels.push(Surfel::new(position, normal, surfel_radius, color));
        }
    }
    surfels
}

/// Flat checkered disc facing +y.
pub fn generate_checkered_disc(
    rng: &mut impl Rng,
    center: Vec3,
    radius: f32,
    spacing: f32,
) -> Vec<Surfel> {
    let steps = (radius / spacing).ceil() as i32;
    let material = Material {
        specular: 0.05,
        ..Material::default()
    };
    let surfel_radius = spacing * 0.5 * COVERAGE * 2.0_f32.sqrt();

    let mut surfels = Vec::new();
    for iz in -steps..=steps {
        for ix in -steps..=steps {
            let x = ix as f32 * spacing;
            let z = iz as f32 * spacing;
            if x * x + z * z > radius * radius {
                continue;
            }
            let tile_size = spacing * 4.0;
            let tile =
                ((x / tile_size).floor() as i32 + (z / tile_size).floor() as i32).rem_euclid(2);
            let base = if tile == 0 { [210, 210, 200] } else { [60, 60, 70] };
            let color = jitter_color(rng, base, 5.0);
            surfels.push(
                Surfel::new(center + Vec3::new(x, 0.0, z), Vec3::Y, surfel_radius, color)
                    .with_material(material),
            );
        }
    }
    surfels
}

/// Sphere and torus over a checkered floor, reproducible for `seed`.
pub fn generate_demo_surfels(seed: u64) -> Vec<Surfel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut surfels = generate_sphere(&mut rng, 12_000, Vec3::new(-1.1, 0.0, 0.0), 0.8);
    surfels.extend(generate_torus(&mut rng, 16_000, Vec3::new(1.2, -0.2, 0.0), 0.7, 0.25));
    surfels.extend(generate_checkered_disc(&mut rng, Vec3::new(0.0, -1.0, 0.0), 3.0, 0.05));
    tracing::info!("generated demo scene with {} surfels", surfels.len());
    surfels
}
