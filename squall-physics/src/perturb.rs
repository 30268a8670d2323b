use squall_core::{fields, Coupler, ModelError};

/// Marsaglia xorshift128. Deterministic, seedable, and good enough for
/// initial-condition noise.
struct Xor128 {
    x: u32,
    y: u32,
    z: u32,
    w: u32,
}

impl Xor128 {
    fn new(seed: u32) -> Self {
        let mut rng = Self {
            x: 123456789 ^ seed,
            y: 362436069,
            z: 521288629,
            w: 88675123 ^ seed.rotate_left(16),
        };
        // Warm up past the seed-dependent startup transient.
        for _ in 0..16 {
            rng.next_u32();
        }
        rng
    }

    fn next_u32(&mut self) -> u32 {
        let t = self.x ^ (self.x << 11);
        self.x = self.y;
        self.y = self.z;
        self.z = self.w;
        self.w = (self.w ^ (self.w >> 19)) ^ (t ^ (t >> 8));
        self.w
    }

    /// Uniform draw in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX)
    }
}

/// Maximum perturbation amplitude at the surface, K.
const AMPLITUDE: f64 = 3.0;

/// Randomly perturbs the lowest model layers of temperature to initiate
/// convection.
///
/// The perturbation is strongest at the surface and tapers linearly to zero
/// at the top of the perturbed slab (the bottom quarter of the domain). It
/// is deterministic for a given `seed`.
///
/// Must run after the column nudger captures its reference, so the
/// reference reflects the unperturbed sounding.
///
/// # Errors
///
/// Fails if the coupler state has not been allocated.
pub fn perturb_temperature(coupler: &mut Coupler, seed: u32) -> Result<(), ModelError> {
    let (nz, ny, nx) = coupler.shape()?.dim();
    let slab = (nz / 4).max(1);
    let mut rng = Xor128::new(seed);

    let temp = coupler.field_mut(fields::TEMP)?;
    for k in 0..slab {
        let taper = 1.0 - k as f64 / slab as f64;
        for j in 0..ny {
            for i in 0..nx {
                let noise = 2.0 * rng.next_f64() - 1.0;
                temp[[k, j, i]] += AMPLITUDE * taper * noise;
            }
        }
    }
    Ok(())
}
