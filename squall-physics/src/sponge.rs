use uom::si::{f64::Time, time::second};

use squall_core::{fields, Coupler, ModelError, Sponge};

/// Damping of spurious waves near the model top.
///
/// Relaxes the mandatory fields in the uppermost `num_layers` levels toward
/// their horizontal mean, with a quadratic strength profile that is full at
/// the top level and vanishes at the bottom of the sponge. Tracers are left
/// alone.
///
/// With a zero damping rate the state is returned bit-identical, so the
/// driver can apply the sponge unconditionally every iteration.
#[derive(Debug, Clone)]
pub struct SpongeLayer {
    /// Number of levels in the sponge, counted down from the model top.
    num_layers: usize,
    /// Peak relaxation rate at the top level, s^-1.
    rate: f64,
}

impl Default for SpongeLayer {
    fn default() -> Self {
        Self {
            num_layers: 5,
            rate: 1.0 / 60.0,
        }
    }
}

impl SpongeLayer {
    #[must_use]
    pub fn new(num_layers: usize, rate: f64) -> Self {
        Self { num_layers, rate }
    }

    /// A sponge that leaves the state untouched.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0, 0.0)
    }
}

impl Sponge for SpongeLayer {
    fn apply(&self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError> {
        if self.rate == 0.0 || self.num_layers == 0 {
            return Ok(());
        }
        let dt = dt.get::<second>();
        let (nz, ny, nx) = coupler.shape()?.dim();
        let layers = self.num_layers.min(nz);
        let horiz = (ny * nx) as f64;

        for name in fields::MANDATORY {
            let field = coupler.field_mut(name)?;
            for k in (nz - layers)..nz {
                // 0 at the sponge bottom, 1 at the model top.
                let depth = (k + 1 - (nz - layers)) as f64 / layers as f64;
                let weight = (self.rate * dt * depth * depth).min(1.0);

                let mut mean = 0.0;
                for j in 0..ny {
                    for i in 0..nx {
                        mean += field[[k, j, i]];
                    }
                }
                mean /= horiz;

                for j in 0..ny {
                    for i in 0..nx {
                        let value = field[[k, j, i]];
                        field[[k, j, i]] = value + weight * (mean - value);
                    }
                }
            }
        }
        Ok(())
    }
}
