use ndarray::Array3;
use uom::si::{f64::Time, time::second};

use squall_core::{fields, Coupler, Dynamics, Initialize, ModelError, Stepper};

use crate::kessler::WATER_VAPOR;

/// A deliberately compact stratified dynamical core.
///
/// `init` fills the coupler with a hydrostatically stratified base state
/// (density decreasing with height, a sheared zonal wind, and a moist
/// boundary layer); `compute_time_step` returns the CFL-limited stable step
/// for the current winds and sound speed; `time_step` sub-cycles at that
/// stable step and applies first-order upwind transport of every field,
/// plus a buoyancy acceleration on vertical velocity relative to the
/// horizontal-mean temperature.
///
/// Boundaries are periodic in x and y and rigid in z.
///
/// # Precondition
///
/// Microphysics must initialize first: this module seeds the moisture
/// profile into the `water_vapor` tracer that microphysics registers, and
/// fails with an unknown-field error if it is missing.
#[derive(Debug, Clone)]
pub struct StratifiedDycore {
    /// CFL safety factor applied to the advective stability limit.
    cfl: f64,
    /// Surface temperature of the base state, K.
    surface_temp: f64,
    /// Base-state lapse rate, K m^-1.
    lapse_rate: f64,
    /// Grid spacing, set during init.
    spacing: Option<(f64, f64, f64)>,
}

impl Default for StratifiedDycore {
    fn default() -> Self {
        Self {
            cfl: 0.7,
            surface_temp: 300.0,
            lapse_rate: 0.0065,
            spacing: None,
        }
    }
}

impl StratifiedDycore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn spacing(&self) -> Result<(f64, f64, f64), ModelError> {
        self.spacing
            .ok_or_else(|| ModelError::physics("dycore", "init was not run"))
    }

    /// Base-state temperature at height `z`, floored to stay stratospheric
    /// rather than unphysical.
    fn base_temp(&self, z: f64) -> f64 {
        (self.surface_temp - self.lapse_rate * z).max(210.0)
    }
}

/// First-order upwind advection of `field` by the frozen wind fields.
///
/// Periodic in x and y; one-sided (zero-gradient) at the rigid top and
/// bottom.
fn advect_upwind(
    field: &Array3<f64>,
    uvel: &Array3<f64>,
    vvel: &Array3<f64>,
    wvel: &Array3<f64>,
    dt: f64,
    (dz, dy, dx): (f64, f64, f64),
) -> Array3<f64> {
    let (nz, ny, nx) = field.dim();
    let mut out = field.clone();
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let idx = [k, j, i];
                let c = field[idx];

                let u = uvel[idx];
                let grad_x = if u >= 0.0 {
                    (c - field[[k, j, (i + nx - 1) % nx]]) / dx
                } else {
                    (field[[k, j, (i + 1) % nx]] - c) / dx
                };

                let v = vvel[idx];
                let grad_y = if v >= 0.0 {
                    (c - field[[k, (j + ny - 1) % ny, i]]) / dy
                } else {
                    (field[[k, (j + 1) % ny, i]] - c) / dy
                };

                let w = wvel[idx];
                let grad_z = if w >= 0.0 {
                    if k == 0 { 0.0 } else { (c - field[[k - 1, j, i]]) / dz }
                } else if k + 1 == nz {
                    0.0
                } else {
                    (field[[k + 1, j, i]] - c) / dz
                };

                out[idx] = c - dt * (u * grad_x + v * grad_y + w * grad_z);
            }
        }
    }
    out
}

impl Initialize for StratifiedDycore {
    fn init(&mut self, coupler: &mut Coupler) -> Result<(), ModelError> {
        let shape = coupler.shape()?;
        let extent = coupler.extent()?;
        let constants = coupler.constants()?;
        let (nz, ny, nx) = shape.dim();
        let dx = extent.xlen / nx as f64;
        let dy = extent.ylen / ny as f64;
        let dz = extent.zlen / nz as f64;
        self.spacing = Some((dz, dy, dx));

        // Tracers are registered by microphysics before this runs.
        coupler.field(WATER_VAPOR)?;

        let mut density = coupler.field(fields::DENSITY_DRY)?.clone();
        let mut temp = coupler.field(fields::TEMP)?.clone();
        let mut uvel = coupler.field(fields::UVEL)?.clone();
        let mut qv = coupler.field(WATER_VAPOR)?.clone();

        for k in 0..nz {
            let z = (k as f64 + 0.5) * dz;
            let t = self.base_temp(z);
            let rho = constants.p0 / (constants.r_d * self.surface_temp)
                * (-constants.grav * z / (constants.r_d * self.surface_temp)).exp();
            // Sheared zonal wind: 5 m/s at the surface ramping to 20 m/s.
            let shear = (z / 5000.0).min(1.0);
            let u = 5.0 + 15.0 * shear;
            // Moist boundary layer decaying aloft.
            let rv = 0.014 * (-z / 3000.0).exp();
            for j in 0..ny {
                for i in 0..nx {
                    density[[k, j, i]] = rho;
                    temp[[k, j, i]] = t;
                    uvel[[k, j, i]] = u;
                    qv[[k, j, i]] = rv * rho;
                }
            }
        }

        *coupler.field_mut(fields::DENSITY_DRY)? = density;
        *coupler.field_mut(fields::TEMP)? = temp;
        *coupler.field_mut(fields::UVEL)? = uvel;
        *coupler.field_mut(WATER_VAPOR)? = qv;
        Ok(())
    }
}

impl Stepper for StratifiedDycore {
    fn time_step(&mut self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError> {
        let dt = dt.get::<second>();
        if dt <= 0.0 {
            return Ok(());
        }
        let spacing = self.spacing()?;
        let constants = coupler.constants()?;
        let (nz, ny, nx) = coupler.shape()?.dim();

        let stable = self.compute_time_step(coupler)?.get::<second>();
        let nsub = (dt / stable).ceil().max(1.0) as usize;
        let dt_sub = dt / nsub as f64;

        let names: Vec<String> = coupler.field_names().map(str::to_string).collect();
        for _ in 0..nsub {
            // Winds are frozen for the duration of one sub-step.
            let uvel = coupler.field(fields::UVEL)?.clone();
            let vvel = coupler.field(fields::VVEL)?.clone();
            let wvel = coupler.field(fields::WVEL)?.clone();

            for name in &names {
                let advected =
                    advect_upwind(coupler.field(name)?, &uvel, &vvel, &wvel, dt_sub, spacing);
                *coupler.field_mut(name)? = advected;
            }

            // Buoyancy relative to the horizontal-mean temperature at each
            // level drives vertical motion.
            let temp = coupler.field(fields::TEMP)?.clone();
            let horiz = (ny * nx) as f64;
            let wvel = coupler.field_mut(fields::WVEL)?;
            for k in 0..nz {
                let mut mean = 0.0;
                for j in 0..ny {
                    for i in 0..nx {
                        mean += temp[[k, j, i]];
                    }
                }
                mean /= horiz;
                for j in 0..ny {
                    for i in 0..nx {
                        let buoy = constants.grav * (temp[[k, j, i]] - mean) / mean;
                        wvel[[k, j, i]] += dt_sub * buoy;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Dynamics for StratifiedDycore {
    fn compute_time_step(&self, coupler: &Coupler) -> Result<Time, ModelError> {
        let (dz, dy, dx) = self.spacing()?;
        let constants = coupler.constants()?;

        let max_abs = |name: &str| -> Result<f64, ModelError> {
            Ok(coupler.field(name)?.iter().fold(0.0_f64, |m, &v| m.max(v.abs())))
        };
        let max_u = max_abs(fields::UVEL)?;
        let max_v = max_abs(fields::VVEL)?;
        let max_w = max_abs(fields::WVEL)?;
        let max_t = coupler
            .field(fields::TEMP)?
            .iter()
            .fold(0.0_f64, |m, &v| m.max(v));
        if max_t <= 0.0 {
            return Err(ModelError::physics(
                "dycore",
                "temperature field is not positive",
            ));
        }

        let gamma = constants.cp_d / constants.cv_d();
        let sound = (gamma * constants.r_d * max_t).sqrt();
        let dt = self.cfl
            * (dx / (max_u + sound))
                .min(dy / (max_v + sound))
                .min(dz / (max_w + sound));
        Ok(Time::new::<second>(dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::kessler::KesslerMicro;

    fn seconds(value: f64) -> Time {
        Time::new::<second>(value)
    }

    fn init_coupler() -> (Coupler, StratifiedDycore) {
        let mut coupler = Coupler::new();
        coupler.set_phys_constants(KesslerMicro::constants()).unwrap();
        coupler.allocate_state(10, 4, 4).unwrap();
        coupler.set_grid(20_000.0, 20_000.0, 10_000.0);
        let mut micro = KesslerMicro::new();
        micro.init(&mut coupler).unwrap();
        let mut dycore = StratifiedDycore::new();
        dycore.init(&mut coupler).unwrap();
        (coupler, dycore)
    }

    #[test]
    fn init_requires_the_vapor_tracer() {
        let mut coupler = Coupler::new();
        coupler.set_phys_constants(KesslerMicro::constants()).unwrap();
        coupler.allocate_state(4, 2, 2).unwrap();
        coupler.set_grid(1000.0, 1000.0, 2000.0);

        let mut dycore = StratifiedDycore::new();
        assert!(dycore.init(&mut coupler).is_err());
    }

    #[test]
    fn base_state_is_stratified() {
        let (coupler, _) = init_coupler();
        let density = coupler.field(fields::DENSITY_DRY).unwrap();
        let temp = coupler.field(fields::TEMP).unwrap();
        for k in 1..10 {
            assert!(density[[k, 0, 0]] < density[[k - 1, 0, 0]]);
            assert!(temp[[k, 0, 0]] <= temp[[k - 1, 0, 0]]);
        }
        // Wind shear increases with height.
        let uvel = coupler.field(fields::UVEL).unwrap();
        assert!(uvel[[9, 0, 0]] > uvel[[0, 0, 0]]);
    }

    #[test]
    fn stable_step_is_positive_and_acoustically_limited() {
        let (coupler, dycore) = init_coupler();
        let dt = dycore.compute_time_step(&coupler).unwrap().get::<second>();
        assert!(dt > 0.0);
        // Sound speed at 300 K is ~347 m/s; dz = 1000 m, so the vertical
        // limit is a few seconds at most.
        assert!(dt < 5_000.0 / 347.0);
    }

    #[test]
    fn stronger_winds_shrink_the_stable_step() {
        let (mut coupler, dycore) = init_coupler();
        let dt_before = dycore.compute_time_step(&coupler).unwrap();
        coupler.field_mut(fields::UVEL).unwrap().fill(200.0);
        let dt_after = dycore.compute_time_step(&coupler).unwrap();
        assert!(dt_after < dt_before);
    }

    #[test]
    fn uniform_fields_are_invariant_under_transport() {
        let (mut coupler, mut dycore) = init_coupler();
        // Flatten everything so there is nothing to advect or lift.
        for name in [fields::DENSITY_DRY, fields::TEMP] {
            coupler.field_mut(name).unwrap().fill(1.0);
        }
        coupler.field_mut(fields::TEMP).unwrap().fill(300.0);
        coupler.field_mut(fields::UVEL).unwrap().fill(10.0);
        coupler.field_mut(fields::VVEL).unwrap().fill(0.0);
        coupler.field_mut(fields::WVEL).unwrap().fill(0.0);
        coupler.field_mut(WATER_VAPOR).unwrap().fill(0.005);

        dycore.time_step(&mut coupler, seconds(10.0)).unwrap();

        let temp = coupler.field(fields::TEMP).unwrap();
        let qv = coupler.field(WATER_VAPOR).unwrap();
        for (&t, &q) in temp.iter().zip(qv.iter()) {
            assert_relative_eq!(t, 300.0);
            assert_relative_eq!(q, 0.005);
        }
    }

    #[test]
    fn warm_anomalies_accelerate_upward() {
        let (mut coupler, mut dycore) = init_coupler();
        coupler.field_mut(fields::TEMP).unwrap()[[2, 1, 1]] += 5.0;
        dycore.time_step(&mut coupler, seconds(1.0)).unwrap();
        assert!(coupler.field(fields::WVEL).unwrap()[[2, 1, 1]] > 0.0);
    }

    #[test]
    fn stepping_before_init_fails() {
        let mut coupler = Coupler::new();
        coupler.set_phys_constants(KesslerMicro::constants()).unwrap();
        coupler.allocate_state(4, 2, 2).unwrap();
        let mut dycore = StratifiedDycore::new();
        assert!(dycore.time_step(&mut coupler, seconds(1.0)).is_err());
    }
}
