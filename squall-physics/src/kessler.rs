use uom::si::{f64::Time, time::second};

use squall_core::{
    fields, Coupler, Initialize, Microphysics, ModelError, PhysConstants, Stepper,
};

/// Water vapor mass density tracer, kg m^-3.
pub const WATER_VAPOR: &str = "water_vapor";
/// Cloud liquid water mass density tracer, kg m^-3.
pub const CLOUD_LIQUID: &str = "cloud_liquid";
/// Precipitating (rain) water mass density tracer, kg m^-3.
pub const PRECIP_LIQUID: &str = "precip_liquid";

/// Latent heat of vaporization, J kg^-1.
const LATENT_HEAT: f64 = 2.5e6;

/// Warm-rain Kessler-style microphysics.
///
/// Performs, column by column: saturation adjustment between vapor and
/// cloud water (with latent heating), autoconversion of cloud to rain,
/// accretion of cloud by falling rain, and rain fallout at a constant
/// terminal velocity. All water species are carried as mass densities, not
/// mixing ratios; the conversion happens internally against dry density.
///
/// This module is the canonical source of the run's physical constants
/// ([`KesslerMicro::constants`]) and registers its three tracers during
/// [`init`](Initialize::init).
#[derive(Debug, Clone)]
pub struct KesslerMicro {
    /// Cloud-to-rain conversion rate once the threshold is exceeded, s^-1.
    autoconversion_rate: f64,
    /// Cloud mixing ratio above which autoconversion begins, kg kg^-1.
    autoconversion_threshold: f64,
    /// Accretion (collection) rate coefficient, s^-1 per unit rain ratio.
    accretion_rate: f64,
    /// Rain terminal fall speed, m s^-1.
    fall_speed: f64,
}

impl Default for KesslerMicro {
    fn default() -> Self {
        Self {
            autoconversion_rate: 1.0e-3,
            autoconversion_threshold: 1.0e-3,
            accretion_rate: 2.2,
            fall_speed: 7.0,
        }
    }
}

impl KesslerMicro {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The physical constants this parameterization is calibrated against.
    ///
    /// The driver copies these into the coupler before any module
    /// initializes.
    #[must_use]
    pub fn constants() -> PhysConstants {
        PhysConstants {
            r_d: 287.0,
            r_v: 461.0,
            cp_d: 1004.0,
            cp_v: 1859.0,
            grav: 9.8,
            p0: 1.0e5,
        }
    }
}

/// Saturation vapor pressure over liquid water (Tetens), Pa.
fn saturation_vapor_pressure(temp: f64) -> f64 {
    610.78 * ((17.27 * (temp - 273.15)) / (temp - 35.86)).exp()
}

/// Saturation mixing ratio, kg kg^-1, at the given temperature and
/// pressure.
pub(crate) fn saturation_mixing_ratio(temp: f64, pressure: f64, constants: &PhysConstants) -> f64 {
    let es = saturation_vapor_pressure(temp);
    let denom = (pressure - es).max(es);
    (constants.r_d / constants.r_v) * es / denom
}

impl Initialize for KesslerMicro {
    fn init(&mut self, coupler: &mut Coupler) -> Result<(), ModelError> {
        coupler.register_tracer(WATER_VAPOR)?;
        coupler.register_tracer(CLOUD_LIQUID)?;
        coupler.register_tracer(PRECIP_LIQUID)?;
        Ok(())
    }
}

impl Stepper for KesslerMicro {
    fn time_step(&mut self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError> {
        let dt = dt.get::<second>();
        let constants = coupler.constants()?;
        let shape = coupler.shape()?;
        let (nz, ny, nx) = shape.dim();
        let dz = coupler.extent()?.zlen / nz as f64;

        let rho = coupler.field(fields::DENSITY_DRY)?.clone();
        let mut temp = coupler.field(fields::TEMP)?.clone();
        let mut qv = coupler.field(WATER_VAPOR)?.clone();
        let mut qc = coupler.field(CLOUD_LIQUID)?.clone();
        let mut qr = coupler.field(PRECIP_LIQUID)?.clone();

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = [k, j, i];
                    let rho_d = rho[idx];
                    if rho_d <= 0.0 {
                        return Err(ModelError::physics(
                            "kessler",
                            format!("non-positive dry density at ({k}, {j}, {i})"),
                        ));
                    }
                    let mut t = temp[idx];
                    let mut rv = (qv[idx] / rho_d).max(0.0);
                    let mut rc = (qc[idx] / rho_d).max(0.0);
                    let mut rr = (qr[idx] / rho_d).max(0.0);

                    // Saturation adjustment with latent heating. The
                    // adjustment is instantaneous, independent of dt.
                    let pressure = rho_d * constants.r_d * t;
                    let r_sat = saturation_mixing_ratio(t, pressure, &constants);
                    if rv > r_sat {
                        let drsat_dt = r_sat * LATENT_HEAT / (constants.r_v * t * t);
                        let factor = 1.0 + (LATENT_HEAT / constants.cp_d) * drsat_dt;
                        let cond = ((rv - r_sat) / factor).min(rv);
                        rv -= cond;
                        rc += cond;
                        t += (LATENT_HEAT / constants.cp_d) * cond;
                    } else if rc > 0.0 {
                        let evap = (r_sat - rv).min(rc);
                        rc -= evap;
                        rv += evap;
                        t -= (LATENT_HEAT / constants.cp_d) * evap;
                    }

                    // Autoconversion of cloud water to rain.
                    if rc > self.autoconversion_threshold {
                        let auto = (self.autoconversion_rate
                            * (rc - self.autoconversion_threshold)
                            * dt)
                            .min(rc);
                        rc -= auto;
                        rr += auto;
                    }

                    // Accretion of cloud droplets by falling rain.
                    if rc > 0.0 && rr > 0.0 {
                        let acc = (self.accretion_rate * rc * rr.powf(0.875) * dt).min(rc);
                        rc -= acc;
                        rr += acc;
                    }

                    temp[idx] = t;
                    qv[idx] = rv * rho_d;
                    qc[idx] = rc * rho_d;
                    qr[idx] = rr * rho_d;
                }
            }
        }

        // Rain fallout at constant terminal velocity, sub-cycled so the
        // sedimentation Courant number stays at or below one. Mass leaving
        // the lowest layer rains out of the domain.
        if self.fall_speed > 0.0 && dt > 0.0 {
            let courant = self.fall_speed * dt / dz;
            let nsub = courant.ceil().max(1.0) as usize;
            let c = courant / nsub as f64;
            for _ in 0..nsub {
                for j in 0..ny {
                    for i in 0..nx {
                        for k in 0..nz {
                            let from_above = if k + 1 < nz { qr[[k + 1, j, i]] } else { 0.0 };
                            qr[[k, j, i]] += c * (from_above - qr[[k, j, i]]);
                        }
                    }
                }
            }
        }

        *coupler.field_mut(fields::TEMP)? = temp;
        *coupler.field_mut(WATER_VAPOR)? = qv;
        *coupler.field_mut(CLOUD_LIQUID)? = qc;
        *coupler.field_mut(PRECIP_LIQUID)? = qr;
        Ok(())
    }
}

impl Microphysics for KesslerMicro {}
