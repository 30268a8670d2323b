use std::collections::BTreeMap;

use uom::si::{f64::Time, time::second};

use squall_core::{fields, Coupler, ModelError, Nudger};

/// Fields whose domain-mean columns are nudged. Vertical velocity and
/// tracers are left to the dynamics and microphysics alone.
const NUDGED_FIELDS: [&str; 4] = [fields::DENSITY_DRY, fields::UVEL, fields::VVEL, fields::TEMP];

/// Relaxation of the domain-mean column toward a stored reference profile.
///
/// `set_column` captures the reference from the initial state; it must run
/// before the initial temperature perturbation so the reference reflects
/// the unperturbed sounding. `nudge` then adds a horizontally uniform
/// forcing each iteration that pulls the current domain mean back toward
/// the reference over the configured timescale, keeping the environmental
/// instability persistently strong.
///
/// With a zero relaxation rate the state is returned bit-identical.
#[derive(Debug, Clone)]
pub struct ColumnNudger {
    /// Relaxation rate, s^-1. Zero disables nudging entirely.
    rate: f64,
    /// Reference domain-mean profile per nudged field, indexed by level.
    columns: BTreeMap<String, Vec<f64>>,
}

impl Default for ColumnNudger {
    fn default() -> Self {
        Self::new(1.0 / 900.0)
    }
}

impl ColumnNudger {
    #[must_use]
    pub fn new(rate: f64) -> Self {
        Self {
            rate,
            columns: BTreeMap::new(),
        }
    }

    /// A nudger that leaves the state untouched.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0.0)
    }

    /// Domain-mean value of `field` at each level.
    fn mean_column(coupler: &Coupler, name: &str) -> Result<Vec<f64>, ModelError> {
        let (nz, ny, nx) = coupler.shape()?.dim();
        let field = coupler.field(name)?;
        let horiz = (ny * nx) as f64;
        let mut column = Vec::with_capacity(nz);
        for k in 0..nz {
            let mut sum = 0.0;
            for j in 0..ny {
                for i in 0..nx {
                    sum += field[[k, j, i]];
                }
            }
            column.push(sum / horiz);
        }
        Ok(column)
    }
}

impl Nudger for ColumnNudger {
    fn set_column(&mut self, coupler: &Coupler) -> Result<(), ModelError> {
        for name in NUDGED_FIELDS {
            let column = Self::mean_column(coupler, name)?;
            self.columns.insert(name.to_string(), column);
        }
        Ok(())
    }

    fn nudge(&mut self, coupler: &mut Coupler, dt: Time) -> Result<(), ModelError> {
        if self.rate == 0.0 {
            return Ok(());
        }
        if self.columns.is_empty() {
            return Err(ModelError::physics(
                "column_nudger",
                "nudge called before set_column",
            ));
        }
        let dt = dt.get::<second>();
        let weight = (self.rate * dt).min(1.0);
        let (nz, ny, nx) = coupler.shape()?.dim();

        for name in NUDGED_FIELDS {
            let reference = self
                .columns
                .get(name)
                .ok_or_else(|| {
                    ModelError::physics("column_nudger", format!("no reference column for `{name}`"))
                })?
                .clone();
            let current = Self::mean_column(coupler, name)?;
            let field = coupler.field_mut(name)?;
            for k in 0..nz {
                let forcing = weight * (reference[k] - current[k]);
                for j in 0..ny {
                    for i in 0..nx {
                        field[[k, j, i]] += forcing;
                    }
                }
            }
        }
        Ok(())
    }
}
