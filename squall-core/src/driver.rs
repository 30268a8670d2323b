use uom::si::{f64::Time, time::second};

use crate::{
    coupler::Coupler,
    error::ModelError,
    module::{Dynamics, Microphysics, Nudger, SampleSink, Sponge},
    stepping::{clamp_to_target, StepPolicy},
};

/// Where the driver is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, modules not yet initialized.
    Initializing,
    /// Modules initialized, ready to step (or mid-run).
    Stepping,
    /// The integration reached the target time.
    Terminated,
}

/// The time-integration control loop.
///
/// A `Driver` owns the physics modules and the sample sink, and advances an
/// exclusively owned [`Coupler`] through operator-split steps until the
/// elapsed simulation time reaches the target. Each completed iteration
/// harvests one (pre-microphysics snapshot, post-microphysics state, step
/// size, elapsed time) training sample.
///
/// Stage order within one iteration is fixed and strictly sequential:
/// step-size negotiation, dynamics, snapshot, microphysics, sample
/// generation, sponge damping, column nudging, time advance. Each stage
/// depends on the mutated state of the previous one, so no reordering or
/// overlap is permitted.
pub struct Driver<D, M, S, N, G> {
    dynamics: D,
    micro: M,
    sponge: S,
    nudger: N,
    generator: G,
    policy: StepPolicy,
    target: Time,
    phase: Phase,
    steps: u64,
}

impl<D, M, S, N, G> Driver<D, M, S, N, G>
where
    D: Dynamics,
    M: Microphysics,
    S: Sponge,
    N: Nudger,
    G: SampleSink,
{
    /// Creates a driver over the given modules, step policy, and target
    /// simulation time.
    pub fn new(
        dynamics: D,
        micro: M,
        sponge: S,
        nudger: N,
        generator: G,
        policy: StepPolicy,
        target: Time,
    ) -> Self {
        Self {
            dynamics,
            micro,
            sponge,
            nudger,
            generator,
            policy,
            target,
            phase: Phase::Initializing,
            steps: 0,
        }
    }

    /// Runs the module initialization sequence.
    ///
    /// Order is load-bearing and fixed here so callers cannot get it wrong:
    ///
    /// 1. Microphysics init (registers its tracers in the coupler).
    /// 2. Dynamics init (may read tracers microphysics registered).
    /// 3. Nudger column capture, from the still-unperturbed state.
    /// 4. `perturb` (e.g. a temperature perturbation to start convection).
    /// 5. Sample sink init, once the full field schema is known.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AlreadyInitialized`] on a second call, or the
    /// first module failure otherwise. Any failure is fatal.
    pub fn init<P>(&mut self, coupler: &mut Coupler, perturb: P) -> Result<(), ModelError>
    where
        P: FnOnce(&mut Coupler) -> Result<(), ModelError>,
    {
        if self.phase != Phase::Initializing {
            return Err(ModelError::AlreadyInitialized);
        }
        self.micro.init(coupler)?;
        self.dynamics.init(coupler)?;
        self.nudger.set_column(coupler)?;
        perturb(coupler)?;
        self.generator.init(coupler)?;
        self.phase = Phase::Stepping;
        Ok(())
    }

    /// Integrates the coupler state forward to the target time.
    ///
    /// Returns the final elapsed time, which equals the target to within
    /// floating-point representability and never exceeds it: any step that
    /// would overshoot is clamped to land exactly on the target.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotInitialized`] if called before
    /// [`init`](Driver::init), or the first module failure otherwise. A
    /// failed run is not resumable.
    pub fn run(&mut self, coupler: &mut Coupler) -> Result<Time, ModelError> {
        if self.phase != Phase::Stepping {
            return Err(ModelError::NotInitialized);
        }

        let mut elapsed = Time::new::<second>(0.0);
        while elapsed < self.target {
            let dt = match self.policy {
                StepPolicy::Fixed(dt) => dt,
                StepPolicy::Adaptive => self.dynamics.compute_time_step(coupler)?,
            };
            let dt = clamp_to_target(dt, elapsed, self.target);

            self.dynamics.time_step(coupler, dt)?;

            // Freeze the pre-microphysics state; the sample sink reads it
            // while the live coupler keeps evolving.
            let input = coupler.snapshot();
            self.micro.time_step(coupler, dt)?;
            self.generator
                .generate_samples(&input, coupler, dt, elapsed)?;

            self.sponge.apply(coupler, dt)?;
            self.nudger.nudge(coupler, dt)?;

            elapsed += dt;
            self.steps += 1;
        }

        self.phase = Phase::Terminated;
        Ok(elapsed)
    }

    /// The driver's current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of completed loop iterations, which equals the number of
    /// samples generated.
    #[must_use]
    pub fn steps_completed(&self) -> u64 {
        self.steps
    }

    /// Access to the sample sink, e.g. for a post-run summary.
    #[must_use]
    pub fn generator(&self) -> &G {
        &self.generator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    use approx::assert_relative_eq;

    use crate::coupler::fields;
    use crate::module::{Initialize, Stepper};

    fn seconds(value: f64) -> Time {
        Time::new::<second>(value)
    }

    fn test_coupler() -> Coupler {
        let mut coupler = Coupler::new();
        coupler.allocate_state(2, 2, 2).unwrap();
        coupler.field_mut(fields::TEMP).unwrap().fill(300.0);
        coupler
    }

    /// Dynamics stub that reports a scripted sequence of stable steps and
    /// shifts the temperature field so stage ordering is observable.
    struct StubDycore {
        stable: Vec<f64>,
        calls: Cell<usize>,
    }

    impl StubDycore {
        fn with_stable_steps(stable: Vec<f64>) -> Self {
            Self {
                stable,
                calls: Cell::new(0),
            }
        }
    }

    impl Initialize for StubDycore {
        fn init(&mut self, _coupler: &mut Coupler) -> Result<(), ModelError> {
            Ok(())
        }
    }

    impl Stepper for StubDycore {
        fn time_step(&mut self, coupler: &mut Coupler, _dt: Time) -> Result<(), ModelError> {
            coupler.field_mut(fields::TEMP)?.mapv_inplace(|t| t + 5.0);
            Ok(())
        }
    }

    impl Dynamics for StubDycore {
        fn compute_time_step(&self, _coupler: &Coupler) -> Result<Time, ModelError> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            let idx = call.min(self.stable.len() - 1);
            Ok(seconds(self.stable[idx]))
        }
    }

    /// Microphysics stub that warms the temperature field by exactly 1 K.
    struct StubMicro;

    impl Initialize for StubMicro {
        fn init(&mut self, coupler: &mut Coupler) -> Result<(), ModelError> {
            coupler.register_tracer("water_vapor")?;
            Ok(())
        }
    }

    impl Stepper for StubMicro {
        fn time_step(&mut self, coupler: &mut Coupler, _dt: Time) -> Result<(), ModelError> {
            coupler.field_mut(fields::TEMP)?.mapv_inplace(|t| t + 1.0);
            Ok(())
        }
    }

    impl Microphysics for StubMicro {}

    struct FailingMicro;

    impl Initialize for FailingMicro {
        fn init(&mut self, _coupler: &mut Coupler) -> Result<(), ModelError> {
            Ok(())
        }
    }

    impl Stepper for FailingMicro {
        fn time_step(&mut self, _coupler: &mut Coupler, _dt: Time) -> Result<(), ModelError> {
            Err(ModelError::physics("micro", "saturation adjustment diverged"))
        }
    }

    impl Microphysics for FailingMicro {}

    struct NopSponge;

    impl Sponge for NopSponge {
        fn apply(&self, _coupler: &mut Coupler, _dt: Time) -> Result<(), ModelError> {
            Ok(())
        }
    }

    /// Nudger stub that remembers the temperature seen at column capture.
    #[derive(Default)]
    struct RecordingNudger {
        captured_temp: Option<f64>,
        nudge_calls: u64,
    }

    impl Nudger for RecordingNudger {
        fn set_column(&mut self, coupler: &Coupler) -> Result<(), ModelError> {
            self.captured_temp = Some(coupler.field(fields::TEMP)?[[0, 0, 0]]);
            Ok(())
        }

        fn nudge(&mut self, _coupler: &mut Coupler, _dt: Time) -> Result<(), ModelError> {
            self.nudge_calls += 1;
            Ok(())
        }
    }

    /// Sink stub that records the step sizes and input/output temperature
    /// difference of every sample.
    #[derive(Default)]
    struct RecordingSink {
        dts: Vec<f64>,
        elapsed: Vec<f64>,
        temp_deltas: Vec<f64>,
    }

    impl SampleSink for RecordingSink {
        fn init(&mut self, _coupler: &Coupler) -> Result<(), ModelError> {
            Ok(())
        }

        fn generate_samples(
            &mut self,
            input: &Coupler,
            output: &Coupler,
            dt: Time,
            elapsed: Time,
        ) -> Result<(), ModelError> {
            self.dts.push(dt.get::<second>());
            self.elapsed.push(elapsed.get::<second>());
            let before = input.field(fields::TEMP)?[[0, 0, 0]];
            let after = output.field(fields::TEMP)?[[0, 0, 0]];
            self.temp_deltas.push(after - before);
            Ok(())
        }
    }

    type TestDriver = Driver<StubDycore, StubMicro, NopSponge, RecordingNudger, RecordingSink>;

    fn fixed_driver(dt_phys: f64, target: f64) -> TestDriver {
        Driver::new(
            StubDycore::with_stable_steps(vec![1.0]),
            StubMicro,
            NopSponge,
            RecordingNudger::default(),
            RecordingSink::default(),
            StepPolicy::from_dt_phys(dt_phys),
            seconds(target),
        )
    }

    fn no_perturb(_coupler: &mut Coupler) -> Result<(), ModelError> {
        Ok(())
    }

    #[test]
    fn fixed_step_run_hits_the_target_exactly() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 100.0);
        driver.init(&mut coupler, no_perturb).unwrap();

        let elapsed = driver.run(&mut coupler).unwrap();

        assert_relative_eq!(elapsed.get::<second>(), 100.0);
        assert_eq!(driver.steps_completed(), 10);
        assert_eq!(driver.generator().dts, vec![10.0; 10]);
    }

    #[test]
    fn final_step_is_clamped_to_the_target() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 95.0);
        driver.init(&mut coupler, no_perturb).unwrap();

        let elapsed = driver.run(&mut coupler).unwrap();

        assert_relative_eq!(elapsed.get::<second>(), 95.0);
        assert_eq!(driver.steps_completed(), 10);
        let dts = &driver.generator().dts;
        assert_eq!(&dts[..9], &[10.0; 9]);
        assert_relative_eq!(dts[9], 5.0);
    }

    #[test]
    fn adaptive_steps_terminate_at_the_target() {
        let mut coupler = test_coupler();
        let mut driver = Driver::new(
            StubDycore::with_stable_steps(vec![30.0, 40.0, 50.0]),
            StubMicro,
            NopSponge,
            RecordingNudger::default(),
            RecordingSink::default(),
            StepPolicy::Adaptive,
            seconds(100.0),
        );
        driver.init(&mut coupler, no_perturb).unwrap();

        let elapsed = driver.run(&mut coupler).unwrap();

        assert_relative_eq!(elapsed.get::<second>(), 100.0);
        // 30 + 40, then 50 clamped to the remaining 30.
        assert_eq!(driver.generator().dts, vec![30.0, 40.0, 30.0]);
        assert_eq!(driver.steps_completed(), 3);
    }

    #[test]
    fn one_sample_per_completed_iteration() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(7.0, 70.0);
        driver.init(&mut coupler, no_perturb).unwrap();
        driver.run(&mut coupler).unwrap();

        assert_eq!(
            driver.generator().dts.len() as u64,
            driver.steps_completed()
        );
        assert_eq!(
            driver.generator().elapsed,
            vec![0.0, 7.0, 14.0, 21.0, 28.0, 35.0, 42.0, 49.0, 56.0, 63.0]
        );
    }

    #[test]
    fn snapshot_is_taken_after_dynamics_and_before_microphysics() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 30.0);
        driver.init(&mut coupler, no_perturb).unwrap();
        driver.run(&mut coupler).unwrap();

        // Dynamics warms by 5 K before the snapshot; microphysics warms by
        // exactly 1 K after it. Every sample must see only the 1 K delta.
        for delta in &driver.generator().temp_deltas {
            assert_relative_eq!(*delta, 1.0);
        }
    }

    #[test]
    fn column_is_captured_before_the_perturbation() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 10.0);
        driver
            .init(&mut coupler, |coupler| {
                coupler.field_mut(fields::TEMP)?.mapv_inplace(|t| t + 0.5);
                Ok(())
            })
            .unwrap();

        // The reference column reflects the unperturbed 300 K state.
        assert_eq!(driver.nudger.captured_temp, Some(300.0));
        assert_relative_eq!(coupler.field(fields::TEMP).unwrap()[[0, 0, 0]], 300.5);
    }

    #[test]
    fn damping_and_nudging_run_every_iteration() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 50.0);
        driver.init(&mut coupler, no_perturb).unwrap();
        driver.run(&mut coupler).unwrap();

        assert_eq!(driver.nudger.nudge_calls, 5);
    }

    #[test]
    fn phases_transition_in_order() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 20.0);
        assert_eq!(driver.phase(), Phase::Initializing);

        driver.init(&mut coupler, no_perturb).unwrap();
        assert_eq!(driver.phase(), Phase::Stepping);

        driver.run(&mut coupler).unwrap();
        assert_eq!(driver.phase(), Phase::Terminated);
    }

    #[test]
    fn run_before_init_fails() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 20.0);
        assert!(matches!(
            driver.run(&mut coupler),
            Err(ModelError::NotInitialized)
        ));
    }

    #[test]
    fn double_init_fails() {
        let mut coupler = test_coupler();
        let mut driver = fixed_driver(10.0, 20.0);
        driver.init(&mut coupler, no_perturb).unwrap();
        assert!(matches!(
            driver.init(&mut coupler, no_perturb),
            Err(ModelError::AlreadyInitialized)
        ));
    }

    #[test]
    fn module_failure_aborts_the_run() {
        let mut coupler = test_coupler();
        let mut driver = Driver::new(
            StubDycore::with_stable_steps(vec![1.0]),
            FailingMicro,
            NopSponge,
            RecordingNudger::default(),
            RecordingSink::default(),
            StepPolicy::from_dt_phys(10.0),
            seconds(100.0),
        );
        driver.init(&mut coupler, no_perturb).unwrap();

        let err = driver.run(&mut coupler).unwrap_err();
        assert!(matches!(err, ModelError::Physics { module: "micro", .. }));
        // No sample is generated for the failed iteration.
        assert!(driver.generator().dts.is_empty());
        assert_eq!(driver.steps_completed(), 0);
    }
}
