use std::process::ExitCode;

use uom::si::{f64::Time, time::second};

use squall_core::{Coupler, Driver, ModelError, OptionValue, StepPolicy};
use squall_driver::{Config, NdjsonGenerator};
use squall_physics::{
    perturb_temperature, ColumnNudger, KesslerMicro, SpongeLayer, StratifiedDycore,
};

/// Fixed seed for the convection-initiating temperature perturbation, so
/// runs with the same configuration produce the same corpus.
const PERTURBATION_SEED: u32 = 7;

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: squall <config.yaml>");
        return ExitCode::FAILURE;
    };

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("squall: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: &str) -> Result<(), ModelError> {
    let config = Config::from_file(config_path)?;

    // Coupler state is dry density, the three velocity components,
    // temperature, and whatever tracer masses microphysics registers.
    let mut coupler = Coupler::new();
    coupler.set_phys_constants(KesslerMicro::constants())?;
    coupler.allocate_state(config.nz, config.ny, config.nx)?;
    coupler.set_grid(config.xlen, config.ylen, config.zlen);
    // Modules that read module-specific keys find the file through this.
    coupler.set_option(
        "standalone_input_file",
        OptionValue::Str(config_path.to_string()),
    );

    let mut driver = Driver::new(
        StratifiedDycore::new(),
        KesslerMicro::new(),
        SpongeLayer::default(),
        ColumnNudger::default(),
        NdjsonGenerator::new(&config.out_file),
        StepPolicy::from_dt_phys(config.dt_phys),
        Time::new::<second>(config.sim_time),
    );

    driver.init(&mut coupler, |coupler| {
        perturb_temperature(coupler, PERTURBATION_SEED)
    })?;
    let elapsed = driver.run(&mut coupler)?;

    println!(
        "integrated {:.3} s in {} steps; wrote {} samples to {}",
        elapsed.get::<second>(),
        driver.steps_completed(),
        driver.generator().records_written(),
        config.out_file,
    );
    Ok(())
}
