mod calibration;
mod capacity;
mod metrics;
mod movement;
mod network;
mod options;
mod signal;

pub use calibration::{arrival_curve_calibration, movement_arrival_calibration};
pub use capacity::update_movement_permissive_capacity;
pub use metrics::{estimate_movement_delay, estimate_movement_volumes, get_movement_calibration_diff};
pub use movement::{update_movement_model, MovementUpdate};
pub use network::update_network_prediction;
pub use options::NetworkOptions;
pub use signal::{update_movement_capacity_state, update_movement_signal_state};

use clap::{App, Arg, ArgMatches};
use itertools::Itertools;

use crate::types::{save_to_file, SerdeFormat};
use crate::{FnResult, Main, OrError};

/// CLI component that runs the network prediction on a loaded artifact.
pub struct Solver<'a> {
    main: &'a Main,
    args: &'a ArgMatches,
}

impl<'a> Solver<'a> {
    pub fn get_subcommand() -> App<'a> {
        App::new("predict")
            .about("Runs the corridor prediction for one time-of-day plan and reports the calibration objective.")
            .arg(Arg::new("tod")
                .short('t')
                .long("tod")
                .required(true)
                .takes_value(true)
                .help("Name of the time-of-day plan to solve.")
            ).arg(Arg::new("global-cycle")
                .long("global-cycle")
                .takes_value(true)
                .help("Override the cycle length (seconds) at every junction.")
            ).arg(Arg::new("penetration")
                .short('p')
                .long("penetration")
                .takes_value(true)
                .help("Global penetration rate override.")
            ).arg(Arg::new("through-only")
                .long("through-only")
                .help("Accumulate the objective over through movements (NEMA 2/4/6/8) only.")
            ).arg(Arg::new("observed-arrival")
                .long("observed-arrival")
                .help("Feed observed instead of predicted arrivals into downstream movements.")
            ).arg(Arg::new("dependency-loop")
                .long("dependency-loop")
                .help("Start in augmented-readiness mode for networks with cyclic dependencies.")
            ).arg(Arg::new("max-super-iterations")
                .long("max-super-iterations")
                .takes_value(true)
                .default_value("5")
                .help("Cap on the number of network super-iterations.")
            ).arg(Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .help("Write the updated artifact (with predictions) to this file.")
            )
    }

    pub fn new(main: &'a Main, args: &'a ArgMatches) -> Solver<'a> {
        Solver { main, args }
    }

    pub fn run(&mut self) -> FnResult<()> {
        let tod_name = self.args.value_of("tod").unwrap(); // already validated by clap

        let mut options = NetworkOptions::default();
        if let Some(global_cycle) = self.args.value_of("global-cycle") {
            options.global_cycle = Some(global_cycle.parse().or_error("global-cycle is not a number")?);
        }
        if let Some(penetration) = self.args.value_of("penetration") {
            options.global_p = Some(penetration.parse().or_error("penetration is not a number")?);
        }
        options.through_cost_only = self.args.is_present("through-only");
        options.use_predicted_arrival = !self.args.is_present("observed-arrival");
        options.dependency_loop = self.args.is_present("dependency-loop");
        options.max_super_iterations = self
            .args
            .value_of("max-super-iterations")
            .unwrap()
            .parse()
            .or_error("max-super-iterations is not a number")?;
        options.disp = self.main.verbose;

        let mut net = (*self.main.get_net()?).clone();
        if !net.tod_dict.contains_key(tod_name) {
            println!(
                "TOD '{}' is not listed in the artifact (known: {}), trying anyway.",
                tod_name,
                net.tod_dict.keys().join(", ")
            );
        }
        net.check_network_topology();

        let calibration_diff = update_network_prediction(&mut net, tod_name, &options)?;
        println!("Calibration objective: {}", calibration_diff);

        if self.main.verbose {
            for (movement_id, movement_dict) in &net.dict {
                if let Some(movement_curve) = movement_dict.get(tod_name) {
                    println!(
                        "Movement {:>12} (index {}): delay {:>8.2}s, stop ratio {:>5.3}, volume {:>8.1} veh/h",
                        movement_id,
                        movement_curve.movement_index,
                        movement_curve.predicted_delay,
                        movement_curve.predicted_stop_ratio,
                        movement_curve.hourly_volume.unwrap_or(0.0),
                    );
                }
            }
        }

        if let Some(output) = self.args.value_of("output") {
            save_to_file(&net, output, &SerdeFormat::from_filename(output))?;
            println!("Wrote updated artifact to {}.", output);
        }
        Ok(())
    }
}
