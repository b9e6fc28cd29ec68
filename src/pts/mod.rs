//! Probabilistic time-space (PTS) grids: stationary queue PMFs turned into
//! horizontal/vertical gridline matrices that a renderer can draw as short
//! shockwave-tilted segments.

mod grid;
mod queue;

pub use grid::{
    queue_mat_to_horizontal_gridlines_mat, res_queue_mat_to_horizontal_gridlines_mat,
    res_queue_mat_to_vertical_gridlines_mat, transit_mat_to_vertical_gridlines_mat,
    update_gridlines,
};
pub use queue::{calc_queue_constraint, joint_queue_matrix, stationary_queue_factory, JointQueueResult};

use clap::{App, Arg, ArgMatches};
use serde::{Serialize, Deserialize};
use simple_error::bail;

use crate::types::{save_to_file, MovementCurve, SerdeFormat};
use crate::{FnResult, Main, OrError};

/// The pair of gridline matrices for one movement, `[time][queue position]`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PtsGrids {
    pub horizontal: Vec<Vec<f64>>,
    pub vertical: Vec<Vec<f64>>,
}

/// Physical parameters of the upstream link that bound the queue grid.
#[derive(Debug, Clone)]
pub struct PtsParams {
    pub jam_density: f64,
    pub upstream_link_length: f64,
    pub max_iteration: usize,
}

impl Default for PtsParams {
    fn default() -> Self {
        PtsParams {
            jam_density: 7.0,
            upstream_link_length: 100.0,
            max_iteration: 5,
        }
    }
}

/// Turn the stationary queue components into the merged gridline pair.
pub fn lines_factory<A>(
    components: &JointQueueResult,
    a: A,
    cycle: usize,
    green_split: f64,
) -> PtsGrids
where
    A: Fn(usize) -> f64,
{
    let res_h_grid_mat = res_queue_mat_to_horizontal_gridlines_mat(&components.res_queue, cycle);
    let mut h_grid_mat =
        queue_mat_to_horizontal_gridlines_mat(&components.queue, cycle, green_split);
    let init_res_queue = components.queue[cycle - 1].clone();
    let res_v_grid_mat = res_queue_mat_to_vertical_gridlines_mat(
        &components.res_queue,
        &components.d_internal,
        &a,
        cycle,
        &init_res_queue,
    );
    let mut v_grid_mat = transit_mat_to_vertical_gridlines_mat(
        &components.transit,
        &components.d_actual,
        cycle,
        green_split,
    );
    update_gridlines(
        cycle,
        green_split,
        &mut h_grid_mat,
        &mut v_grid_mat,
        &res_h_grid_mat,
        &res_v_grid_mat,
    );
    PtsGrids {
        horizontal: h_grid_mat,
        vertical: v_grid_mat,
    }
}

/// Build the PTS grids for one movement from its calibrated curves: the
/// arrival probability drives the queue, the green split the release.
pub fn movement_pts_grids(
    movement: &MovementCurve,
    resolution: f64,
    params: &PtsParams,
) -> FnResult<PtsGrids> {
    if movement.cycle_length <= 0.0 {
        bail!("Movement {} has no cycle length.", movement.movement_id);
    }
    let cycle = (movement.cycle_length / resolution).ceil() as usize;
    let green_total: f64 = movement.green_time.iter().map(|(_, duration)| duration).sum();
    let green_split = green_total / movement.cycle_length;
    let red = cycle - (cycle as f64 * green_split).round() as usize;

    let arrival_list: Vec<f64> = movement
        .arrival_curve
        .predict_list
        .as_ref()
        .or(movement.arrival_curve.prob_list.as_ref())
        .or_error(&format!(
            "Movement {} has neither predicted nor observed arrival probabilities.",
            movement.movement_id
        ))?
        .iter()
        .map(|val| val.max(0.0).min(1.0))
        .collect();
    if arrival_list.is_empty() {
        bail!("Movement {} has an empty arrival curve.", movement.movement_id);
    }

    let upstream_link_length = movement
        .upstream_length
        .unwrap_or(params.upstream_link_length);
    let max_queue = calc_queue_constraint(cycle, upstream_link_length, params.jam_density, 1.1);

    let a = |t: usize| arrival_list[t % arrival_list.len()];
    let d = |t: usize| t % cycle >= red;
    let components = stationary_queue_factory(cycle, max_queue, &a, d, params.max_iteration, 1e-4);
    Ok(lines_factory(&components, a, cycle, green_split))
}

/// CLI component that materializes the PTS grids of one movement.
pub struct Pts<'a> {
    main: &'a Main,
    args: &'a ArgMatches,
}

impl<'a> Pts<'a> {
    pub fn get_subcommand() -> App<'a> {
        App::new("pts")
            .about("Computes the probabilistic time-space gridline matrices for one movement and writes them to a file.")
            .arg(Arg::new("movement-id")
                .short('m')
                .long("movement-id")
                .required(true)
                .takes_value(true)
                .help("Id of the movement for which the grids shall be computed.")
            ).arg(Arg::new("tod")
                .short('t')
                .long("tod")
                .required(true)
                .takes_value(true)
                .help("Name of the time-of-day plan.")
            ).arg(Arg::new("output")
                .short('o')
                .long("output")
                .required(true)
                .takes_value(true)
                .help("Output file for the grids (.json or .mpack).")
            ).arg(Arg::new("jam-density")
                .long("jam-density")
                .takes_value(true)
                .default_value("7.0")
                .help("Jam density in meters per queued vehicle.")
            ).arg(Arg::new("upstream-length")
                .long("upstream-length")
                .takes_value(true)
                .help("Upstream link length in meters, overriding the movement's own value.")
            ).arg(Arg::new("max-iteration")
                .long("max-iteration")
                .takes_value(true)
                .default_value("5")
                .help("Maximum number of stationary-queue iterations.")
            )
    }

    pub fn new(main: &'a Main, args: &'a ArgMatches) -> Pts<'a> {
        Pts { main, args }
    }

    pub fn run(&mut self) -> FnResult<()> {
        let movement_id = self.args.value_of("movement-id").unwrap(); // already validated by clap
        let tod_name = self.args.value_of("tod").unwrap(); // already validated by clap
        let output = self.args.value_of("output").unwrap(); // already validated by clap

        let mut params = PtsParams::default();
        params.jam_density = self.args.value_of("jam-density").unwrap().parse()
            .or_error("jam-density is not a number")?;
        params.max_iteration = self.args.value_of("max-iteration").unwrap().parse()
            .or_error("max-iteration is not a number")?;
        if let Some(upstream_length) = self.args.value_of("upstream-length") {
            params.upstream_link_length = upstream_length.parse()
                .or_error("upstream-length is not a number")?;
        }

        let net = self.main.get_net()?;
        let movement = net
            .get_movement_tod_curve(movement_id, tod_name)
            .or_error(&format!(
                "No curve for movement {} at TOD {}.",
                movement_id, tod_name
            ))?;
        if self.main.verbose {
            println!("Computing PTS grids for movement {} at {}…", movement_id, tod_name);
        }
        let grids = movement_pts_grids(movement, net.resolution, &params)?;
        save_to_file(&grids, output, &SerdeFormat::from_filename(output))?;
        if self.main.verbose {
            println!("Wrote grids to {}.", output);
        }
        Ok(())
    }
}
