//! Per-movement departure prediction.
//!
//! `update_movement_model` takes a record of optional overrides, marks the
//! histogram / probability / prediction layers dirty accordingly, and only
//! recomputes what changed. The prediction itself is a fixed-point sweep
//! over the departure horizon feeding the previous pass's departures back
//! in as occupied slots.

use crate::types::{MovementCurve, SingleQueuePmf};
use super::metrics::{estimate_movement_delay, estimate_movement_volumes};
use super::signal::update_movement_capacity_state;

/// Optional overrides for one movement update. Every `Some` value that
/// differs from the stored one dirties the matching layer.
#[derive(Debug, Clone)]
pub struct MovementUpdate {
    pub penetration_rate: Option<f64>,
    pub offset: Option<f64>,
    pub resolution: Option<f64>,
    pub departure_cycles: Option<usize>,
    pub permissive_capacity_list: Option<Vec<f64>>,
    pub num_of_dates: Option<u32>,
    pub lane_number: Option<f64>,
    pub saturation_flow_rate: Option<f64>,
    pub green_time: Option<Vec<(f64, f64)>>,
    pub yellow_time: Option<f64>,
    pub clearance_time: Option<f64>,
    pub green_start_shift: Option<f64>,
    pub green_loss: Option<f64>,
    pub cycle_length: Option<f64>,
    pub additional_offset: Option<f64>,
    pub use_predicted_arrival: bool,
    pub departure_prediction: bool,
    pub update_prediction: bool,
    pub binary: bool,
    /// how many cycles ahead the occupied-slot lookahead reaches
    pub max_occupied_repeats: usize,
}

impl Default for MovementUpdate {
    fn default() -> Self {
        MovementUpdate {
            penetration_rate: None,
            offset: None,
            resolution: None,
            departure_cycles: None,
            permissive_capacity_list: None,
            num_of_dates: None,
            lane_number: None,
            saturation_flow_rate: None,
            green_time: None,
            yellow_time: None,
            clearance_time: None,
            green_start_shift: None,
            green_loss: None,
            cycle_length: None,
            additional_offset: None,
            use_predicted_arrival: false,
            departure_prediction: true,
            update_prediction: false,
            binary: false,
            max_occupied_repeats: 3,
        }
    }
}

macro_rules! apply_override {
    ($field:expr, $target:expr, $dirty:expr) => {
        if let Some(val) = $field.clone() {
            if val != $target {
                $target = val;
                $dirty = true;
            }
        }
    };
}

/// Apply the overrides and re-run whatever became stale. Returns the
/// (possibly refreshed) predicted delay.
pub fn update_movement_model(movement_tod: &mut MovementCurve, update: MovementUpdate) -> f64 {
    let mut update_hist = false;
    let mut update_prob = false;
    let mut update_prediction = update.update_prediction;

    apply_override!(update.additional_offset, movement_tod.additional_offset, update_prediction);
    if let Some(permissive_capacity_list) = &update.permissive_capacity_list {
        if movement_tod.permissive_capacity_list.as_ref() != Some(permissive_capacity_list) {
            movement_tod.permissive_capacity_list = Some(permissive_capacity_list.clone());
            update_prediction = true;
        }
    }
    apply_override!(update.green_start_shift, movement_tod.green_start_shift, update_prediction);
    apply_override!(update.green_loss, movement_tod.effective_green_change, update_prediction);
    apply_override!(update.green_time, movement_tod.green_time, update_prediction);
    apply_override!(update.yellow_time, movement_tod.yellow_change_interval, update_prediction);
    apply_override!(update.clearance_time, movement_tod.clearance_interval, update_prediction);

    apply_override!(update.departure_cycles, movement_tod.departure_cycles, update_hist);
    apply_override!(update.offset, movement_tod.offset, update_hist);
    apply_override!(update.resolution, movement_tod.resolution, update_hist);
    apply_override!(update.cycle_length, movement_tod.cycle_length, update_hist);

    if let Some(penetration_rate) = update.penetration_rate {
        if movement_tod.penetration_rate != Some(penetration_rate) {
            movement_tod.penetration_rate = Some(penetration_rate);
            update_prob = true;
        }
    }
    apply_override!(update.num_of_dates, movement_tod.number_of_dates, update_prob);
    apply_override!(update.lane_number, movement_tod.equivalent_lane_number, update_prob);
    apply_override!(update.saturation_flow_rate, movement_tod.sat_flow_per_lane, update_prob);

    if update.use_predicted_arrival {
        update_prediction = true;
    }

    if update_hist {
        update_movement_hist_curves(movement_tod);
    }
    if update_hist || update_prob {
        update_movement_prob_curves(movement_tod);
    }
    if update.binary {
        movement_tod.binary_green = true;
        update_prediction = true;
    }

    if (update_hist || update_prob || update_prediction)
        && movement_tod.penetration_rate.is_some()
        && update.departure_prediction
    {
        departure_curve_prediction(
            movement_tod,
            15,
            1e-6,
            update.use_predicted_arrival,
            update.max_occupied_repeats,
        );
    }
    movement_tod.predicted_delay
}

/// Re-bin both histograms from the raw crossing times under the current
/// offset, cycle length and resolution. Departures land in the cycle of
/// their paired arrival, so they can run past the first cycle boundary.
fn update_movement_hist_curves(movement_tod: &mut MovementCurve) {
    let resolution = movement_tod.resolution;
    let cycle_length = movement_tod.cycle_length;
    if resolution <= 0.0 || cycle_length <= 0.0 {
        return;
    }
    let arrival_dim = (cycle_length / resolution).ceil() as usize;
    movement_tod.arrival_curve.dimension = arrival_dim;
    movement_tod.departure_curve.dimension = arrival_dim * movement_tod.departure_cycles;
    movement_tod.departure_curve.extend_cycles = movement_tod.departure_cycles;

    let mut origin_curve_dict = std::collections::BTreeMap::new();
    for (origin_id, time_list) in &movement_tod.arrival_curve.raw_data_dict {
        let mut curve_list = vec![0.0; arrival_dim];
        for arrival_time in time_list {
            let arrival_time = arrival_time - movement_tod.offset;
            let time_in_cycle = arrival_time.rem_euclid(cycle_length);
            let mut cycle_index = (time_in_cycle / resolution) as usize;
            if cycle_index >= arrival_dim {
                cycle_index = arrival_dim - 1;
            }
            curve_list[cycle_index] += 1.0;
        }
        origin_curve_dict.insert(origin_id.clone(), curve_list);
    }
    movement_tod.arrival_curve.origin_curve_dict = origin_curve_dict;

    let departure_dim = movement_tod.departure_curve.dimension;
    let mut arrival_curve_list = vec![0.0; arrival_dim];
    let mut departure_curve_list = vec![0.0; departure_dim.max(1)];
    let pair_count = movement_tod
        .arrival_curve
        .raw_data_list
        .len()
        .min(movement_tod.departure_curve.raw_data_list.len());
    for idx in 0..pair_count {
        let arrival_time = movement_tod.arrival_curve.raw_data_list[idx] - movement_tod.offset;
        let departure_time = movement_tod.departure_curve.raw_data_list[idx];
        let arrival_time_in_cycle = arrival_time.rem_euclid(cycle_length);
        let shift_time = arrival_time - arrival_time_in_cycle;
        let departure_time_in_cycle = departure_time - shift_time - movement_tod.offset;

        let mut arrival_index = (arrival_time_in_cycle / resolution) as usize;
        if arrival_index >= arrival_dim {
            arrival_index = arrival_dim - 1;
        }
        arrival_curve_list[arrival_index] += 1.0;

        // a noisy pair can put the departure before its arrival's cycle
        // start; such departures land in the first bin
        let mut departure_index = (departure_time_in_cycle / resolution).max(0.0) as usize;
        if departure_index >= departure_curve_list.len() {
            departure_index = departure_curve_list.len() - 1;
        }
        departure_curve_list[departure_index] += 1.0;
    }
    movement_tod.arrival_curve.curve_list = arrival_curve_list;
    movement_tod.departure_curve.curve_list = departure_curve_list;
    movement_tod.hist_avg_delay = estimate_movement_delay(movement_tod, false, false, false);
    movement_tod.departure_curve.agg_curves();
}

/// Rescale the histograms into per-cycle probabilities from the penetration
/// rate, observed dates, lane count and saturation flow.
fn update_movement_prob_curves(movement_tod: &mut MovementCurve) {
    let penetration_rate = match movement_tod.penetration_rate {
        Some(rate) => rate,
        None => return,
    };
    if movement_tod.tod_interval.len() < 2 || movement_tod.cycle_length <= 0.0 {
        return;
    }
    let tod_hours = movement_tod.tod_interval.last().unwrap()
        - movement_tod.tod_interval.first().unwrap();
    let total_cycles_daily = tod_hours * 3600.0 / movement_tod.cycle_length;
    let overall_cycles =
        total_cycles_daily * movement_tod.number_of_dates as f64 * movement_tod.resolution;
    let interval_max_arrival =
        movement_tod.sat_flow_per_lane * movement_tod.equivalent_lane_number / 3600.0;
    let scale_coefficient =
        1.0 / (penetration_rate * overall_cycles * interval_max_arrival).max(1e-3);
    movement_tod.arrival_curve.update_prob_curve(scale_coefficient);
    movement_tod.departure_curve.update_prob_curve(scale_coefficient);
}

/// Fixed-point departure sweep: iterate until the predicted delay settles
/// (relative change below `stopping_criteria`) or the step cap is reached.
fn departure_curve_prediction(
    movement_tod: &mut MovementCurve,
    maximum_steps: usize,
    stopping_criteria: f64,
    use_predicted_arrival: bool,
    max_occupied_repeats: usize,
) {
    update_movement_capacity_state(movement_tod, 1.0);

    let departure_dim = movement_tod.departure_curve.dimension;
    let mut predict_departure_list = vec![0.0; departure_dim];

    let mut prv_metric: Option<f64> = None;
    for _ in 0..maximum_steps {
        predict_departure_list = departure_prediction_step(
            movement_tod,
            &predict_departure_list,
            use_predicted_arrival,
            3,
            max_occupied_repeats,
        );
        let current_metric = movement_tod.predicted_delay;
        if let Some(prv) = prv_metric {
            if (current_metric - prv).abs() / prv.max(1.0) <= stopping_criteria {
                break;
            }
        }
        prv_metric = Some(current_metric);
    }

    movement_tod.departure_curve.agg_curves();
    movement_tod.hourly_volume = Some(estimate_movement_volumes(movement_tod));
}

/// Probability that the slot at `current_index` is consumed by a vehicle
/// departing from one of the following cycles of the previous pass.
fn get_occupied_probability(
    departure_list: &Vec<f64>,
    current_index: usize,
    cycle_counts: usize,
    max_repeat: usize,
) -> f64 {
    let mut occupied_prob = 0.0;
    for i_r in 0..max_repeat {
        let cursor_index = (i_r + 1) * cycle_counts + current_index;
        if cursor_index < departure_list.len() {
            occupied_prob += departure_list[cursor_index];
        }
    }
    occupied_prob
}

fn departure_prediction_step(
    movement_tod: &mut MovementCurve,
    previous_departure_list: &Vec<f64>,
    use_predicted_arrival: bool,
    stop_min_residual: usize,
    max_occupied_repeats: usize,
) -> Vec<f64> {
    let departure_dim = movement_tod.departure_curve.dimension;
    let arrival_dim = movement_tod.arrival_curve.dimension;

    let arrival_prob_list: Vec<f64> = if use_predicted_arrival {
        movement_tod
            .arrival_curve
            .predict_list
            .clone()
            .or_else(|| movement_tod.arrival_curve.prob_list.clone())
            .unwrap_or_else(|| vec![0.0; arrival_dim])
    } else {
        movement_tod
            .arrival_curve
            .prob_list
            .clone()
            .unwrap_or_else(|| vec![0.0; arrival_dim])
    };

    let capacity_state_list = movement_tod
        .capacity_state_list
        .clone()
        .unwrap_or_else(|| vec![0.0; departure_dim]);

    let mut predict_departure_list = Vec::with_capacity(departure_dim);
    let mut eff_capacity_list = Vec::with_capacity(departure_dim);
    let mut pmf_list = Vec::with_capacity(departure_dim);
    let mut total_stops = 0.0;
    let mut cum_arrival_pmf = SingleQueuePmf::new();

    for i_step in 0..departure_dim {
        // the maximum capacity allowed at this timestep
        let capacity_state = capacity_state_list[i_step];

        let residual_prob = cum_arrival_pmf.get_prob(stop_min_residual);
        let occupied_prob = get_occupied_probability(
            previous_departure_list,
            i_step,
            arrival_dim,
            max_occupied_repeats,
        );
        let release_capacity = capacity_state - occupied_prob;
        eff_capacity_list.push(release_capacity);

        // new arrival
        if i_step < arrival_dim {
            let arrival_rate = arrival_prob_list.get(i_step).copied().unwrap_or(0.0);
            // an arrival passes straight through only when nothing is
            // queued and the slot is not already taken
            let direct_pass_prob = release_capacity * (1.0 - residual_prob);
            let stop_prob = arrival_rate * (1.0 - direct_pass_prob);
            total_stops += stop_prob;
            cum_arrival_pmf.arrival_step(arrival_rate);
        }

        // new departure
        if capacity_state > 0.0 {
            let new_departure_prob = cum_arrival_pmf.departure_step(release_capacity);
            predict_departure_list.push(new_departure_prob);
        } else {
            predict_departure_list.push(0.0);
        }
        pmf_list.push(cum_arrival_pmf.pmf_list.clone());
    }
    movement_tod.eff_capacity_list = Some(eff_capacity_list);

    // conservation: whatever was not served leaves in the final bin
    let arrival_sum: f64 = arrival_prob_list.iter().sum();
    let predicted_sum: f64 = predict_departure_list.iter().sum();
    if let Some(last) = predict_departure_list.last_mut() {
        *last += arrival_sum - predicted_sum;
    }

    movement_tod.predicted_stop_ratio = total_stops / arrival_sum.max(1e-4);
    movement_tod.departure_curve.predict_list = Some(predict_departure_list.clone());
    movement_tod.predicted_delay =
        estimate_movement_delay(movement_tod, true, true, use_predicted_arrival);
    movement_tod.pmf_list = Some(pmf_list);
    movement_tod.departure_calibration_error = movement_tod.departure_curve.get_prediction_error();
    predict_departure_list
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single isolated movement: uniform arrival over a 30s cycle with a
    /// 15s leading green at 3s resolution.
    fn isolated_movement(arrival_prob: f64) -> MovementCurve {
        let mut movement = MovementCurve::default();
        movement.movement_id = String::from("m1");
        movement.movement_index = 2;
        movement.resolution = 3.0;
        movement.cycle_length = 30.0;
        movement.departure_cycles = 3;
        movement.green_time = vec![(0.0, 15.0)];
        movement.penetration_rate = Some(1.0);
        movement.arrival_curve.dimension = 10;
        movement.arrival_curve.prob_list = Some(vec![arrival_prob; 10]);
        movement.departure_curve.dimension = 30;
        movement.departure_curve.extend_cycles = 3;
        movement
    }

    #[test]
    fn identity_scenario_predicts_moderate_delay() {
        let mut movement = isolated_movement(0.1);
        update_movement_model(&mut movement, MovementUpdate {
            update_prediction: true,
            ..MovementUpdate::default()
        });

        let predict_list = movement.departure_curve.predict_list.as_ref().unwrap();
        let predicted_sum: f64 = predict_list.iter().sum();
        assert!((predicted_sum - 1.0).abs() < 1e-6, "mass not conserved: {}", predicted_sum);
        assert!(
            movement.predicted_delay >= 3.0 && movement.predicted_delay <= 9.0,
            "delay {} outside the expected band",
            movement.predicted_delay
        );
        assert!(
            movement.predicted_stop_ratio >= 0.4 && movement.predicted_stop_ratio <= 0.6,
            "stop ratio {} outside the expected band",
            movement.predicted_stop_ratio
        );
        assert!(movement.hourly_volume.is_some());
    }

    #[test]
    fn saturated_scenario_stops_nearly_everyone() {
        let mut movement = isolated_movement(1.0);
        update_movement_model(&mut movement, MovementUpdate {
            update_prediction: true,
            ..MovementUpdate::default()
        });

        assert!(
            movement.predicted_stop_ratio > 0.9,
            "stop ratio {} too low for saturated demand",
            movement.predicted_stop_ratio
        );
        let predict_list = movement.departure_curve.predict_list.as_ref().unwrap();
        assert!(
            *predict_list.last().unwrap() > 0.3,
            "last-bin residual {} too small",
            predict_list.last().unwrap()
        );
        // conservation holds even under saturation
        let predicted_sum: f64 = predict_list.iter().sum();
        assert!((predicted_sum - 10.0).abs() < 1e-6);
    }

    #[test]
    fn queue_pmf_masses_stay_normalized() {
        let mut movement = isolated_movement(0.6);
        update_movement_model(&mut movement, MovementUpdate {
            update_prediction: true,
            ..MovementUpdate::default()
        });
        for pmf in movement.pmf_list.as_ref().unwrap() {
            let mass: f64 = pmf.iter().sum();
            assert!((mass - 1.0).abs() < 1e-2);
        }
    }

    #[test]
    fn penetration_change_rescales_probabilities() {
        let mut movement = isolated_movement(0.1);
        movement.tod_interval = vec![7.0, 8.0];
        movement.number_of_dates = 1;
        movement.arrival_curve.curve_list = vec![6.0; 10];
        movement.departure_curve.curve_list = vec![2.0; 30];
        update_movement_model(&mut movement, MovementUpdate {
            penetration_rate: Some(0.1),
            departure_prediction: false,
            ..MovementUpdate::default()
        });
        // (1 h * 3600 / 30) cycles * 1 date * 3 s resolution = 360,
        // capped arrivals per cell 0.5, penetration 0.1: scale = 1/18
        let prob_list = movement.arrival_curve.prob_list.as_ref().unwrap();
        assert!((prob_list[0] - 6.0 / 18.0).abs() < 1e-9);
    }

    #[test]
    fn hist_rebuild_rebins_raw_times() {
        let mut movement = isolated_movement(0.1);
        movement.arrival_curve.raw_data_list = vec![0.0, 31.0, 4.0];
        movement.departure_curve.raw_data_list = vec![6.0, 40.0, 34.0];
        movement
            .arrival_curve
            .raw_data_dict
            .insert(String::from("null"), vec![0.0, 31.0, 4.0]);
        update_movement_model(&mut movement, MovementUpdate {
            cycle_length: Some(20.0),
            departure_prediction: false,
            ..MovementUpdate::default()
        });
        // cycle 20s, resolution 3s: ceil -> 7 bins per cycle
        assert_eq!(movement.arrival_curve.dimension, 7);
        assert_eq!(movement.departure_curve.dimension, 21);
        let arrivals: f64 = movement.arrival_curve.curve_list.iter().sum();
        assert!((arrivals - 3.0).abs() < 1e-12);
        let departures: f64 = movement.departure_curve.curve_list.iter().sum();
        assert!((departures - 3.0).abs() < 1e-12);
    }
}
