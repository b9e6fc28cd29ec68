//! Corridor-wide prediction: scale probabilities by penetration, calibrate
//! arrivals, then solve movements in dependency order (upstream and
//! conflicting movements first), super-iterating until the per-movement
//! cost vector settles.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use simple_error::bail;

use crate::curves::shift_list_by_val;
use crate::types::MovementNetDict;
use crate::FnResult;

use super::calibration::arrival_curve_calibration;
use super::capacity::update_movement_permissive_capacity;
use super::metrics::get_movement_calibration_diff;
use super::movement::{update_movement_model, MovementUpdate};
use super::options::NetworkOptions;

const THROUGH_MOVEMENT_INDICES: [u32; 4] = [2, 4, 6, 8];

/// Run the full network prediction for one TOD and return the squared
/// calibration objective (under-predictions weigh four-fold).
pub fn update_network_prediction(
    curve_dict: &mut MovementNetDict,
    tod_name: &str,
    options: &NetworkOptions,
) -> FnResult<f64> {
    let dependency_loop = options.dependency_loop;
    // once in loop mode there is nothing further to fall back to
    let retry_with_loop = options.retry_with_loop && !dependency_loop;

    let movement_ids: Vec<String> = curve_dict
        .dict
        .iter()
        .filter(|(_, tods)| tods.contains_key(tod_name))
        .map(|(movement_id, _)| movement_id.clone())
        .collect();
    let overall_movements_number = movement_ids.len();

    if options.disp {
        println!("{}", "=".repeat(100));
        println!("Overall network prediction program start…");
        println!("Overall number of movements: {}", overall_movements_number);
        println!("Through cost only: {}", options.through_cost_only);
        println!("Dependency loop mode: {}", dependency_loop);
        if !dependency_loop {
            println!("Retry if there is a dependency loop: {}", retry_with_loop);
        }
    }

    // scaling first: the penetration rate influences the diverge
    // proportions, so the arrival calibration runs right after
    set_penetration_rate(curve_dict, Some(tod_name), options)?;

    let augment_processed_list: BTreeSet<String> = if dependency_loop {
        let augmented = through_movements_update(curve_dict, Some(tod_name), options);
        if options.disp {
            println!(
                "Use dependency loop mode, augmented processed movements: {:?}",
                augmented
            );
        }
        augmented.into_iter().collect()
    } else {
        BTreeSet::new()
    };

    let mut total_calibration_diff = 0.0;
    let mut prv_movement_metric_dict: BTreeMap<String, f64> = BTreeMap::new();

    for super_iter in 0..options.max_super_iterations {
        if options.disp {
            println!("{}", "~".repeat(100));
            println!("Super iteration {}", super_iter);
        }
        let mut processed: BTreeSet<String> = BTreeSet::new();
        let mut movement_metric_dict: BTreeMap<String, f64> = BTreeMap::new();
        let mut unprocessed_movement_dict: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut use_prv_conflicting = false;
        total_calibration_diff = 0.0;

        for sub_iter in 0..overall_movements_number {
            unprocessed_movement_dict.clear();
            let mut processed_this_round = 0;

            for movement_id in &movement_ids {
                if processed.contains(movement_id) {
                    continue;
                }

                let (upstream_list, conflicting_list, movement_index, junction_id) = {
                    let movement_curve = curve_dict
                        .get_movement_tod_curve(movement_id, tod_name)
                        .unwrap(); // movement_ids was built from this dict
                    (
                        movement_curve.upstream_movement_list.clone(),
                        movement_curve.conflicting_movement_list.clone(),
                        movement_curve.movement_index,
                        movement_curve.junction_id.clone(),
                    )
                };

                let upstream_ready = is_ready(&upstream_list, &processed, None);
                let conflicting_ready = is_ready(&conflicting_list, &processed, None);
                let proceed = if use_prv_conflicting {
                    let conflicting_augment_ready =
                        is_ready(&conflicting_list, &processed, Some(&augment_processed_list));
                    // odd (turning) movements may also take their upstream
                    // from the pre-updated pass; through movements may not
                    let upstream_augment_ready = if movement_index % 2 == 1 {
                        is_ready(&upstream_list, &processed, Some(&augment_processed_list))
                    } else {
                        upstream_ready
                    };
                    upstream_augment_ready && conflicting_augment_ready
                } else {
                    upstream_ready && conflicting_ready
                };

                if !proceed {
                    let mut unmet = Vec::new();
                    if !upstream_ready {
                        unmet.extend(upstream_list.iter().map(|id| format!("upstream {}", id)));
                    }
                    if !conflicting_ready {
                        unmet.extend(conflicting_list.iter().map(|id| format!("conflicting {}", id)));
                    }
                    unprocessed_movement_dict.insert(movement_id.clone(), unmet);
                    continue;
                }

                let additional_offset = options.offset_dict.get(&junction_id).copied();
                let new_cycle_length = options
                    .cycle_dict
                    .get(&junction_id)
                    .copied()
                    .or(options.global_cycle);
                let new_green_info = options.green_dict.get(movement_id).cloned();

                // arrival from the upstream departures, then permissive
                // capacity from the conflicting flows, then the solve
                if options.use_predicted_arrival {
                    movement_arrival_prediction(curve_dict, movement_id, tod_name, true);
                }
                update_movement_permissive_capacity(curve_dict, movement_id, tod_name, true);

                let movement_curve = curve_dict
                    .get_movement_tod_curve_mut(movement_id, tod_name)
                    .unwrap();
                update_movement_model(
                    movement_curve,
                    MovementUpdate {
                        green_time: new_green_info,
                        cycle_length: new_cycle_length,
                        additional_offset,
                        use_predicted_arrival: options.use_predicted_arrival,
                        // a processed movement always re-solves, its inputs
                        // (arrival prediction, permissive capacity) were
                        // just refreshed outside the dirty tracking
                        update_prediction: true,
                        max_occupied_repeats: options.max_occupied_repeats,
                        ..MovementUpdate::default()
                    },
                );
                processed.insert(movement_id.clone());
                processed_this_round += 1;

                let movement_curve = curve_dict
                    .get_movement_tod_curve(movement_id, tod_name)
                    .unwrap();
                if options.through_cost_only
                    && !THROUGH_MOVEMENT_INDICES.contains(&movement_curve.movement_index)
                {
                    continue;
                }
                let local_calibration_diff = get_movement_calibration_diff(movement_curve, 30.0)
                    * movement_curve.total_trajs
                    / 3600.0;
                let local_delay_metric = (movement_curve.predicted_delay
                    + movement_curve.predicted_stop_ratio * 30.0)
                    * movement_curve.total_trajs;
                movement_metric_dict.insert(movement_id.clone(), local_delay_metric);

                if local_calibration_diff >= 0.0 {
                    total_calibration_diff += local_calibration_diff * local_calibration_diff;
                } else {
                    // under-prediction carries a higher penalty
                    total_calibration_diff += local_calibration_diff * local_calibration_diff * 4.0;
                }
            }

            if options.disp {
                println!("{}", "-".repeat(100));
                println!("Sub iteration number {}", sub_iter);
                println!(
                    "Overall processed movements {}, unprocessed movements {}",
                    processed.len(),
                    overall_movements_number - processed.len()
                );
            }

            if processed.len() == overall_movements_number {
                break;
            }
            if processed_this_round == 0 {
                if dependency_loop && !use_prv_conflicting {
                    if options.disp {
                        println!(
                            "[WARNING] remaining movements not reduced, use the previous \
                             conflicting prediction to proceed…"
                        );
                    }
                    use_prv_conflicting = true;
                } else {
                    break;
                }
            } else {
                use_prv_conflicting = false;
            }
        }

        if processed.len() < overall_movements_number {
            if retry_with_loop {
                if options.disp {
                    println!("[WARNING] we will retry by setting dependency_loop as True");
                }
                let mut retry_options = options.clone();
                retry_options.dependency_loop = true;
                retry_options.retry_with_loop = false;
                return update_network_prediction(curve_dict, tod_name, &retry_options);
            }
            let mut report = String::new();
            report.push_str(&format!(
                "Processed {} v.s. unprocessed {}\n",
                processed.len(),
                overall_movements_number - processed.len()
            ));
            report.push_str(&format!("Processed movements: {:?}\n", processed));
            report.push_str("Unprocessed movements and their dependencies:\n");
            for (movement_id, unmet) in &unprocessed_movement_dict {
                report.push_str(&format!("Movement {}, dependencies: {:?}\n", movement_id, unmet));
            }
            bail!(
                "Input network topology not correct, some movements were not processed.\n\
                 You can set retry_with_loop or call check_network_topology() before \
                 running this function.\n{}",
                report
            );
        }

        let metric_diff_ratio = get_cali_diff(
            &prv_movement_metric_dict,
            &movement_metric_dict,
            options.disp,
        );
        if options.disp {
            println!("End of super iteration {}", super_iter);
            println!("{}", "~".repeat(100));
        }
        if metric_diff_ratio <= options.super_stopping_criteria {
            if options.disp {
                println!("Terminated super iteration in advance.");
            }
            break;
        }
        prv_movement_metric_dict = movement_metric_dict;
    }

    Ok(total_calibration_diff)
}

/// Relative change of the per-movement cost vector between two super
/// iterations. Incomparable vectors count as very large.
fn get_cali_diff(
    metric_dict1: &BTreeMap<String, f64>,
    metric_dict2: &BTreeMap<String, f64>,
    disp: bool,
) -> f64 {
    if metric_dict1.len() != metric_dict2.len() {
        if disp {
            println!("Metric 1 {:?}", metric_dict1.keys());
            println!("Metric 2 {:?}", metric_dict2.keys());
        }
        return 1e6;
    }
    let mut total_metric = 0.0;
    let mut total_diff = 0.0;
    for (movement_id, metric1) in metric_dict1 {
        let metric2 = match metric_dict2.get(movement_id) {
            Some(metric2) => metric2,
            None => return 1e6,
        };
        total_metric += metric1 * metric1;
        total_diff += (metric2 - metric1) * (metric2 - metric1);
    }
    if total_metric <= 0.0 {
        return if total_diff <= 0.0 { 0.0 } else { 1e6 };
    }
    let diff_ratio = total_diff / total_metric;
    if disp {
        println!("Total metric: {}", total_metric);
        println!("Total diff: {}", total_diff);
        println!("Diff ratio {}", diff_ratio);
    }
    diff_ratio
}

fn is_ready(
    dependency_list: &[String],
    processed: &BTreeSet<String>,
    augment: Option<&BTreeSet<String>>,
) -> bool {
    dependency_list.iter().all(|movement_id| {
        processed.contains(movement_id)
            || augment.map_or(false, |augment| augment.contains(movement_id))
    })
}

/// Set every movement's penetration rate (movement override beats the
/// global one beats the stored one) and rescale its probability curves,
/// then re-run the arrival calibration. The rescales touch disjoint curves,
/// so they run in parallel.
fn set_penetration_rate(
    curve_dict: &mut MovementNetDict,
    tod_name: Option<&str>,
    options: &NetworkOptions,
) -> FnResult<()> {
    let global_p = options.global_p;
    let p_dict = &options.p_dict;
    let max_occupied_repeats = options.max_occupied_repeats;

    let mut errors: Vec<String> = curve_dict
        .dict
        .par_iter_mut()
        .flat_map(|(movement_id, movement_curve_dict)| {
            let mut local_errors = Vec::new();
            for (local_tod, movement_curve) in movement_curve_dict.iter_mut() {
                if let Some(tod_name) = tod_name {
                    if local_tod != tod_name {
                        continue;
                    }
                }
                let penetration_rate = p_dict
                    .get(movement_id)
                    .copied()
                    .or(global_p)
                    .or(movement_curve.penetration_rate);
                match penetration_rate {
                    None => local_errors.push(format!(
                        "Penetration rate of movement {} at {} is not set correctly \
                         (movement index: {})",
                        movement_id, local_tod, movement_curve.movement_index
                    )),
                    Some(penetration_rate) => {
                        update_movement_model(
                            movement_curve,
                            MovementUpdate {
                                penetration_rate: Some(penetration_rate),
                                departure_prediction: false,
                                max_occupied_repeats,
                                ..MovementUpdate::default()
                            },
                        );
                    }
                }
            }
            local_errors
        })
        .collect();
    errors.sort();
    if !errors.is_empty() {
        bail!(errors.join("\n"));
    }
    arrival_curve_calibration(curve_dict, tod_name);
    Ok(())
}

/// Pre-update every movement once from observed arrivals only. The result
/// seeds the augmented-readiness set of dependency-loop mode.
fn through_movements_update(
    curve_dict: &mut MovementNetDict,
    tod_name: Option<&str>,
    options: &NetworkOptions,
) -> Vec<String> {
    let mut movement_list = Vec::new();
    for (movement_id, local_tod) in curve_dict.movement_tod_keys() {
        if let Some(tod_name) = tod_name {
            if local_tod != tod_name {
                continue;
            }
        }
        if let Some(movement_curve) = curve_dict.get_movement_tod_curve_mut(&movement_id, &local_tod)
        {
            update_movement_model(
                movement_curve,
                MovementUpdate {
                    update_prediction: true,
                    use_predicted_arrival: false,
                    max_occupied_repeats: options.max_occupied_repeats,
                    ..MovementUpdate::default()
                },
            );
        }
        movement_list.push(movement_id);
    }
    movement_list
}

/// Predict the movement's arrival curve as the sum of its origins: the
/// "null" share stays observed, every live origin contributes its upstream
/// aggregated departure shifted and scaled by the calibration.
fn movement_arrival_prediction(
    net_dict: &mut MovementNetDict,
    movement_id: &str,
    tod_name: &str,
    from_upstream_prediction: bool,
) {
    let (origin_prob_dict, origin_diverge_dict, origin_shift_dict) =
        match net_dict.get_movement_tod_curve(movement_id, tod_name) {
            Some(movement_curve) => (
                movement_curve.arrival_curve.origin_prob_dict.clone(),
                movement_curve.origin_diverge_dict.clone(),
                movement_curve.origin_shift_dict.clone(),
            ),
            None => return,
        };

    let mut overall_predicted_list: Option<Vec<f64>> = None;
    let mut predicted_prob_dict: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for (origin_id, origin_list) in &origin_prob_dict {
        let local_arrival_list: Vec<f64>;
        if origin_id == "null" {
            local_arrival_list = origin_list.iter().map(|val| val.max(0.0).min(1.0)).collect();
            predicted_prob_dict.insert(origin_id.clone(), origin_list.clone());
        } else {
            let agg_arrival_list = match net_dict.get_movement_tod_curve(origin_id, tod_name) {
                Some(upstream_movement_curve) => {
                    let departure_curve = &upstream_movement_curve.departure_curve;
                    if from_upstream_prediction {
                        departure_curve
                            .agg_predict_list
                            .clone()
                            .or_else(|| departure_curve.agg_prob_list.clone())
                    } else {
                        departure_curve.agg_prob_list.clone()
                    }
                }
                None => None,
            };
            let agg_arrival_list = match agg_arrival_list {
                Some(list) => list,
                None => continue,
            };
            let scale_coefficient = origin_diverge_dict.get(origin_id).copied().unwrap_or(0.0);
            let shift_val = origin_shift_dict.get(origin_id).copied().unwrap_or(0) as f64;
            let transformed_arrival_list = shift_list_by_val(&agg_arrival_list, shift_val);
            local_arrival_list = transformed_arrival_list
                .iter()
                .map(|val| (val * scale_coefficient).max(0.0).min(1.0))
                .collect();
            predicted_prob_dict.insert(origin_id.clone(), local_arrival_list.clone());
        }

        match &mut overall_predicted_list {
            None => overall_predicted_list = Some(local_arrival_list),
            Some(overall) => {
                if overall.len() < local_arrival_list.len() {
                    overall.resize(local_arrival_list.len(), 0.0);
                }
                for (idx, val) in local_arrival_list.iter().enumerate() {
                    overall[idx] += val;
                }
            }
        }
    }

    if let Some(overall_predicted_list) = overall_predicted_list {
        if let Some(movement_curve) = net_dict.get_movement_tod_curve_mut(movement_id, tod_name) {
            movement_curve.arrival_curve.predict_list = Some(overall_predicted_list);
            movement_curve.arrival_curve.origin_predict_dict = predicted_prob_dict;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::shift_list_by_val;
    use crate::types::MovementCurve;

    const TOD: &str = "am";

    /// A movement with a 30s cycle, 15s leading green and uniform arrival.
    fn basic_movement(movement_id: &str, junction_id: &str, movement_index: u32) -> MovementCurve {
        let mut movement = MovementCurve::default();
        movement.movement_id = String::from(movement_id);
        movement.junction_id = String::from(junction_id);
        movement.movement_index = movement_index;
        movement.tod_name = String::from(TOD);
        movement.tod_interval = vec![7.0, 8.0];
        movement.resolution = 3.0;
        movement.cycle_length = 30.0;
        movement.departure_cycles = 3;
        movement.green_time = vec![(0.0, 15.0)];
        movement.penetration_rate = Some(1.0);
        movement.number_of_dates = 1;
        movement.total_trajs = 100.0;
        movement.total_stopped_trajs = 50.0;
        movement.total_control_delay = 500.0;
        movement.arrival_curve.dimension = 10;
        movement.arrival_curve.prob_list = Some(vec![0.08; 10]);
        movement.arrival_curve.curve_list = vec![8.0; 10];
        movement.departure_curve.dimension = 30;
        movement.departure_curve.extend_cycles = 3;
        let mut departure_prob = vec![0.0; 30];
        for i in 0..5 {
            departure_prob[i] = 0.16;
        }
        movement.departure_curve.prob_list = Some(departure_prob);
        movement.departure_curve.agg_curves();
        movement
    }

    fn corridor_net(movements: Vec<MovementCurve>) -> MovementNetDict {
        let mut net = MovementNetDict::new();
        net.resolution = 3.0;
        net.departure_repeats = 3;
        net.tod_dict.insert(String::from(TOD), vec![7.0, 8.0]);
        for movement in movements {
            net.add_movement_tod_curve(movement);
        }
        net
    }

    /// Chain `down` after `up` with travel shift `shift` and full diverge.
    fn link(up: &MovementCurve, down: &mut MovementCurve, shift: f64) {
        let upstream_departure = up.departure_curve.agg_prob_list.clone().unwrap();
        let arrival: Vec<f64> = shift_list_by_val(&upstream_departure, shift);
        down.upstream_movement_list = vec![up.movement_id.clone()];
        down.arrival_curve
            .origin_curve_dict
            .insert(up.movement_id.clone(), vec![8.0; 10]);
        down.arrival_curve
            .origin_prob_dict
            .insert(up.movement_id.clone(), arrival);
    }

    #[test]
    fn single_movement_network_solves() {
        let mut net = corridor_net(vec![basic_movement("A", "J1", 2)]);
        let objective = update_network_prediction(&mut net, TOD, &NetworkOptions::default()).unwrap();
        assert!(objective.is_finite());
        assert!(objective >= 0.0);
        let movement = net.get_movement_tod_curve("A", TOD).unwrap();
        assert!(movement.predicted_delay > 0.0);
        assert!(movement.predicted_stop_ratio >= 0.0 && movement.predicted_stop_ratio <= 1.0);
        // conservation between arrival mass and predicted departures
        let arrival_sum: f64 = movement.arrival_curve.prob_list.as_ref().unwrap().iter().sum();
        let predicted_sum: f64 = movement
            .departure_curve
            .predict_list
            .as_ref()
            .unwrap()
            .iter()
            .sum();
        assert!((arrival_sum - predicted_sum).abs() < 1e-6);
    }

    #[test]
    fn predicted_platoon_arrival_lowers_downstream_delay() {
        // two signals, matched cycles, zero offset: the upstream platoon
        // leaves in green and lands in the downstream green, which must
        // never be worse than assuming the uniform observed arrival
        let up = basic_movement("A", "J1", 2);
        let mut down = basic_movement("B", "J2", 2);
        link(&up, &mut down, 0.0);

        let mut net_predicted = corridor_net(vec![up.clone(), down.clone()]);
        let mut options = NetworkOptions::default();
        options.use_predicted_arrival = true;
        update_network_prediction(&mut net_predicted, TOD, &options).unwrap();
        let delay_predicted = net_predicted
            .get_movement_tod_curve("B", TOD)
            .unwrap()
            .predicted_delay;

        let mut net_observed = corridor_net(vec![up, down]);
        options.use_predicted_arrival = false;
        update_network_prediction(&mut net_observed, TOD, &options).unwrap();
        let delay_observed = net_observed
            .get_movement_tod_curve("B", TOD)
            .unwrap()
            .predicted_delay;

        assert!(
            delay_predicted <= delay_observed + 1e-9,
            "aligned platoon delay {} exceeds uniform-arrival delay {}",
            delay_predicted,
            delay_observed
        );
    }

    #[test]
    fn repeated_solves_are_bit_identical() {
        let up = basic_movement("A", "J1", 2);
        let mut down = basic_movement("B", "J2", 2);
        link(&up, &mut down, 5.0);
        let mut net = corridor_net(vec![up, down]);

        let options = NetworkOptions::default();
        let objective1 = update_network_prediction(&mut net, TOD, &options).unwrap();
        let delay1_a = net.get_movement_tod_curve("A", TOD).unwrap().predicted_delay;
        let delay1_b = net.get_movement_tod_curve("B", TOD).unwrap().predicted_delay;

        let objective2 = update_network_prediction(&mut net, TOD, &options).unwrap();
        let delay2_a = net.get_movement_tod_curve("A", TOD).unwrap().predicted_delay;
        let delay2_b = net.get_movement_tod_curve("B", TOD).unwrap().predicted_delay;

        assert_eq!(objective1.to_bits(), objective2.to_bits());
        assert_eq!(delay1_a.to_bits(), delay2_a.to_bits());
        assert_eq!(delay1_b.to_bits(), delay2_b.to_bits());
    }

    #[test]
    fn missing_penetration_is_fatal() {
        let mut movement = basic_movement("A", "J1", 2);
        movement.penetration_rate = None;
        let mut net = corridor_net(vec![movement]);
        let result = update_network_prediction(&mut net, TOD, &NetworkOptions::default());
        assert!(result.is_err());
        assert!(format!("{}", result.unwrap_err()).contains("Penetration rate"));
    }

    #[test]
    fn global_penetration_rescues_unset_movements() {
        let mut movement = basic_movement("A", "J1", 2);
        movement.penetration_rate = None;
        let mut net = corridor_net(vec![movement]);
        let mut options = NetworkOptions::default();
        options.global_p = Some(0.25);
        assert!(update_network_prediction(&mut net, TOD, &options).is_ok());
        let movement = net.get_movement_tod_curve("A", TOD).unwrap();
        assert_eq!(movement.penetration_rate, Some(0.25));
    }

    #[test]
    fn mutual_conflict_deadlocks_without_retry() {
        let mut c = basic_movement("C", "J1", 2);
        let mut d = basic_movement("D", "J1", 6);
        c.conflicting_movement_list = vec![String::from("D")];
        d.conflicting_movement_list = vec![String::from("C")];
        let mut net = corridor_net(vec![c, d]);
        let mut options = NetworkOptions::default();
        options.retry_with_loop = false;
        let result = update_network_prediction(&mut net, TOD, &options);
        assert!(result.is_err());
        let message = format!("{}", result.unwrap_err());
        assert!(message.contains("not processed"), "unexpected message: {}", message);
        assert!(message.contains("conflicting"));
    }

    #[test]
    fn mutual_conflict_resolves_with_loop_retry() {
        let mut c = basic_movement("C", "J1", 2);
        let mut d = basic_movement("D", "J1", 6);
        c.conflicting_movement_list = vec![String::from("D")];
        d.conflicting_movement_list = vec![String::from("C")];
        let mut net = corridor_net(vec![c, d]);
        let objective = update_network_prediction(&mut net, TOD, &NetworkOptions::default()).unwrap();
        assert!(objective.is_finite());
        assert!(net.get_movement_tod_curve("C", TOD).unwrap().departure_curve.predict_list.is_some());
        assert!(net.get_movement_tod_curve("D", TOD).unwrap().departure_curve.predict_list.is_some());
    }

    #[test]
    fn through_cost_only_skips_turning_movements() {
        // identical nets, but the left turn (odd index) only counts in one
        let through = basic_movement("A", "J1", 2);
        let mut left = basic_movement("B", "J1", 1);
        left.total_control_delay = 50000.0;
        let mut net_all = corridor_net(vec![through.clone(), left.clone()]);
        let mut net_through = corridor_net(vec![through, left]);

        let mut options = NetworkOptions::default();
        let objective_all = update_network_prediction(&mut net_all, TOD, &options).unwrap();
        options.through_cost_only = true;
        let objective_through = update_network_prediction(&mut net_through, TOD, &options).unwrap();
        assert!(
            objective_through < objective_all,
            "through-only objective {} should drop the left turn's huge residual (all: {})",
            objective_through,
            objective_all
        );
    }

    #[test]
    fn offset_overrides_move_the_objective() {
        // six-intersection corridor on a common cycle: sweeping relative
        // offsets must change the objective
        let mut movements = Vec::new();
        let mut previous: Option<MovementCurve> = None;
        for junction in 1..=6 {
            let movement_id = format!("M{}", junction);
            let junction_id = format!("J{}", junction);
            let mut movement = basic_movement(&movement_id, &junction_id, 2);
            if let Some(ref up) = previous {
                link(up, &mut movement, 5.0);
            }
            previous = Some(movement.clone());
            movements.push(movement);
        }

        let mut objectives = Vec::new();
        for offset in [-12.0, -6.0, 0.0, 6.0, 12.0].iter() {
            let mut net = corridor_net(movements.clone());
            let mut options = NetworkOptions::default();
            for junction in 1..=6 {
                options
                    .offset_dict
                    .insert(format!("J{}", junction), offset * junction as f64);
            }
            let objective = update_network_prediction(&mut net, TOD, &options).unwrap();
            objectives.push(objective);
        }
        let first = objectives[0];
        assert!(
            objectives.iter().any(|objective| (objective - first).abs() > 1e-12),
            "objective is constant across offsets: {:?}",
            objectives
        );
    }
}
