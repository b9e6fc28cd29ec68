//! Permissive (gap-acceptance) capacity from conflicting movements.
//!
//! A movement that must yield can proceed during a step only if every step
//! of a full gap-acceptance window before it was free of conflicting
//! departures while the conflicting signal allowed flow.

use crate::curves::{agg_curves, lane_and_sat_depart_adjustment};
use crate::types::MovementNetDict;

struct ConflictingProfile {
    signal_state: Vec<f64>,
    departure: Vec<f64>,
}

/// Compute `permissive_capacity_list` and `leftover_capacity_list` for one
/// movement from its conflicting movements' predicted departures and signal
/// states, replicated over the departure horizon. Movements without
/// conflicts keep their lists unset.
pub fn update_movement_permissive_capacity(
    net_dict: &mut MovementNetDict,
    movement_id: &str,
    tod_name: &str,
    use_prediction: bool,
) {
    let (conflicting_movement_list, gap_acceptance) =
        match net_dict.get_movement_tod_curve(movement_id, tod_name) {
            Some(movement_curve) => (
                movement_curve.conflicting_movement_list.clone(),
                movement_curve.gap_acceptance,
            ),
            None => return,
        };
    if conflicting_movement_list.is_empty() {
        return;
    }

    let mut conflicting_profiles: Vec<ConflictingProfile> = Vec::new();
    let mut arrival_dim = 0;
    for cmd in &conflicting_movement_list {
        let conflict_curve = match net_dict.get_movement_tod_curve(cmd, tod_name) {
            Some(curve) => curve,
            None => continue,
        };
        if arrival_dim == 0 {
            arrival_dim = conflict_curve.arrival_curve.dimension;
        }

        let departure_curve = &conflict_curve.departure_curve;
        let conflict_departure_list = if use_prediction && departure_curve.predict_list.is_some() {
            // the trailing bin holds the not-served dump, which is no
            // real departure and must not block gaps
            let mut predict_list = departure_curve.predict_list.clone().unwrap();
            if let Some(last) = predict_list.last_mut() {
                *last = 0.0;
            }
            agg_curves(
                &predict_list,
                departure_curve.dimension,
                departure_curve.extend_cycles,
            )
        } else {
            departure_curve
                .agg_prob_list
                .clone()
                .unwrap_or_else(|| vec![0.0; arrival_dim])
        };
        let conflict_departure_list =
            lane_and_sat_depart_adjustment(conflict_curve, &conflict_departure_list);

        conflicting_profiles.push(ConflictingProfile {
            signal_state: conflict_curve.signal_state_list.clone().unwrap_or_default(),
            departure: conflict_departure_list,
        });
    }
    if conflicting_profiles.is_empty() || arrival_dim == 0 {
        return;
    }

    let mut conflict_sum_departure_list = vec![0.0; arrival_dim];
    let mut permissive_state = vec![0.0; arrival_dim];
    for profile in &conflicting_profiles {
        let signal = &profile.signal_state;
        for predict_step in 0..arrival_dim {
            if let Some(predict) = profile.departure.get(predict_step) {
                conflict_sum_departure_list[predict_step] += predict;
            }
            if signal.is_empty() {
                continue;
            }
            let current = signal.get(predict_step).copied().unwrap_or(0.0);
            let previous = if predict_step == 0 {
                *signal.last().unwrap()
            } else {
                signal.get(predict_step - 1).copied().unwrap_or(0.0)
            };
            // a dying green tail means the conflicting flow has already
            // cleared, which reads as an acceptable gap
            permissive_state[predict_step] = if previous > current && current > 0.01 {
                1.0
            } else {
                current
            };
        }
    }

    let vacant_number = (gap_acceptance / net_dict.resolution).round() as usize;
    let mut permissive_capacity_list = Vec::with_capacity(arrival_dim);
    let mut leftover_capacity_list = Vec::with_capacity(arrival_dim);
    for i_step in 0..arrival_dim {
        let mut vacant_probability = 1.0;
        for iv in 0..vacant_number {
            let idx = (i_step as i64 - iv as i64).rem_euclid(arrival_dim as i64) as usize;
            let vacant = (permissive_state[idx] - conflict_sum_departure_list[idx]).max(0.0);
            vacant_probability *= vacant;
        }
        permissive_capacity_list.push(vacant_probability);
        leftover_capacity_list
            .push((permissive_state[i_step] - conflict_sum_departure_list[i_step]).max(0.0));
    }

    // replicate over the departure horizon
    let repeats = net_dict.departure_repeats.max(1);
    let permissive_capacity_list: Vec<f64> = permissive_capacity_list
        .iter()
        .cycle()
        .take(arrival_dim * repeats)
        .copied()
        .collect();
    let leftover_capacity_list: Vec<f64> = leftover_capacity_list
        .iter()
        .cycle()
        .take(arrival_dim * repeats)
        .copied()
        .collect();

    if let Some(movement_curve) = net_dict.get_movement_tod_curve_mut(movement_id, tod_name) {
        movement_curve.permissive_capacity_list = Some(permissive_capacity_list);
        movement_curve.leftover_capacity_list = Some(leftover_capacity_list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MovementCurve;

    fn conflicting_movement(movement_id: &str, signal: Vec<f64>, departure: Vec<f64>) -> MovementCurve {
        let mut curve = MovementCurve::default();
        curve.movement_id = String::from(movement_id);
        curve.tod_name = String::from("am");
        curve.arrival_curve.dimension = signal.len();
        curve.departure_curve.dimension = signal.len();
        curve.departure_curve.extend_cycles = 1;
        curve.departure_curve.agg_prob_list = Some(departure);
        curve.signal_state_list = Some(signal);
        curve
    }

    fn yielding_movement(movement_id: &str, conflicting: Vec<&str>) -> MovementCurve {
        let mut curve = MovementCurve::default();
        curve.movement_id = String::from(movement_id);
        curve.tod_name = String::from("am");
        curve.conflicting_movement_list =
            conflicting.iter().map(|id| String::from(*id)).collect();
        curve.gap_acceptance = 6.0;
        curve
    }

    fn test_net() -> MovementNetDict {
        let mut net = MovementNetDict::new();
        net.resolution = 3.0;
        net.departure_repeats = 2;
        net
    }

    #[test]
    fn gaps_in_conflicting_red_give_full_capacity() {
        let mut net = test_net();
        // conflicting movement is red (state 0) the whole cycle: the
        // permissive state is 0, so no gap capacity at all
        net.add_movement_tod_curve(conflicting_movement("c", vec![0.0; 8], vec![0.0; 8]));
        net.add_movement_tod_curve(yielding_movement("m", vec!["c"]));
        update_movement_permissive_capacity(&mut net, "m", "am", false);
        let movement = net.get_movement_tod_curve("m", "am").unwrap();
        let permissive = movement.permissive_capacity_list.as_ref().unwrap();
        assert_eq!(permissive.len(), 16);
        assert!(permissive.iter().all(|val| *val == 0.0));
    }

    #[test]
    fn busy_conflicting_green_blocks_the_gap() {
        let mut net = test_net();
        // conflicting green with saturated departures: the gap window never
        // stays free, so permissive capacity vanishes
        net.add_movement_tod_curve(conflicting_movement("c", vec![1.0; 8], vec![1.0; 8]));
        net.add_movement_tod_curve(yielding_movement("m", vec!["c"]));
        update_movement_permissive_capacity(&mut net, "m", "am", false);
        let movement = net.get_movement_tod_curve("m", "am").unwrap();
        let permissive = movement.permissive_capacity_list.as_ref().unwrap();
        assert!(permissive.iter().all(|val| *val == 0.0));
    }

    #[test]
    fn idle_conflicting_green_leaves_gaps() {
        let mut net = test_net();
        // conflicting green but no traffic: every window is free
        net.add_movement_tod_curve(conflicting_movement("c", vec![1.0; 8], vec![0.0; 8]));
        net.add_movement_tod_curve(yielding_movement("m", vec!["c"]));
        update_movement_permissive_capacity(&mut net, "m", "am", false);
        let movement = net.get_movement_tod_curve("m", "am").unwrap();
        let permissive = movement.permissive_capacity_list.as_ref().unwrap();
        assert!(permissive.iter().all(|val| (*val - 1.0).abs() < 1e-12));
        let leftover = movement.leftover_capacity_list.as_ref().unwrap();
        assert!(leftover.iter().all(|val| (*val - 1.0).abs() < 1e-12));
    }

    #[test]
    fn dying_green_tail_counts_as_permissive() {
        let mut net = test_net();
        // step 2 is a decaying tail (0.8 -> 0.3): treated as state 1
        let signal = vec![0.0, 0.8, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0];
        net.add_movement_tod_curve(conflicting_movement("c", signal, vec![0.0; 8]));
        let mut movement = yielding_movement("m", vec!["c"]);
        movement.gap_acceptance = 3.0; // single-step window
        net.add_movement_tod_curve(movement);
        update_movement_permissive_capacity(&mut net, "m", "am", false);
        let movement = net.get_movement_tod_curve("m", "am").unwrap();
        let permissive = movement.permissive_capacity_list.as_ref().unwrap();
        assert_eq!(permissive[2], 1.0);
        assert_eq!(permissive[1], 0.8);
        assert_eq!(permissive[3], 0.0);
    }
}
