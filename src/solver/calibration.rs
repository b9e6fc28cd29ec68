//! Arrival curve calibration: per origin, how much of the upstream
//! departure diverges into this movement, and with which circular shift it
//! arrives.

use crate::curves::get_optimal_shift;
use crate::types::MovementNetDict;

/// Calibrate every movement of the net (or of one TOD when given).
pub fn arrival_curve_calibration(curve_dict: &mut MovementNetDict, tod_name: Option<&str>) {
    for (movement_id, local_tod) in curve_dict.movement_tod_keys() {
        if let Some(tod_name) = tod_name {
            if local_tod != tod_name {
                continue;
            }
        }
        movement_arrival_calibration(curve_dict, &movement_id, &local_tod, true, false);
    }
}

/// Fit shift and diverge proportion for each live origin of one movement.
/// Minor origins are merged into the "null" sentinel first.
pub fn movement_arrival_calibration(
    net_dict: &mut MovementNetDict,
    movement_id: &str,
    tod_name: &str,
    use_prob: bool,
    upstream_predict: bool,
) {
    net_dict.merge_minor_origins(movement_id, tod_name, 0.05);

    let origin_ids: Vec<String> = match net_dict.get_movement_tod_curve(movement_id, tod_name) {
        Some(movement_curve) => movement_curve
            .arrival_curve
            .origin_curve_dict
            .keys()
            .filter(|origin_id| origin_id.as_str() != "null")
            .cloned()
            .collect(),
        None => return,
    };

    for origin_movement_id in origin_ids {
        let upstream_departure_list = {
            let upstream_movement_curve =
                match net_dict.get_movement_tod_curve(&origin_movement_id, tod_name) {
                    Some(curve) => curve,
                    None => continue,
                };
            let departure_curve = &upstream_movement_curve.departure_curve;
            if upstream_predict {
                departure_curve
                    .agg_predict_list
                    .clone()
                    .or_else(|| departure_curve.agg_prob_list.clone())
            } else if use_prob {
                departure_curve.agg_prob_list.clone()
            } else {
                departure_curve.agg_curve_list.clone()
            }
        };
        let upstream_departure_list = match upstream_departure_list {
            Some(list) => list,
            None => continue,
        };

        let movement_curve = match net_dict.get_movement_tod_curve(movement_id, tod_name) {
            Some(curve) => curve,
            None => return,
        };
        let downstream_arrival_list = if use_prob {
            movement_curve
                .arrival_curve
                .origin_prob_dict
                .get(&origin_movement_id)
                .cloned()
        } else {
            movement_curve
                .arrival_curve
                .origin_curve_dict
                .get(&origin_movement_id)
                .cloned()
        };
        let downstream_arrival_list = match downstream_arrival_list {
            Some(list) => list,
            None => continue,
        };

        let downstream_sum: f64 = downstream_arrival_list.iter().sum();
        let upstream_sum: f64 = upstream_departure_list.iter().sum();
        let diverge_proportion = (downstream_sum / upstream_sum.max(0.1)).max(0.0).min(1.0);

        let scaled_upstream_departure: Vec<f64> = upstream_departure_list
            .iter()
            .map(|val| val * diverge_proportion)
            .collect();
        let (optimal_shift, error) =
            get_optimal_shift(&downstream_arrival_list, &scaled_upstream_departure, false);

        if let Some(movement_curve) = net_dict.get_movement_tod_curve_mut(movement_id, tod_name) {
            movement_curve
                .origin_diverge_dict
                .insert(origin_movement_id.clone(), diverge_proportion);
            movement_curve
                .origin_shift_dict
                .insert(origin_movement_id.clone(), optimal_shift as i64);
            movement_curve
                .origin_error_dict
                .insert(origin_movement_id.clone(), error);
        }
    }
}
