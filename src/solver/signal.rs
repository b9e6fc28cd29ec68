//! Traffic-signal state over the departure horizon.
//!
//! The state is the probability that the movement has right-of-way within a
//! time step: 1 in stable green, 0 in stable red, and smeared across the
//! green edges by a normally distributed start-up (leading edge) and the
//! yellow/clearance interval (trailing edge).

use crate::curves::{
    cum_normal_abnormal_green_start, cum_normal_green_start, shift_list_by_val,
    DEFAULT_GREEN_START_MU, DEFAULT_GREEN_START_SIGMA,
};
use crate::types::{MovementCurve, PermissiveType};

/// Combine the signal state with the permissive capacity contributed by
/// conflicting flows into the effective per-step capacity.
pub fn update_movement_capacity_state(movement_tod: &mut MovementCurve, permissive: f64) {
    update_movement_signal_state(movement_tod);

    let departure_dim = movement_tod.departure_curve.dimension;
    let signal_state_list = movement_tod
        .signal_state_list
        .clone()
        .unwrap_or_else(|| vec![0.0; departure_dim]);

    let mut capacity_state_list = Vec::with_capacity(departure_dim);
    for i_step in 0..departure_dim {
        let signal_state = signal_state_list.get(i_step).copied().unwrap_or(0.0);
        let conflicting_state = movement_tod
            .permissive_capacity_list
            .as_ref()
            .and_then(|list| list.get(i_step))
            .copied()
            .unwrap_or(0.0);

        // a permissive left turn can only ever use gaps in the conflicting
        // flow; every other movement takes whichever is better
        let capacity_state =
            if movement_tod.permissive_type == Some(PermissiveType::LtTurnPermissive) {
                if signal_state > 0.0 {
                    conflicting_state * permissive
                } else {
                    signal_state
                }
            } else {
                conflicting_state.max(signal_state)
            };
        capacity_state_list.push(capacity_state);
    }
    movement_tod.capacity_state_list = Some(capacity_state_list);
}

/// Fill `signal_state_list` for every departure-domain step, then shift the
/// whole profile by the junction offset plus the green-start shift.
pub fn update_movement_signal_state(movement_tod: &mut MovementCurve) {
    let mut signal_state_list = Vec::with_capacity(movement_tod.departure_curve.dimension);
    for i_t in 0..movement_tod.departure_curve.dimension {
        let signal_state = get_signal_state(movement_tod, i_t as f64 * movement_tod.resolution);
        signal_state_list.push(signal_state);
    }
    let shifted = shift_list_by_val(
        &signal_state_list,
        (movement_tod.additional_offset + movement_tod.green_start_shift) / movement_tod.resolution,
    );
    // the edge integrals carry a little quadrature noise
    let clamped = shifted.iter().map(|val| val.max(0.0).min(1.0)).collect();
    movement_tod.signal_state_list = Some(clamped);
}

fn get_signal_state(movement_tod: &MovementCurve, t: f64) -> f64 {
    let lost_time_shift = 1.0;
    let resolution = movement_tod.resolution;
    let interval_in_cycle = t.rem_euclid(movement_tod.cycle_length) / resolution;
    let time_in_cycle = interval_in_cycle * resolution;

    for green in &movement_tod.green_time {
        let (green_offset, green_duration) = *green;
        if movement_tod.binary_green {
            // only used to produce idealized rectangular profiles
            if green_offset + DEFAULT_GREEN_START_MU <= time_in_cycle
                && time_in_cycle
                    < green_offset + green_duration - movement_tod.yellow_change_interval / 2.0
            {
                return 1.0;
            } else {
                return 0.0;
            }
        }

        let green_start = (green_offset + movement_tod.green_start_shift) / resolution;
        let green_end = (green_offset
            + green_duration
            + movement_tod.effective_green_change
            + movement_tod.green_start_shift)
            / resolution;
        let green_start_ceil = green_start.ceil();
        let mut lost_time_start = green_end
            - (movement_tod.yellow_change_interval + movement_tod.clearance_interval) / resolution;
        lost_time_start += lost_time_shift / resolution;

        // yellow and all-red starting inside this step
        if interval_in_cycle + 1.0 > lost_time_start && lost_time_start > interval_in_cycle {
            return 1.0
                - cum_normal_abnormal_green_start(
                    (interval_in_cycle + 1.0 - lost_time_start) * resolution,
                    resolution,
                    movement_tod.yellow_change_interval / 2.0,
                    DEFAULT_GREEN_START_SIGMA,
                );
        }

        // inside green, start-up distribution still resolving
        if green_start_ceil <= interval_in_cycle && interval_in_cycle < lost_time_start {
            // a protected left turn after the permissive phase has no
            // start-up loss, its queue is already rolling
            if movement_tod.permissive_type == Some(PermissiveType::LtTurnProtected) {
                return 1.0;
            }
            return cum_normal_green_start(
                green_start,
                time_in_cycle,
                resolution,
                DEFAULT_GREEN_START_MU,
                DEFAULT_GREEN_START_SIGMA,
            );
        }

        // green starting inside this step
        if interval_in_cycle + 1.0 > green_start && green_start > interval_in_cycle {
            if movement_tod.permissive_type == Some(PermissiveType::LtTurnProtected) {
                return 1.0;
            }
            return cum_normal_abnormal_green_start(
                (interval_in_cycle + 1.0 - green_start) * resolution,
                resolution,
                DEFAULT_GREEN_START_MU,
                DEFAULT_GREEN_START_SIGMA,
            );
        }

        // yellow and all-red fully covering this step
        if lost_time_start <= interval_in_cycle && interval_in_cycle < green_end {
            return 1.0
                - cum_normal_green_start(
                    lost_time_start,
                    time_in_cycle,
                    resolution,
                    movement_tod.yellow_change_interval / 2.0,
                    DEFAULT_GREEN_START_SIGMA,
                );
        }

        // green ending inside this step: linear ramp-down
        if interval_in_cycle < green_end && green_end < interval_in_cycle + 1.0 {
            return green_end - interval_in_cycle;
        }
    }
    0.0
}
