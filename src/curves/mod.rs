//! Utility functions for operating on arrival & departure curve lists.
//!
//! All curves are plain `Vec<f64>` histograms indexed by cycle position.

use crate::types::MovementCurve;

pub const DEFAULT_GREEN_START_MU: f64 = 2.5;
pub const DEFAULT_GREEN_START_SIGMA: f64 = 1.0;

/// Shift a list circularly by a (possibly fractional, possibly negative) value.
/// The result is the linear blend of the two neighbouring integer rotations,
/// so mass is conserved and a shift of 0.5 spreads each bin over two cells.
pub fn shift_list_by_val(input_list: &Vec<f64>, shift_interval: f64) -> Vec<f64> {
    let len = input_list.len();
    if len == 0 {
        return Vec::new();
    }
    let shift_interval = shift_interval.rem_euclid(len as f64);
    let integer_part = shift_interval.floor() as usize;
    let proportion_part = shift_interval - integer_part as f64;

    let mut new_list = Vec::with_capacity(len);
    for k in 0..len {
        // right rotation by integer_part, and by integer_part + 1
        let idx1 = (k + len - integer_part) % len;
        let idx2 = (k + 2 * len - integer_part - 1) % len;
        let val = input_list[idx1] * (1.0 - proportion_part) + input_list[idx2] * proportion_part;
        new_list.push(val);
    }
    new_list
}

/// Time-weighted cumulative sum: `y_n = sum_{k<=n} (k+1) * x_k`.
/// The `+1` treats bin k as ending at the interval boundary, which is what
/// makes delay differences come out right.
pub fn curve_time_integral(curve_list: &Vec<f64>) -> Vec<f64> {
    let mut total_integral = 0.0;
    let mut integral_list = Vec::with_capacity(curve_list.len());
    for (idx, val) in curve_list.iter().enumerate() {
        total_integral += (idx as f64 + 1.0) * val;
        integral_list.push(total_integral);
    }
    integral_list
}

/// Aggregate a departure-domain curve (length `dimension`) back onto the
/// first cycle by summing its `extend_cycles` cycle slices.
pub fn agg_curves(curve_list: &Vec<f64>, dimension: usize, extend_cycles: usize) -> Vec<f64> {
    let dim1 = dimension / extend_cycles.max(1);
    let mut agg_list = vec![0.0; dim1];
    for i_p in 0..extend_cycles {
        for i in 0..dim1 {
            let idx = i_p * dim1 + i;
            if idx < curve_list.len() {
                agg_list[i] += curve_list[idx];
            }
        }
    }
    agg_list
}

/// Find the circular shift of `est_list` that best matches `target_list`.
/// Coarse integer sweep first; `accurate_mode` refines around the winner
/// with 0.2-step shifts. Returns `(best_shift, minimum_cost)`.
pub fn get_optimal_shift(target_list: &Vec<f64>, est_list: &Vec<f64>, accurate_mode: bool) -> (f64, f64) {
    if target_list.len() < 2 {
        return (0.0, 0.0);
    }
    let shift_start = 0.0;
    let shift_end = (target_list.len() - 1) as f64;
    let (mut optimal_shift, mut error) =
        sweep_optimal_shift(target_list, est_list, shift_start, shift_end, 1.0);
    if accurate_mode {
        let refined = sweep_optimal_shift(
            target_list,
            est_list,
            optimal_shift - 1.0,
            optimal_shift + 1.0,
            0.2,
        );
        optimal_shift = refined.0;
        error = refined.1;
    }
    (optimal_shift, error)
}

fn sweep_optimal_shift(
    target_list: &Vec<f64>,
    moving_list: &Vec<f64>,
    shift_start: f64,
    shift_end: f64,
    resolution: f64,
) -> (f64, f64) {
    let target_sum: f64 = target_list.iter().sum();
    let mut best_shift = shift_start;
    let mut minimum_cost = f64::INFINITY;
    let mut test_shift = shift_start;
    // the sweep excludes shift_end itself, as arange would
    while test_shift < shift_end - 1e-9 {
        let new_curve = shift_list_by_val(moving_list, test_shift);
        let mut local_error = 0.0;
        for (idx, target) in target_list.iter().enumerate() {
            local_error += (new_curve[idx] - target).abs();
        }
        local_error /= target_sum;
        if local_error < minimum_cost {
            minimum_cost = local_error;
            best_shift = test_shift;
        }
        test_shift += resolution;
    }
    (best_shift, minimum_cost)
}

/// Error function, Abramowitz-Stegun 7.1.26 approximation (|eps| < 1.5e-7).
pub fn erf(x: f64) -> f64 {
    if x == 0.0 {
        return 0.0;
    }
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let ax = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * ax);
    let y = 1.0
        - (((((1.061_405_429 * t - 1.453_152_027) * t) + 1.421_413_741) * t - 0.284_496_736) * t
            + 0.254_829_592)
            * t
            * (-ax * ax).exp();
    sign * y
}

pub fn gaussian_cdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / (sigma * 2.0_f64.sqrt());
    0.5 * (1.0 + erf(z))
}

/// Integral of the Gaussian CDF over `[lower, upper]` by composite Simpson.
/// The integrand is smooth and monotone, so a fixed subdivision is plenty.
fn integrate_gaussian_cdf(lower: f64, upper: f64, mu: f64, sigma: f64) -> f64 {
    const STEPS: usize = 96;
    let h = (upper - lower) / STEPS as f64;
    let mut acc = gaussian_cdf(lower, mu, sigma) + gaussian_cdf(upper, mu, sigma);
    for i in 1..STEPS {
        let x = lower + h * i as f64;
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        acc += weight * gaussian_cdf(x, mu, sigma);
    }
    acc * h / 3.0
}

/// Probability that the movement is already discharging within the time step
/// ending at `time`, for a green whose start (in step units) is `green_start`
/// and whose start-up loss is normally distributed.
pub fn cum_normal_green_start(
    green_start: f64,
    time: f64,
    resolution: f64,
    mu: f64,
    sigma: f64,
) -> f64 {
    let green_start = green_start * resolution;
    let mut green_start_time = time - green_start;
    let green_end_time = green_start_time + resolution;
    if green_start_time == 0.0 {
        green_start_time -= 1.0;
    }
    integrate_gaussian_cdf(green_start_time, green_end_time, mu, sigma) / resolution
}

/// Start-up probability for a partial step whose overlap with green is
/// `difference` seconds.
pub fn cum_normal_abnormal_green_start(difference: f64, resolution: f64, mu: f64, sigma: f64) -> f64 {
    integrate_gaussian_cdf(-1.0, difference, mu, sigma) / resolution
}

/// Scale a departure curve by the movement's saturation flow and lane count
/// relative to the 1800 veh/h single-lane baseline.
pub fn lane_and_sat_depart_adjustment(
    adjust_curve: &MovementCurve,
    adjust_departure: &Vec<f64>,
) -> Vec<f64> {
    let adjustment_factor =
        (adjust_curve.sat_flow_per_lane / 1800.0) * (adjust_curve.equivalent_lane_number / 1.0);
    adjust_departure.iter().map(|i| i * adjustment_factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn integer_shift_round_trip() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let xs: Vec<f64> = (0..12).map(|_| rng.gen::<f64>()).collect();
        for s in [-7.0, -1.0, 0.0, 1.0, 5.0, 11.0, 13.0].iter() {
            let back = shift_list_by_val(&shift_list_by_val(&xs, *s), -*s);
            for (a, b) in xs.iter().zip(back.iter()) {
                assert!((a - b).abs() < 1e-9, "shift {} did not round-trip", s);
            }
        }
    }

    #[test]
    fn fractional_shift_preserves_sum() {
        let xs = vec![0.2, 0.0, 0.5, 0.1, 0.7];
        let shifted = shift_list_by_val(&xs, 2.3);
        let sum_before: f64 = xs.iter().sum();
        let sum_after: f64 = shifted.iter().sum();
        assert!((sum_before - sum_after).abs() < 1e-12);
    }

    #[test]
    fn fractional_shift_blends_neighbours() {
        let xs = vec![1.0, 0.0, 0.0, 0.0];
        // integer part 0: blend of identity and rotation by one
        let shifted = shift_list_by_val(&xs, 0.25);
        assert!((shifted[0] - 0.75).abs() < 1e-12);
        assert!((shifted[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn time_integral_offsets_bins_by_one() {
        let integral = curve_time_integral(&vec![1.0, 2.0, 3.0]);
        assert_eq!(integral, vec![1.0, 5.0, 14.0]);
    }

    #[test]
    fn aggregation_folds_cycles() {
        let curve = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(agg_curves(&curve, 6, 3), vec![9.0, 12.0]);
    }

    #[test]
    fn optimal_shift_recovers_rotation() {
        let base = vec![0.0, 0.1, 0.6, 0.2, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0];
        let target = shift_list_by_val(&base, 4.0);
        let (shift, error) = get_optimal_shift(&target, &base, false);
        assert_eq!(shift as i64, 4);
        assert!(error < 1e-9);
    }

    #[test]
    fn gaussian_cdf_sanity() {
        assert!((gaussian_cdf(2.5, DEFAULT_GREEN_START_MU, DEFAULT_GREEN_START_SIGMA) - 0.5).abs() < 1e-7);
        assert!(gaussian_cdf(-3.0, 0.0, 1.0) < 0.0014);
        assert!(gaussian_cdf(3.0, 0.0, 1.0) > 0.9986);
    }

    #[test]
    fn green_start_probability_saturates() {
        // well inside green the start-up distribution has fully resolved
        let deep = cum_normal_green_start(0.0, 15.0, 3.0, DEFAULT_GREEN_START_MU, DEFAULT_GREEN_START_SIGMA);
        assert!(deep > 0.999 && deep <= 1.0 + 1e-9);
        // right at green start almost nothing has discharged yet
        let early = cum_normal_green_start(0.0, 0.0, 3.0, DEFAULT_GREEN_START_MU, DEFAULT_GREEN_START_SIGMA);
        assert!(early < 0.1);
    }
}
