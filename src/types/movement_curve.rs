use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::curves::agg_curves;
use super::PermissiveType;

fn default_resolution() -> f64 {
    3.0
}

fn default_sat_flow() -> f64 {
    1800.0
}

fn default_lane_number() -> f64 {
    1.0
}

fn default_gap_acceptance() -> f64 {
    10.0
}

/// Histogram of observed crossing times within a cycle plus its scaled
/// probability and predicted counterparts.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ArrivalCurve {
    #[serde(default)]
    pub raw_data_list: Vec<f64>,
    #[serde(default)]
    pub curve_list: Vec<f64>,
    #[serde(default)]
    pub prob_list: Option<Vec<f64>>,
    #[serde(default)]
    pub predict_list: Option<Vec<f64>>,
    #[serde(default)]
    pub dimension: usize,
    /// raw crossing times keyed by the upstream movement they came from
    #[serde(default)]
    pub raw_data_dict: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub origin_curve_dict: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub origin_prob_dict: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub origin_predict_dict: BTreeMap<String, Vec<f64>>,
}

impl ArrivalCurve {
    /// Rescale the histogram into a per-cycle probability, per origin too
    /// so that diverge calibration stays consistent after the rescale.
    pub fn update_prob_curve(&mut self, coefficient: f64) {
        self.prob_list = Some(self.curve_list.iter().map(|val| val * coefficient).collect());
        let origin_prob_dict: BTreeMap<String, Vec<f64>> = self
            .origin_curve_dict
            .iter()
            .map(|(origin_id, curve_list)| {
                let scaled = curve_list.iter().map(|val| val * coefficient).collect();
                (origin_id.clone(), scaled)
            })
            .collect();
        self.origin_prob_dict = origin_prob_dict;
    }

    pub fn append(&mut self, other: &ArrivalCurve) {
        self.raw_data_list.extend_from_slice(&other.raw_data_list);
        add_in_place(&mut self.curve_list, &other.curve_list);
        for (origin_id, time_list) in &other.raw_data_dict {
            self.raw_data_dict
                .entry(origin_id.clone())
                .or_insert_with(Vec::new)
                .extend_from_slice(time_list);
        }
        for (origin_id, curve_list) in &other.origin_curve_dict {
            let entry = self
                .origin_curve_dict
                .entry(origin_id.clone())
                .or_insert_with(|| vec![0.0; curve_list.len()]);
            add_in_place(entry, curve_list);
        }
    }
}

/// Departure histogram over the extended horizon of `extend_cycles` cycles,
/// with the first-cycle aggregates cached alongside.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DepartureCurve {
    #[serde(default)]
    pub raw_data_list: Vec<f64>,
    #[serde(default)]
    pub curve_list: Vec<f64>,
    #[serde(default)]
    pub prob_list: Option<Vec<f64>>,
    #[serde(default)]
    pub predict_list: Option<Vec<f64>>,
    #[serde(default)]
    pub dimension: usize,
    #[serde(default)]
    pub extend_cycles: usize,
    #[serde(default)]
    pub agg_curve_list: Option<Vec<f64>>,
    #[serde(default)]
    pub agg_prob_list: Option<Vec<f64>>,
    #[serde(default)]
    pub agg_predict_list: Option<Vec<f64>>,
}

impl DepartureCurve {
    pub fn update_prob_curve(&mut self, coefficient: f64) {
        self.prob_list = Some(self.curve_list.iter().map(|val| val * coefficient).collect());
    }

    /// Fold every curve that spans the full departure horizon back onto the
    /// first cycle.
    pub fn agg_curves(&mut self) {
        if self.extend_cycles == 0 {
            return;
        }
        if let Some(prob_list) = &self.prob_list {
            if prob_list.len() == self.dimension {
                self.agg_prob_list = Some(agg_curves(prob_list, self.dimension, self.extend_cycles));
            }
        }
        if self.curve_list.len() == self.dimension {
            self.agg_curve_list =
                Some(agg_curves(&self.curve_list, self.dimension, self.extend_cycles));
        }
        if let Some(predict_list) = &self.predict_list {
            if predict_list.len() == self.dimension {
                self.agg_predict_list =
                    Some(agg_curves(predict_list, self.dimension, self.extend_cycles));
            }
        }
    }

    /// L2 distance between the observed probability curve and the
    /// prediction, if both exist.
    pub fn get_prediction_error(&self) -> Option<f64> {
        let prob_list = self.prob_list.as_ref()?;
        let predict_list = self.predict_list.as_ref()?;
        let error: f64 = prob_list
            .iter()
            .zip(predict_list.iter())
            .map(|(prob, predict)| (prob - predict) * (prob - predict))
            .sum();
        Some(error.sqrt())
    }

    pub fn append(&mut self, other: &DepartureCurve) {
        self.raw_data_list.extend_from_slice(&other.raw_data_list);
        add_in_place(&mut self.curve_list, &other.curve_list);
    }
}

fn add_in_place(target: &mut Vec<f64>, other: &[f64]) {
    if target.len() < other.len() {
        target.resize(other.len(), 0.0);
    }
    for (idx, val) in other.iter().enumerate() {
        target[idx] += val;
    }
}

/// One movement at one time-of-day: signal plan, calibrated curves,
/// observation counters and every derived prediction. Owned by the
/// [`MovementNetDict`](super::MovementNetDict); the solver mutates it in
/// place and never destroys it.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MovementCurve {
    // identity
    #[serde(default)]
    pub movement_id: String,
    #[serde(default)]
    pub movement_index: u32,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub junction_id: String,
    #[serde(default)]
    pub tod_interval: Vec<f64>,
    #[serde(default)]
    pub tod_name: String,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub departure_cycles: usize,
    #[serde(default)]
    pub number_of_dates: u32,

    #[serde(default)]
    pub arrival_curve: ArrivalCurve,
    #[serde(default)]
    pub departure_curve: DepartureCurve,

    // signal plan
    #[serde(default)]
    pub cycle_length: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub green_time: Vec<(f64, f64)>,
    #[serde(default)]
    pub additional_offset: f64,
    #[serde(default)]
    pub green_start_shift: f64,
    #[serde(default)]
    pub effective_green_change: f64,
    #[serde(default)]
    pub yellow_change_interval: f64,
    #[serde(default)]
    pub clearance_interval: f64,
    #[serde(default)]
    pub binary_green: bool,

    // physics
    #[serde(default = "default_sat_flow")]
    pub sat_flow_per_lane: f64,
    #[serde(default = "default_lane_number")]
    pub equivalent_lane_number: f64,
    #[serde(default)]
    pub upstream_movement_list: Vec<String>,
    #[serde(default)]
    pub upstream_length: Option<f64>,

    // permissive behaviour
    #[serde(default)]
    pub conflicting_movement_list: Vec<String>,
    #[serde(default)]
    pub permissive_type: Option<PermissiveType>,
    #[serde(default = "default_gap_acceptance")]
    pub gap_acceptance: f64,
    #[serde(default)]
    pub permissive_capacity_list: Option<Vec<f64>>,
    #[serde(default)]
    pub leftover_capacity_list: Option<Vec<f64>>,

    // signal state & capacity over the departure horizon
    #[serde(default)]
    pub signal_state_list: Option<Vec<f64>>,
    #[serde(default)]
    pub capacity_state_list: Option<Vec<f64>>,

    // ground truth
    #[serde(default)]
    pub total_trajs: f64,
    #[serde(default)]
    pub total_stopped_trajs: f64,
    #[serde(default)]
    pub total_control_delay: f64,
    #[serde(default)]
    pub total_stop_delay: f64,
    #[serde(default)]
    pub measured_free_v: f64,
    #[serde(default)]
    pub hist_avg_delay: f64,

    // estimated values
    #[serde(default)]
    pub pmf_list: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub eff_capacity_list: Option<Vec<f64>>,
    #[serde(default)]
    pub penetration_rate: Option<f64>,
    #[serde(default)]
    pub departure_calibration_error: Option<f64>,
    #[serde(default)]
    pub hourly_volume: Option<f64>,
    #[serde(default)]
    pub predicted_delay: f64,
    #[serde(default)]
    pub predicted_stop_ratio: f64,

    // per-origin calibration results
    #[serde(default)]
    pub origin_diverge_dict: BTreeMap<String, f64>,
    #[serde(default)]
    pub origin_shift_dict: BTreeMap<String, i64>,
    #[serde(default)]
    pub origin_error_dict: BTreeMap<String, f64>,
}

impl Default for MovementCurve {
    fn default() -> Self {
        MovementCurve {
            movement_id: String::new(),
            movement_index: 0,
            direction: String::new(),
            junction_id: String::new(),
            tod_interval: Vec::new(),
            tod_name: String::new(),
            resolution: default_resolution(),
            departure_cycles: 0,
            number_of_dates: 0,
            arrival_curve: ArrivalCurve::default(),
            departure_curve: DepartureCurve::default(),
            cycle_length: 0.0,
            offset: 0.0,
            green_time: Vec::new(),
            additional_offset: 0.0,
            green_start_shift: 0.0,
            effective_green_change: 0.0,
            yellow_change_interval: 0.0,
            clearance_interval: 0.0,
            binary_green: false,
            sat_flow_per_lane: default_sat_flow(),
            equivalent_lane_number: default_lane_number(),
            upstream_movement_list: Vec::new(),
            upstream_length: None,
            conflicting_movement_list: Vec::new(),
            permissive_type: None,
            gap_acceptance: default_gap_acceptance(),
            permissive_capacity_list: None,
            leftover_capacity_list: None,
            signal_state_list: None,
            capacity_state_list: None,
            total_trajs: 0.0,
            total_stopped_trajs: 0.0,
            total_control_delay: 0.0,
            total_stop_delay: 0.0,
            measured_free_v: 0.0,
            hist_avg_delay: 0.0,
            pmf_list: None,
            eff_capacity_list: None,
            penetration_rate: None,
            departure_calibration_error: None,
            hourly_volume: None,
            predicted_delay: 0.0,
            predicted_stop_ratio: 0.0,
            origin_diverge_dict: BTreeMap::new(),
            origin_shift_dict: BTreeMap::new(),
            origin_error_dict: BTreeMap::new(),
        }
    }
}

impl MovementCurve {
    /// Pick the arrival/departure curve pair (and the normalization mass)
    /// that a delay computation should run on. Predicted curves silently
    /// fall back to observed probabilities when no prediction exists yet,
    /// and any prediction request forces probability curves.
    pub fn get_arrival_departure_curves(
        &self,
        prob: bool,
        departure_predict: bool,
        arrival_predict: bool,
    ) -> (Vec<f64>, Vec<f64>, f64) {
        let departure_predict = departure_predict && self.departure_curve.predict_list.is_some();
        let arrival_predict = arrival_predict && self.arrival_curve.predict_list.is_some();
        let prob = prob || departure_predict || arrival_predict;

        if !prob {
            let arrival_list = self.arrival_curve.curve_list.clone();
            let departure_list = self.departure_curve.curve_list.clone();
            return (arrival_list, departure_list, self.total_trajs);
        }

        let departure_list = if departure_predict {
            self.departure_curve.predict_list.clone().unwrap_or_default()
        } else {
            self.departure_curve.prob_list.clone().unwrap_or_default()
        };
        let arrival_list = if arrival_predict {
            self.arrival_curve.predict_list.clone().unwrap_or_default()
        } else {
            self.arrival_curve.prob_list.clone().unwrap_or_default()
        };
        let normalize = departure_list.iter().sum();
        (arrival_list, departure_list, normalize)
    }

    /// Merge another observation set of the same movement (other dates)
    /// into this one. Counters add up, the free-flow speed is weighted by
    /// trajectory counts, histograms add element-wise.
    pub fn append(&mut self, other: &MovementCurve) {
        let total_trajs_number = self.total_trajs + other.total_trajs;
        if total_trajs_number > 0.0 {
            self.measured_free_v = (self.total_trajs * self.measured_free_v
                + other.total_trajs * other.measured_free_v)
                / total_trajs_number;
        }
        self.number_of_dates += other.number_of_dates;
        self.total_trajs += other.total_trajs;
        self.total_control_delay += other.total_control_delay;
        self.total_stop_delay += other.total_stop_delay;
        self.total_stopped_trajs += other.total_stopped_trajs;
        self.arrival_curve.append(&other.arrival_curve);
        self.departure_curve.append(&other.departure_curve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_weights_free_flow_speed_by_trajs() {
        let mut a = MovementCurve::default();
        a.total_trajs = 30.0;
        a.measured_free_v = 10.0;
        a.number_of_dates = 2;
        let mut b = MovementCurve::default();
        b.total_trajs = 10.0;
        b.measured_free_v = 14.0;
        b.number_of_dates = 1;
        a.append(&b);
        assert!((a.measured_free_v - 11.0).abs() < 1e-12);
        assert_eq!(a.number_of_dates, 3);
        assert!((a.total_trajs - 40.0).abs() < 1e-12);
    }

    #[test]
    fn curve_selection_falls_back_without_prediction() {
        let mut curve = MovementCurve::default();
        curve.arrival_curve.prob_list = Some(vec![0.1, 0.2]);
        curve.departure_curve.prob_list = Some(vec![0.05, 0.25]);
        // prediction requested but absent, so the observed probability
        // curves must come back
        let (arrival, departure, normalize) =
            curve.get_arrival_departure_curves(false, true, true);
        assert_eq!(arrival, vec![0.1, 0.2]);
        assert_eq!(departure, vec![0.05, 0.25]);
        assert!((normalize - 0.3).abs() < 1e-12);
    }

    #[test]
    fn departure_aggregation_folds_to_first_cycle() {
        let mut departure = DepartureCurve::default();
        departure.dimension = 4;
        departure.extend_cycles = 2;
        departure.prob_list = Some(vec![0.1, 0.2, 0.3, 0.4]);
        departure.curve_list = vec![1.0, 2.0, 3.0, 4.0];
        departure.agg_curves();
        assert_eq!(departure.agg_prob_list.as_ref().unwrap(), &vec![0.4, 0.6000000000000001]);
        assert_eq!(departure.agg_curve_list.as_ref().unwrap(), &vec![4.0, 6.0]);
    }

    #[test]
    fn prediction_error_is_l2() {
        let mut departure = DepartureCurve::default();
        departure.prob_list = Some(vec![0.0, 3.0]);
        departure.predict_list = Some(vec![4.0, 3.0]);
        assert!((departure.get_prediction_error().unwrap() - 4.0).abs() < 1e-12);
        departure.prob_list = None;
        assert!(departure.get_prediction_error().is_none());
    }
}
