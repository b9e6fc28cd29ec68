use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Deserialize};
use simple_error::bail;

use crate::FnResult;
use super::MovementCurve;

/// A corridor network is a collection of movements, keyed by movement id
/// and time-of-day name. BTreeMaps keep every iteration lexicographic by
/// movement id so that solves are reproducible bit-for-bit.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MovementNetDict {
    #[serde(rename = "movements", default)]
    pub dict: BTreeMap<String, BTreeMap<String, MovementCurve>>,
    #[serde(default)]
    pub resolution: f64,
    #[serde(rename = "repeats", default)]
    pub departure_repeats: usize,
    #[serde(default)]
    pub date_list: Vec<String>,
    /// tod_name -> [start_hour, end_hour]
    #[serde(default)]
    pub tod_dict: BTreeMap<String, Vec<f64>>,
}

impl MovementNetDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_movement_tod_curve(&mut self, movement_curve: MovementCurve) {
        let movement_id = movement_curve.movement_id.clone();
        let tod_name = movement_curve.tod_name.clone();
        self.dict
            .entry(movement_id)
            .or_insert_with(BTreeMap::new)
            .insert(tod_name, movement_curve);
    }

    pub fn get_movement_tod_curve(&self, movement_id: &str, tod_name: &str) -> Option<&MovementCurve> {
        self.dict.get(movement_id)?.get(tod_name)
    }

    pub fn get_movement_tod_curve_mut(
        &mut self,
        movement_id: &str,
        tod_name: &str,
    ) -> Option<&mut MovementCurve> {
        self.dict.get_mut(movement_id)?.get_mut(tod_name)
    }

    /// All (movement_id, tod_name) pairs, in deterministic order.
    pub fn movement_tod_keys(&self) -> Vec<(String, String)> {
        let mut keys = Vec::new();
        for (movement_id, movement_dict) in &self.dict {
            for tod_name in movement_dict.keys() {
                keys.push((movement_id.clone(), tod_name.clone()));
            }
        }
        keys
    }

    /// Combine observation sets of the same corridor from different dates.
    /// Both nets must have been binned at the same resolution.
    pub fn aggregate(&self, other: &MovementNetDict) -> FnResult<MovementNetDict> {
        if self.resolution != other.resolution {
            bail!(
                "Two dicts should have the same resolution: {:?} with {} and {:?} with {}",
                self.date_list,
                self.resolution,
                other.date_list,
                other.resolution
            );
        }
        let mut new_dict = MovementNetDict::new();
        new_dict.date_list = self.date_list.clone();
        new_dict.date_list.extend_from_slice(&other.date_list);
        new_dict.resolution = self.resolution;
        new_dict.departure_repeats = self.departure_repeats;
        new_dict.tod_dict = self.tod_dict.clone();
        for (movement_id, movement_tod_dict) in &self.dict {
            for (tod_name, local_curve) in movement_tod_dict {
                let mut new_curve = local_curve.clone();
                if let Some(other_curve) = other.get_movement_tod_curve(movement_id, tod_name) {
                    new_curve.append(other_curve);
                }
                new_dict.add_movement_tod_curve(new_curve);
            }
        }
        Ok(new_dict)
    }

    /// Fold origins that contribute too few trajectories, or whose upstream
    /// movement has no curve at this TOD, into the "null" sentinel. The
    /// merge applies to histogram, probability and prediction dicts alike,
    /// and the upstream movement list is rebuilt from the surviving keys.
    pub fn merge_minor_origins(&mut self, movement_id: &str, tod_name: &str, min_prop: f64) {
        let live_upstreams: BTreeSet<String> = self
            .dict
            .iter()
            .filter(|(_, tods)| tods.contains_key(tod_name))
            .map(|(id, _)| id.clone())
            .collect();

        let movement_curve = match self.get_movement_tod_curve_mut(movement_id, tod_name) {
            Some(curve) => curve,
            None => return,
        };
        let total_trajs = movement_curve.total_trajs.max(1.0);

        let mut uncoord_curve: Option<Vec<f64>> = None;
        let mut uncoord_prob: Option<Vec<f64>> = None;
        let mut uncoord_predict: Option<Vec<f64>> = None;
        let mut new_origin_dict = BTreeMap::new();
        let mut new_origin_prob_dict = BTreeMap::new();
        let mut new_origin_predict_dict = BTreeMap::new();

        let arrival = &movement_curve.arrival_curve;
        for (origin_movement_id, curve_list) in &arrival.origin_curve_dict {
            let origin_trajs: f64 = curve_list.iter().sum();
            let origin_proportion = origin_trajs / total_trajs;
            let has_upstream =
                origin_movement_id != "null" && live_upstreams.contains(origin_movement_id);
            if !has_upstream || origin_proportion <= min_prop {
                accumulate(&mut uncoord_curve, curve_list);
                if let Some(prob_list) = arrival.origin_prob_dict.get(origin_movement_id) {
                    accumulate(&mut uncoord_prob, prob_list);
                }
                if let Some(predict_list) = arrival.origin_predict_dict.get(origin_movement_id) {
                    accumulate(&mut uncoord_predict, predict_list);
                }
            } else {
                new_origin_dict.insert(origin_movement_id.clone(), curve_list.clone());
                if let Some(prob_list) = arrival.origin_prob_dict.get(origin_movement_id) {
                    new_origin_prob_dict.insert(origin_movement_id.clone(), prob_list.clone());
                }
                if let Some(predict_list) = arrival.origin_predict_dict.get(origin_movement_id) {
                    new_origin_predict_dict.insert(origin_movement_id.clone(), predict_list.clone());
                }
            }
        }

        if let Some(uncoord) = uncoord_curve {
            new_origin_dict.insert(String::from("null"), uncoord);
        }
        if let Some(uncoord) = uncoord_prob {
            new_origin_prob_dict.insert(String::from("null"), uncoord);
        }
        if let Some(uncoord) = uncoord_predict {
            new_origin_predict_dict.insert(String::from("null"), uncoord);
        }

        let new_movement_list: Vec<String> = new_origin_dict
            .keys()
            .filter(|movement_id| movement_id.as_str() != "null")
            .cloned()
            .collect();
        movement_curve.upstream_movement_list = new_movement_list;
        movement_curve.arrival_curve.origin_curve_dict = new_origin_dict;
        movement_curve.arrival_curve.origin_prob_dict = new_origin_prob_dict;
        movement_curve.arrival_curve.origin_predict_dict = new_origin_predict_dict;
    }

    /// Normalize all dependency lists: merge near-empty origins and drop
    /// conflicting ids that have no curve at the movement's TOD.
    pub fn check_network_topology(&mut self) {
        for (movement_id, tod_name) in self.movement_tod_keys() {
            self.merge_minor_origins(&movement_id, &tod_name, 0.001);

            let live: BTreeSet<String> = self
                .dict
                .iter()
                .filter(|(_, tods)| tods.contains_key(&tod_name))
                .map(|(id, _)| id.clone())
                .collect();
            if let Some(movement_curve) = self.get_movement_tod_curve_mut(&movement_id, &tod_name) {
                movement_curve
                    .conflicting_movement_list
                    .retain(|conflicting_id| live.contains(conflicting_id));
            }
        }
    }
}

fn accumulate(target: &mut Option<Vec<f64>>, other: &[f64]) {
    match target {
        None => *target = Some(other.to_vec()),
        Some(values) => {
            if values.len() < other.len() {
                values.resize(other.len(), 0.0);
            }
            for (idx, val) in other.iter().enumerate() {
                values[idx] += val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_curve(movement_id: &str, tod_name: &str) -> MovementCurve {
        let mut curve = MovementCurve::default();
        curve.movement_id = String::from(movement_id);
        curve.tod_name = String::from(tod_name);
        curve
    }

    #[test]
    fn aggregate_rejects_resolution_mismatch() {
        let mut a = MovementNetDict::new();
        a.resolution = 3.0;
        a.date_list = vec![String::from("2020-06-15")];
        let mut b = MovementNetDict::new();
        b.resolution = 5.0;
        b.date_list = vec![String::from("2020-06-16")];
        assert!(a.aggregate(&b).is_err());
    }

    #[test]
    fn aggregate_combines_dates() {
        let mut a = MovementNetDict::new();
        a.resolution = 3.0;
        a.date_list = vec![String::from("2020-06-15")];
        a.add_movement_tod_curve(minimal_curve("m1", "am"));
        let mut b = MovementNetDict::new();
        b.resolution = 3.0;
        b.date_list = vec![String::from("2020-06-16")];
        b.add_movement_tod_curve(minimal_curve("m1", "am"));
        let combined = a.aggregate(&b).unwrap();
        assert_eq!(combined.date_list.len(), 2);
        assert!(combined.get_movement_tod_curve("m1", "am").is_some());
    }

    #[test]
    fn minor_origins_merge_into_null() {
        let mut net = MovementNetDict::new();
        net.add_movement_tod_curve(minimal_curve("up_major", "am"));

        let mut down = minimal_curve("down", "am");
        down.total_trajs = 100.0;
        down.arrival_curve
            .origin_curve_dict
            .insert(String::from("up_major"), vec![40.0, 40.0]);
        // below the 5% threshold
        down.arrival_curve
            .origin_curve_dict
            .insert(String::from("up_minor"), vec![2.0, 0.0]);
        // no curve for this one at all
        down.arrival_curve
            .origin_curve_dict
            .insert(String::from("up_gone"), vec![9.0, 9.0]);
        net.add_movement_tod_curve(down);

        net.merge_minor_origins("down", "am", 0.05);
        let down = net.get_movement_tod_curve("down", "am").unwrap();
        assert_eq!(down.upstream_movement_list, vec![String::from("up_major")]);
        assert_eq!(
            down.arrival_curve.origin_curve_dict.get("null").unwrap(),
            &vec![11.0, 9.0]
        );
        assert!(down.arrival_curve.origin_curve_dict.contains_key("up_major"));
        assert!(!down.arrival_curve.origin_curve_dict.contains_key("up_minor"));
    }
}
