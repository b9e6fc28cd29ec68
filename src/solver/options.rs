use std::collections::BTreeMap;

/// The full keyword surface of a network prediction run. Junction-level
/// overrides win over global ones, movement-level penetration wins over the
/// global rate.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    /// additive offset per junction id, applied on top of each movement's
    /// own offset
    pub offset_dict: BTreeMap<String, f64>,
    /// replacement green intervals per movement id
    pub green_dict: BTreeMap<String, Vec<(f64, f64)>>,
    /// cycle length per junction id, wins over `global_cycle`
    pub cycle_dict: BTreeMap<String, f64>,
    pub global_cycle: Option<f64>,
    pub global_p: Option<f64>,
    /// penetration rate per movement id, wins over `global_p`
    pub p_dict: BTreeMap<String, f64>,
    /// only movements with NEMA index 2/4/6/8 contribute to the objective
    pub through_cost_only: bool,
    /// start in augmented-readiness mode (implies no retry)
    pub dependency_loop: bool,
    pub use_predicted_arrival: bool,
    pub max_super_iterations: usize,
    pub super_stopping_criteria: f64,
    /// on topological deadlock, retry once with `dependency_loop` set
    pub retry_with_loop: bool,
    /// how many cycles ahead the occupied-slot lookahead reaches
    pub max_occupied_repeats: usize,
    /// print progress banners
    pub disp: bool,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        NetworkOptions {
            offset_dict: BTreeMap::new(),
            green_dict: BTreeMap::new(),
            cycle_dict: BTreeMap::new(),
            global_cycle: None,
            global_p: None,
            p_dict: BTreeMap::new(),
            through_cost_only: false,
            dependency_loop: false,
            use_predicted_arrival: true,
            max_super_iterations: 5,
            super_stopping_criteria: 1e-8,
            retry_with_loop: true,
            max_occupied_repeats: 3,
            disp: false,
        }
    }
}
