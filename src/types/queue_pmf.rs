/// A 1-D probability mass function over queue length, grown by arrivals and
/// shrunk by probabilistic departures. The tail is truncated once the CDF
/// reaches 1 - 1e-3 and the remainder renormalized, so the vector stays short.
#[derive(Debug, Clone)]
pub struct SingleQueuePmf {
    pub pmf_list: Vec<f64>,
}

impl SingleQueuePmf {
    pub fn new() -> Self {
        SingleQueuePmf { pmf_list: vec![1.0] }
    }

    /// Mix the queue with an arrival of probability `arrival_prob`:
    /// with probability a the queue grows by one, otherwise it stays.
    pub fn arrival_step(&mut self, arrival_prob: f64) {
        let arrival_prob = arrival_prob.max(0.0).min(1.0);
        let len = self.pmf_list.len();
        let mut new_pmf_list = vec![0.0; len + 1];
        for (idx, val) in self.pmf_list.iter().enumerate() {
            new_pmf_list[idx] += val * (1.0 - arrival_prob);
            new_pmf_list[idx + 1] += val * arrival_prob;
        }
        self.pmf_list = new_pmf_list;
        self.remove_tail(1e-3);
    }

    /// Release the head of the queue with probability `departure_prob`.
    /// Returns the probability that a departure actually happened, which is
    /// the chance the queue was non-empty times the release probability.
    pub fn departure_step(&mut self, departure_prob: f64) -> f64 {
        let departure_prob = departure_prob.max(0.0).min(1.0);
        let no_residual_prob = self.pmf_list[0];
        let len = self.pmf_list.len();
        let mut with_departure_list = vec![0.0; len];
        for idx in 1..len {
            with_departure_list[idx - 1] = self.pmf_list[idx];
        }
        with_departure_list[0] += no_residual_prob;
        let mut new_pmf_list = vec![0.0; len];
        for idx in 0..len {
            new_pmf_list[idx] = with_departure_list[idx] * departure_prob
                + self.pmf_list[idx] * (1.0 - departure_prob);
        }
        self.pmf_list = new_pmf_list;
        self.remove_tail(1e-3);
        (1.0 - no_residual_prob) * departure_prob
    }

    pub fn get_mean(&self) -> f64 {
        self.pmf_list
            .iter()
            .enumerate()
            .map(|(idx, val)| idx as f64 * val)
            .sum()
    }

    /// Probability that the queue length is at least `arrivals`.
    pub fn get_prob(&self, arrivals: usize) -> f64 {
        self.pmf_list
            .iter()
            .enumerate()
            .filter(|(i_arrival, _)| *i_arrival >= arrivals)
            .map(|(_, val)| val)
            .sum()
    }

    pub fn with_residual_prob(&self) -> f64 {
        self.get_prob(1)
    }

    fn remove_tail(&mut self, prop: f64) {
        let mut total_prob = 0.0;
        let mut cut_index = 0;
        for (idx, val) in self.pmf_list.iter().enumerate() {
            cut_index = idx;
            total_prob += val;
            if total_prob >= 1.0 - prop {
                break;
            }
        }
        self.pmf_list.truncate(cut_index + 1);
        let sum: f64 = self.pmf_list.iter().sum();
        let scale_coefficient = 1.0 / sum;
        for val in self.pmf_list.iter_mut() {
            *val *= scale_coefficient;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(pmf: &SingleQueuePmf) -> f64 {
        pmf.pmf_list.iter().sum()
    }

    #[test]
    fn arrival_and_departure_keep_unit_mass() {
        let mut pmf = SingleQueuePmf::new();
        for step in 0..40 {
            pmf.arrival_step(0.3);
            if step % 2 == 0 {
                pmf.departure_step(0.8);
            }
            assert!((total(&pmf) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn departure_from_empty_queue_releases_nothing() {
        let mut pmf = SingleQueuePmf::new();
        let released = pmf.departure_step(1.0);
        assert!(released.abs() < 1e-12);
        assert!((pmf.pmf_list[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn certain_arrivals_stack_up() {
        let mut pmf = SingleQueuePmf::new();
        pmf.arrival_step(1.0);
        pmf.arrival_step(1.0);
        assert!(pmf.get_prob(2) > 0.999);
        assert!((pmf.get_mean() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn tail_truncation_keeps_cdf_close_to_one() {
        let mut pmf = SingleQueuePmf::new();
        for _ in 0..100 {
            pmf.arrival_step(0.5);
        }
        assert!((total(&pmf) - 1.0).abs() < 1e-9);
        assert!(pmf.pmf_list.len() < 100);
    }
}
