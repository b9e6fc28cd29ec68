//! Joint (queue, residual-queue) PMF propagation through one signal cycle.
//!
//! The joint state is a `max_queue x max_queue` matrix indexed `[q][r]`
//! where `q` is the in-cycle queue length and `r` the residual length of
//! vehicles that arrived too late to be served this cycle.

/// Per-step marginals and observables of one cycle of propagation.
pub struct JointQueueResult {
    /// residual-queue marginal per step, `[cycle][max_queue]`
    pub res_queue: Vec<Vec<f64>>,
    /// probability that a fresh arrival joins the residual this step
    pub d_internal: Vec<f64>,
    /// residual mass handed over to the queue per step, `[cycle][max_queue]`
    pub transit: Vec<Vec<f64>>,
    /// queue marginal per step, `[cycle][max_queue]`
    pub queue: Vec<Vec<f64>>,
    /// probability of an actual stop-bar departure per step
    pub d_actual: Vec<f64>,
}

/// Cap for the queue dimension: bounded by what the upstream link can
/// physically store at jam density, never more than two cycles worth of
/// arrivals, never less than one cycle plus one.
pub fn calc_queue_constraint(
    cycle: usize,
    upstream_link_length: f64,
    jam_density: f64,
    coef: f64,
) -> usize {
    let by_storage = (upstream_link_length / jam_density * coef).ceil() as usize + 1;
    by_storage.min(cycle * 2).max(cycle + 1)
}

/// Propagate the joint PMF for one cycle. `a(t)` is the per-step arrival
/// probability, `d(t)` whether the stop bar releases at step `t`. The
/// update order within a step is strict: arrival into residual, then the
/// diagonal residual-to-queue transit, then the departure if green.
pub fn joint_queue_matrix<A, D>(
    cycle: usize,
    max_queue: usize,
    a: A,
    d: D,
    init_queue: Option<&Vec<Vec<f64>>>,
) -> JointQueueResult
where
    A: Fn(usize) -> f64,
    D: Fn(usize) -> bool,
{
    let mut prev: Vec<Vec<f64>> = match init_queue {
        Some(init) => init.clone(),
        None => {
            let mut init = vec![vec![0.0; max_queue]; max_queue];
            init[0][0] = 1.0;
            init
        }
    };

    let mut res_queue = vec![vec![0.0; max_queue]; cycle];
    let mut d_internal = vec![0.0; cycle];
    let mut d_actual = vec![0.0; cycle];
    let mut transit = vec![vec![0.0; max_queue]; cycle];
    let mut queue = vec![vec![0.0; max_queue]; cycle];

    for t in 0..cycle {
        let arrival = a(t);
        let mut current = vec![vec![0.0; max_queue]; max_queue];

        // arrival joins the residual queue
        for q in 0..max_queue {
            for r in 0..max_queue {
                let from_below = if r > 0 { prev[q][r - 1] } else { 0.0 };
                current[q][r] = from_below * arrival + prev[q][r] * (1.0 - arrival);
            }
        }
        let no_residual: f64 = (0..max_queue).map(|q| current[q][0]).sum();
        d_internal[t] = 1.0 - no_residual;

        // diagonal transit: one residual vehicle becomes a queued vehicle
        let tmp = current.clone();
        for q in 0..max_queue {
            transit[t][q] = tmp[q][1..].iter().sum();
        }
        for q in 1..max_queue {
            current[q][0] += tmp[q - 1][1];
        }
        for q in 0..max_queue {
            for r in 1..max_queue {
                current[q][r] = 0.0;
            }
        }
        for q in 1..max_queue {
            for r in 1..max_queue - 1 {
                current[q][r] = tmp[q - 1][r + 1];
            }
        }

        // stop-bar departure during green
        if d(t) {
            let head_mass: f64 = current[0].iter().sum();
            d_actual[t] = 1.0 - head_mass;
            let margin_res_queue: Vec<f64> = (0..max_queue)
                .map(|r| (0..max_queue).map(|q| current[q][r]).sum())
                .collect();
            for r in 0..max_queue {
                let head_of_queue = current[1][r];
                current[0][r] += head_of_queue;
            }
            for q in 1..max_queue - 1 {
                let next_row = current[q + 1].clone();
                current[q] = next_row;
            }
            // whatever is unaccounted for stays pinned at the cap
            for r in 0..max_queue {
                let below_cap: f64 = (0..max_queue - 1).map(|q| current[q][r]).sum();
                current[max_queue - 1][r] = margin_res_queue[r] - below_cap;
            }
        }

        for q in 0..max_queue {
            for r in 0..max_queue {
                res_queue[t][r] += current[q][r];
                queue[t][q] += current[q][r];
            }
        }
        prev = current;
    }

    JointQueueResult {
        res_queue,
        d_internal,
        transit,
        queue,
        d_actual,
    }
}

/// Iterate one-cycle propagation until the cycle-end queue marginal feeds
/// back into the initial residual row unchanged (L2 below `threshold`), or
/// `max_iteration` passes elapse.
pub fn stationary_queue_factory<A, D>(
    cycle: usize,
    max_queue: usize,
    a: A,
    d: D,
    max_iteration: usize,
    threshold: f64,
) -> JointQueueResult
where
    A: Fn(usize) -> f64,
    D: Fn(usize) -> bool,
{
    let mut init_queue = vec![vec![0.0; max_queue]; max_queue];
    init_queue[0][0] = 1.0;
    let mut result = joint_queue_matrix(cycle, max_queue, &a, &d, Some(&init_queue));

    for _ in 1..max_iteration.max(1) {
        let diff: f64 = result.queue[cycle - 1]
            .iter()
            .zip(init_queue[0].iter())
            .map(|(new, old)| (new - old) * (new - old))
            .sum::<f64>()
            .sqrt();
        if diff < threshold {
            break;
        }
        // the queue still standing at cycle end becomes next cycle's residual
        init_queue[0].clone_from(&result.queue[cycle - 1]);
        result = joint_queue_matrix(cycle, max_queue, &a, &d, Some(&init_queue));
    }
    result
}
