//! Queue PMFs to probabilistic time-space gridline matrices.
//!
//! Each `(t, n)` cell holds the expected probability that a trajectory
//! crosses the cell boundary at queue position `n` during step `t`;
//! horizontal matrices count stopped segments, vertical ones moving
//! segments. The backward shockwave tilts the grid, which shows up here as
//! a per-step right shift once the green has started discharging.

/// Cycle steps spent in red, with the green rounded to whole steps.
fn red_steps(cycle: usize, green_split: f64) -> usize {
    cycle - (cycle as f64 * green_split).round() as usize
}

/// `h[t][n] = sum_{k >= n} queue[t][k]`, with the stop bar column zeroed.
fn queue_matrix_to_horizontal_matrix(queue_matrix: &Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut horizontal = Vec::with_capacity(queue_matrix.len());
    for row in queue_matrix {
        let max_queue = row.len();
        let mut out = vec![0.0; max_queue];
        let mut acc = 0.0;
        for n in (0..max_queue).rev() {
            acc += row[n];
            out[n] = acc;
        }
        out[0] = 0.0;
        horizontal.push(out);
    }
    horizontal
}

/// Shift one row right by `shift`, filling the vacated cells with `fill`.
fn shift_row_right(row: &mut Vec<f64>, shift: usize, fill: f64) {
    let len = row.len();
    let shift = shift.min(len);
    let tmp = row.clone();
    for n in (shift..len).rev() {
        row[n] = tmp[n - shift];
    }
    for n in 0..shift {
        row[n] = fill;
    }
}

pub fn queue_mat_to_horizontal_gridlines_mat(
    queue_matrix: &Vec<Vec<f64>>,
    cycle: usize,
    green_split: f64,
) -> Vec<Vec<f64>> {
    let mut horizontal = queue_matrix_to_horizontal_matrix(queue_matrix);
    let red = red_steps(cycle, green_split);
    for (t, row) in horizontal.iter_mut().enumerate() {
        let t_in_c = t % cycle;
        if t_in_c >= red {
            shift_row_right(row, t_in_c - red + 1, 0.0);
        }
    }
    horizontal
}

/// Residual-queue horizontals shift from the cycle start, since the
/// residual shockwave leaves the stop bar at step zero.
pub fn res_queue_mat_to_horizontal_gridlines_mat(
    res_queue_matrix: &Vec<Vec<f64>>,
    cycle: usize,
) -> Vec<Vec<f64>> {
    let mut horizontal = queue_matrix_to_horizontal_matrix(res_queue_matrix);
    for (t, row) in horizontal.iter_mut().enumerate() {
        let t_in_cycle = t % cycle;
        shift_row_right(row, t_in_cycle + 1, 0.0);
    }
    horizontal
}

/// `v[t][n] = a(t) * sum_{k < n} queue[t-1][k]`, seeded by `init_queue` for
/// the first step.
fn queue_matrix_to_vertical_matrix<A>(
    queue_matrix: &Vec<Vec<f64>>,
    init_queue: &Vec<f64>,
    a: A,
) -> Vec<Vec<f64>>
where
    A: Fn(usize) -> f64,
{
    let total_time = queue_matrix.len();
    let mut vertical = Vec::with_capacity(total_time);
    for t in 0..total_time {
        let source = if t == 0 { init_queue } else { &queue_matrix[t - 1] };
        let max_queue = source.len();
        let arrival = a(t);
        let mut out = vec![0.0; max_queue];
        let mut acc = 0.0;
        for n in 1..max_queue {
            acc += source[n - 1];
            out[n] = acc * arrival;
        }
        vertical.push(out);
    }
    vertical
}

pub fn res_queue_mat_to_vertical_gridlines_mat<A>(
    res_queue_matrix: &Vec<Vec<f64>>,
    res_queue_dep: &Vec<f64>,
    a: A,
    cycle: usize,
    init_queue: &Vec<f64>,
) -> Vec<Vec<f64>>
where
    A: Fn(usize) -> f64,
{
    let mut vertical = queue_matrix_to_vertical_matrix(res_queue_matrix, init_queue, a);
    for (t, row) in vertical.iter_mut().enumerate() {
        let t_in_cycle = t % cycle;
        // the shift consumes the stop-bar column, and everything below the
        // shockwave is the internal departure probability
        row.remove(0);
        row.push(0.0);
        shift_row_right(row, t_in_cycle + 1, res_queue_dep[t]);
    }
    vertical
}

pub fn transit_mat_to_vertical_gridlines_mat(
    transit: &Vec<Vec<f64>>,
    d_actual: &Vec<f64>,
    cycle: usize,
    green_split: f64,
) -> Vec<Vec<f64>> {
    let total_time = transit.len();
    let red = red_steps(cycle, green_split);
    let mut vertical = Vec::with_capacity(total_time);
    for t in 0..total_time {
        let max_queue = transit[t].len();
        let mut out = vec![0.0; max_queue];
        let mut acc = 0.0;
        for n in 1..max_queue {
            acc += transit[t][n - 1];
            out[n] = acc;
        }
        let t_in_c = t % cycle;
        if t_in_c >= red {
            out.remove(0);
            out.push(0.0);
            shift_row_right(&mut out, t_in_c - red + 1, d_actual[t]);
        }
        vertical.push(out);
    }
    vertical
}

/// Graft the residual-queue tail onto the far side of the green-cleared
/// segment of the regular gridlines.
pub fn update_gridlines(
    cycle: usize,
    green_split: f64,
    h_grid_mat: &mut Vec<Vec<f64>>,
    v_grid_mat: &mut Vec<Vec<f64>>,
    res_h_grid_mat: &Vec<Vec<f64>>,
    res_v_grid_mat: &Vec<Vec<f64>>,
) {
    let green = (cycle as f64 * green_split).round() as usize;
    for (t, row) in h_grid_mat.iter_mut().enumerate() {
        let t_in_cycle = t % cycle;
        graft_tail(row, &res_h_grid_mat[t], green, t_in_cycle);
    }
    for (t, row) in v_grid_mat.iter_mut().enumerate() {
        let t_in_cycle = t % cycle;
        graft_tail(row, &res_v_grid_mat[t], green, t_in_cycle);
    }
}

fn graft_tail(row: &mut Vec<f64>, res_row: &Vec<f64>, green: usize, t_in_cycle: usize) {
    let max_queue = row.len();
    let dest_start = green + t_in_cycle;
    if dest_start >= max_queue || green > max_queue {
        return;
    }
    let count = max_queue - dest_start;
    for offset in 0..count {
        row[dest_start + offset] = res_row[t_in_cycle + offset];
    }
}
