// Fitness scoring: makespan, load balance with parallelism penalty, and
// the normalized setup-change count.

use serde::Serialize;

use crate::assign::{Assigner, Assignment, OVERLOAD_RATIO};

/// Relative weights on (makespan, balance, changes). Negative weights mean
/// smaller raw values score better, so the aggregate is minimized.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ObjectiveWeights {
    pub time: f64,
    pub balance: f64,
    pub changes: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            time: -2.0,
            balance: -3.0,
            changes: -10.0,
        }
    }
}

/// The three raw objectives of one evaluated schedule.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Fitness {
    /// Finish time of the last loom, hours, setups included.
    pub makespan: f64,
    /// Normalized load variance with empty/overload multipliers, plus the
    /// same-order parallelism penalty.
    pub balance: f64,
    /// Setup adjacencies per work item.
    pub changes: f64,
}

impl Fitness {
    /// Collapses the triple into the scalar selection minimizes. With the
    /// default weights this is `2T + 3B + 10C`.
    pub fn aggregate(&self, weights: &ObjectiveWeights) -> f64 {
        -(weights.time * self.makespan
            + weights.balance * self.balance
            + weights.changes * self.changes)
    }
}

/// Evaluates one permutation: unfolds it through the assigner and scores
/// the outcome. Pure in `(permutation, items, machines, weights)`, which
/// is what lets the population evaluate in parallel.
pub fn evaluate(assigner: &Assigner, permutation: &[usize]) -> Fitness {
    score(assigner.items().len(), &assigner.run(permutation))
}

/// Scores an already-unfolded assignment against `total_items` work items.
pub fn score(total_items: usize, assignment: &Assignment) -> Fitness {
    let hours = &assignment.hours;
    let makespan = hours.iter().copied().fold(0.0, f64::max);

    let machines = hours.len() as f64;
    let avg = hours.iter().sum::<f64>() / machines;
    let spread = if avg > 0.0 {
        let variance = hours.iter().map(|t| (t - avg).powi(2)).sum::<f64>() / machines;
        let empty = hours.iter().filter(|t| **t == 0.0).count() as f64;
        let overloaded = hours.iter().filter(|t| **t > avg * OVERLOAD_RATIO).count() as f64;
        (variance / avg.powi(2)) * (1.0 + 2.0 * empty + overloaded)
    } else {
        0.0
    };

    let count = total_items.max(1) as f64;
    Fitness {
        makespan,
        balance: spread + 2.0 * assignment.parallel_runs as f64 / count,
        changes: assignment.setup_adjacencies as f64 / count,
    }
}
