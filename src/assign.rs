// Greedy placement of work items onto looms. Walks a permutation and
// places each item on the best currently-feasible loom under a
// compatibility- and balance-aware policy.

use crate::prepare::WorkItem;
use crate::setup::{classify, SetupKind};

/// How many of a loom's most recent items veto another part of the same order.
const BLOCK_WINDOW: usize = 3;
/// Spread between the fullest and emptiest loom, relative to the average,
/// that triggers pure rebalancing.
const IMBALANCE_RATIO: f64 = 0.3;
/// Load ceiling, relative to the fleet average, for compatibility seeking.
const COMPAT_LOAD_CEILING: f64 = 1.2;
/// Relaxation on the balance score when only the ulak code matches.
const ULAK_RELAXATION: f64 = 1.2;
/// Fallback score weights and thresholds.
const BALANCE_WEIGHT: f64 = 0.6;
const CHANGE_WEIGHT: f64 = 0.4;
const CHANGE_PENALTY: f64 = 0.8;
pub(crate) const OVERLOAD_RATIO: f64 = 1.1;
const UNDERLOAD_RATIO: f64 = 0.9;
const UNDERLOAD_BONUS: f64 = -0.3;

/// Deterministic greedy assigner over a fixed item list and fleet size.
pub struct Assigner<'a> {
    items: &'a [WorkItem],
    machines: usize,
}

/// The fleet state a permutation unfolds into: one machine load snapshot,
/// built fresh per evaluation.
#[derive(Debug)]
pub struct Assignment {
    /// Ordered item indices per loom.
    pub queues: Vec<Vec<usize>>,
    /// Committed hours per loom: production plus every setup, the initial
    /// team preparation included.
    pub hours: Vec<f64>,
    /// Adjacent pairs that incurred a setup; a loom's first item is not an
    /// adjacency.
    pub setup_adjacencies: usize,
    /// Adjacent pairs sharing an order id.
    pub parallel_runs: usize,
}

impl<'a> Assigner<'a> {
    pub fn new(items: &'a [WorkItem], machines: usize) -> Self {
        Self { items, machines }
    }

    pub fn items(&self) -> &'a [WorkItem] {
        self.items
    }

    /// Runs the permutation through the placement policy.
    pub fn run(&self, permutation: &[usize]) -> Assignment {
        let mut state = Assignment {
            queues: vec![Vec::new(); self.machines],
            hours: vec![0.0; self.machines],
            setup_adjacencies: 0,
            parallel_runs: 0,
        };
        for &index in permutation {
            let item = &self.items[index];
            let loom = self.pick_loom(item, &state);
            let prev = state.queues[loom].last().map(|&i| &self.items[i]);
            let kind = classify(prev, item);
            state.hours[loom] += kind.hours();
            if let Some(prev) = prev {
                state.setup_adjacencies += 1;
                if prev.order_id == item.order_id {
                    state.parallel_runs += 1;
                }
            }
            state.hours[loom] += item.duration_hours;
            state.queues[loom].push(index);
        }
        state
    }

    /// Chooses the loom for one item: block list, imbalance bypass,
    /// compatibility preference, then the weighted fallback score.
    fn pick_loom(&self, item: &WorkItem, state: &Assignment) -> usize {
        let hours = &state.hours;
        let avg = hours.iter().sum::<f64>() / self.machines as f64;
        let max = hours.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = hours.iter().copied().fold(f64::INFINITY, f64::min);

        let blocked: Vec<bool> = (0..self.machines)
            .map(|loom| self.is_blocked(loom, item, state))
            .collect();
        let any_open = blocked.iter().any(|b| !b);

        // A lopsided fleet gets rebalanced before compatibility matters.
        if any_open && max - min > IMBALANCE_RATIO * avg {
            if let Some(loom) = least_loaded(hours, &blocked) {
                return loom;
            }
        }

        if let Some(loom) = self.compatible_loom(item, state, &blocked, avg, max) {
            return loom;
        }

        self.fallback_loom(item, state, &blocked, any_open, avg, max)
    }

    /// A loom is blocked when another part of the same order sits in its
    /// last `BLOCK_WINDOW` positions.
    fn is_blocked(&self, loom: usize, item: &WorkItem, state: &Assignment) -> bool {
        state.queues[loom]
            .iter()
            .rev()
            .take(BLOCK_WINDOW)
            .any(|&i| self.items[i].order_id == item.order_id)
    }

    /// Prefers a loom whose last item shares the candidate's variant, then
    /// one sharing its ulak code, both only below the compat load ceiling.
    fn compatible_loom(
        &self,
        item: &WorkItem,
        state: &Assignment,
        blocked: &[bool],
        avg: f64,
        max: f64,
    ) -> Option<usize> {
        let mut best = None;
        let mut best_score = f64::INFINITY;
        for loom in 0..self.machines {
            if blocked[loom] || state.hours[loom] >= avg * COMPAT_LOAD_CEILING {
                continue;
            }
            let Some(&last) = state.queues[loom].last() else {
                continue;
            };
            let prev = &self.items[last];
            let balance = (state.hours[loom] - avg).abs() / (max + 1.0);
            if codes_match(&item.variant, &prev.variant) {
                if balance < best_score {
                    best_score = balance;
                    best = Some(loom);
                }
            } else if codes_match(&item.ulak, &prev.ulak) && balance < best_score * ULAK_RELAXATION {
                best_score = balance;
                best = Some(loom);
            }
        }
        best
    }

    /// Weighted score over the remaining looms; the lowest index wins ties.
    /// With every loom blocked the block list is void and all looms compete.
    fn fallback_loom(
        &self,
        item: &WorkItem,
        state: &Assignment,
        blocked: &[bool],
        any_open: bool,
        avg: f64,
        max: f64,
    ) -> usize {
        let mut best = 0;
        let mut best_score = f64::INFINITY;
        for loom in 0..self.machines {
            if any_open && blocked[loom] {
                continue;
            }
            let hours = state.hours[loom];
            let balance = (hours - avg).abs() / (max + 1.0);
            let change = match state.queues[loom].last() {
                Some(&last) if classify(Some(&self.items[last]), item) == SetupKind::Team => {
                    CHANGE_PENALTY
                }
                _ => 0.0,
            };
            let overload = if avg > 0.0 && hours > avg * OVERLOAD_RATIO {
                (hours - avg * OVERLOAD_RATIO) / avg
            } else {
                0.0
            };
            let underload = if hours < avg * UNDERLOAD_RATIO {
                UNDERLOAD_BONUS
            } else {
                0.0
            };
            let score = BALANCE_WEIGHT * balance + CHANGE_WEIGHT * change + overload + underload;
            if score < best_score {
                best_score = score;
                best = loom;
            }
        }
        best
    }
}

fn codes_match(left: &Option<String>, right: &Option<String>) -> bool {
    matches!((left, right), (Some(l), Some(r)) if l == r)
}

/// Emptiest unblocked loom, ties to the lowest index.
fn least_loaded(hours: &[f64], blocked: &[bool]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (loom, &load) in hours.iter().enumerate() {
        if blocked[loom] {
            continue;
        }
        if best.is_none_or(|current| load < hours[current]) {
            best = Some(loom);
        }
    }
    best
}
