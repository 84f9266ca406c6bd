// Schedule analysis: unfolds the best individual into per-loom timelines
// and the aggregate statistics downstream rendering consumes.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::assign::Assigner;
use crate::setup::{classify, SetupKind};

/// One production block on a loom's timeline.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub item_id: String,
    pub order_id: String,
    pub line_id: String,
    pub type_name: String,
    pub variant_code: Option<String>,
    pub ulak_code: Option<String>,
    pub quantity_meters: f64,
    pub pick_density: Option<f64>,
    pub due_at: NaiveDateTime,
    /// Production start in hours from t0 = 0, after the preceding setup.
    pub start_hour: f64,
    pub duration_hours: f64,
    /// The setup performed immediately before this block.
    pub setup_kind: SetupKind,
    pub setup_minutes: u32,
}

/// A loom's complete ordered timeline.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTimeline {
    pub machine: String,
    pub entries: Vec<ScheduleEntry>,
}

/// Totals per setup kind, tallied over adjacencies in the final schedule.
/// The initial team preparation of each loom is not an adjacency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SetupTally {
    #[serde(rename = "VARIANT")]
    pub variant: usize,
    #[serde(rename = "ULAK")]
    pub ulak: usize,
    #[serde(rename = "TEAM")]
    pub team: usize,
}

impl SetupTally {
    fn bump(&mut self, kind: SetupKind) {
        match kind {
            SetupKind::Variant => self.variant += 1,
            SetupKind::Ulak => self.ulak += 1,
            SetupKind::Team => self.team += 1,
        }
    }
}

/// Load summary for one loom.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineLoad {
    /// Committed hours, production plus every setup.
    pub total_hours: f64,
    pub item_count: usize,
    /// Setup adjacencies on this loom.
    pub setup_count: usize,
}

/// Per-generation progress record.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStat {
    pub generation: usize,
    /// Best aggregate seen so far; non-increasing across generations.
    pub best: f64,
    /// Mean aggregate of this generation's offspring.
    pub avg: f64,
    pub wall_seconds: f64,
}

/// Append-only statistics a run accumulates.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub generations: Vec<GenerationStat>,
    pub type_changes: SetupTally,
    pub machine_loads: Vec<MachineLoad>,
}

/// The engine's final product: timelines plus run statistics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub machines: Vec<MachineTimeline>,
    pub stats: RunStats,
}

/// Loom label in the plant's numbering.
pub fn machine_label(index: usize) -> String {
    format!("mk{}", 101 + index)
}

/// Reruns the assigner on the chosen permutation and builds timelines,
/// setup tallies, and per-loom load summaries.
pub fn solve_result(assigner: &Assigner, best: &[usize], mut stats: RunStats) -> SolveResult {
    let assignment = assigner.run(best);
    let items = assigner.items();
    let mut machines = Vec::with_capacity(assignment.queues.len());
    for (index, queue) in assignment.queues.iter().enumerate() {
        let mut clock = 0.0;
        let mut load = MachineLoad {
            total_hours: assignment.hours[index],
            item_count: queue.len(),
            setup_count: 0,
        };
        let mut entries = Vec::with_capacity(queue.len());
        for (position, &item_index) in queue.iter().enumerate() {
            let item = &items[item_index];
            let prev = position.checked_sub(1).map(|p| &items[queue[p]]);
            let kind = classify(prev, item);
            if prev.is_some() {
                stats.type_changes.bump(kind);
                load.setup_count += 1;
            }
            clock += kind.hours();
            entries.push(ScheduleEntry {
                item_id: item.id.clone(),
                order_id: item.order_id.clone(),
                line_id: item.line_id.clone(),
                type_name: item.type_name.clone(),
                variant_code: item.variant.clone(),
                ulak_code: item.ulak.clone(),
                quantity_meters: item.quantity_meters,
                pick_density: item.pick_density,
                due_at: item.due_at,
                start_hour: clock,
                duration_hours: item.duration_hours,
                setup_kind: kind,
                setup_minutes: kind.minutes(),
            });
            clock += item.duration_hours;
        }
        machines.push(MachineTimeline {
            machine: machine_label(index),
            entries,
        });
        stats.machine_loads.push(load);
    }
    SolveResult { machines, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::testing::item;

    #[test]
    fn labels_follow_the_plant_numbering() {
        assert_eq!(machine_label(0), "mk101");
        assert_eq!(machine_label(9), "mk110");
    }

    #[test]
    fn start_hours_accumulate_setups_and_production() {
        let items = vec![
            item("1_1", "1", 2.0, Some("V1"), None),
            item("2_1", "2", 4.0, Some("V1"), None),
        ];
        let assigner = Assigner::new(&items, 1);
        let result = solve_result(&assigner, &[0, 1], RunStats::default());

        let entries = &result.machines[0].entries;
        assert_eq!(entries.len(), 2);
        // Team prep, then two hours of production, then a variant change.
        assert_eq!(entries[0].setup_kind, SetupKind::Team);
        assert!((entries[0].start_hour - 3.0).abs() < 1e-9);
        assert_eq!(entries[1].setup_kind, SetupKind::Variant);
        assert!((entries[1].start_hour - 5.5).abs() < 1e-9);
    }

    #[test]
    fn tallies_count_adjacencies_only() {
        let items = vec![
            item("1_1", "1", 2.0, Some("V1"), None),
            item("2_1", "2", 4.0, Some("V1"), None),
        ];
        let assigner = Assigner::new(&items, 1);
        let result = solve_result(&assigner, &[0, 1], RunStats::default());

        assert_eq!(
            result.stats.type_changes,
            SetupTally {
                variant: 1,
                ulak: 0,
                team: 0,
            }
        );
        let load = &result.stats.machine_loads[0];
        assert_eq!(load.item_count, 2);
        assert_eq!(load.setup_count, 1);
        assert!((load.total_hours - 9.5).abs() < 1e-9);
    }

    #[test]
    fn timeline_totals_agree_with_committed_hours() {
        let items = vec![
            item("1_1", "1", 3.0, Some("V1"), Some("U1")),
            item("2_1", "2", 5.0, Some("V2"), Some("U1")),
            item("3_1", "3", 4.0, Some("V3"), Some("U2")),
        ];
        let assigner = Assigner::new(&items, 2);
        let result = solve_result(&assigner, &[0, 1, 2], RunStats::default());

        for (timeline, load) in result.machines.iter().zip(&result.stats.machine_loads) {
            let end = timeline
                .entries
                .last()
                .map_or(0.0, |entry| entry.start_hour + entry.duration_hours);
            assert!((end - load.total_hours).abs() < 1e-9);
        }
    }
}
