// Order preparation: the speed model, production durations, and the
// due-date-driven splitting of oversized orders.

use chrono::NaiveDateTime;
use log::info;

use crate::orders::RawOrder;

/// Loom constants and splitting thresholds shared by the whole fleet.
#[derive(Clone, Debug)]
pub struct LoomParams {
    /// Weft insertions per minute at the reed.
    pub atki_devir: f64,
    /// Loom efficiency factor.
    pub randiman: f64,
    /// Fallback speed in meters per hour when the pick density is unknown.
    pub default_speed: f64,
    /// Smallest quantity a split part may carry, in meters.
    pub min_split: f64,
    /// Largest number of parts an order may be split into.
    pub max_splits: usize,
}

impl Default for LoomParams {
    fn default() -> Self {
        Self {
            atki_devir: 450.0,
            randiman: 0.85,
            default_speed: 22.0,
            min_split: 500.0,
            max_splits: 10,
        }
    }
}

impl LoomParams {
    /// Meters of fabric per hour at the given pick density (picks/cm),
    /// rounded to two decimals. Every loom in the fleet runs at this speed
    /// for a given item.
    pub fn speed(&self, pick_density: Option<f64>) -> f64 {
        match pick_density {
            Some(picks) if picks > 0.0 => {
                let effective_picks = self.atki_devir * self.randiman;
                let cm_per_minute = effective_picks / picks;
                let meters_per_hour = cm_per_minute * 60.0 / 100.0;
                (meters_per_hour * 100.0).round() / 100.0
            }
            _ => self.default_speed,
        }
    }
}

/// One schedulable unit of production. Immutable once emitted.
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// `orderId_lineId`, plus a `_k` suffix for split parts.
    pub id: String,
    pub order_id: String,
    pub line_id: String,
    pub quantity_meters: f64,
    /// Pure production time; setups are accounted for at assignment time.
    pub duration_hours: f64,
    pub due_at: NaiveDateTime,
    pub type_name: String,
    pub variant: Option<String>,
    pub ulak: Option<String>,
    pub pick_density: Option<f64>,
}

/// Turns raw orders into work items. An order whose production time
/// overruns its due date is split into balanced parts so the parts can run
/// on several looms at once.
pub fn prepare(orders: &[RawOrder], now: NaiveDateTime, params: &LoomParams) -> Vec<WorkItem> {
    let mut items = Vec::with_capacity(orders.len());
    for order in orders {
        let speed = params.speed(order.pick_density);
        let base = WorkItem {
            id: format!("{}_{}", order.order_id, order.line_id),
            order_id: order.order_id.clone(),
            line_id: order.line_id.clone(),
            quantity_meters: order.quantity_meters,
            duration_hours: order.quantity_meters / speed,
            due_at: order.due_at,
            type_name: order.type_name.clone(),
            variant: order.variant.clone(),
            ulak: order.ulak.clone(),
            pick_density: order.pick_density,
        };

        let remaining = remaining_hours(order.due_at, now);
        if base.duration_hours <= remaining {
            items.push(base);
            continue;
        }
        let Some((parts, part_quantity)) =
            split_plan(order.quantity_meters, base.duration_hours, remaining, params)
        else {
            items.push(base);
            continue;
        };
        info!(
            "order {} cannot meet its due date ({:.1} h of work, {remaining:.1} h left); \
             splitting into {parts} parts of {part_quantity:.2} m",
            base.id, base.duration_hours,
        );
        for part in 1..=parts {
            items.push(WorkItem {
                id: format!("{}_{part}", base.id),
                quantity_meters: part_quantity,
                duration_hours: part_quantity / speed,
                ..base.clone()
            });
        }
    }
    items
}

/// Hours between now and the due date, floored at one hour so overdue
/// orders still get a finite target.
fn remaining_hours(due_at: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let seconds = (due_at - now).num_seconds() as f64;
    (seconds / 3600.0).max(1.0)
}

/// Part count and per-part quantity for an order that misses its due date,
/// or `None` when the order must stay whole.
fn split_plan(
    quantity: f64,
    duration: f64,
    remaining: f64,
    params: &LoomParams,
) -> Option<(usize, f64)> {
    let required = (duration / remaining) as usize + 1;
    let mut parts = required.min(params.max_splits);
    let mut part_quantity = quantity / parts as f64;
    if part_quantity < params.min_split {
        parts = (quantity / params.min_split) as usize;
        if parts <= 1 {
            return None;
        }
        part_quantity = quantity / parts as f64;
    }
    Some((parts, part_quantity))
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::WorkItem;

    pub(crate) fn moment(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Bare work item for placement and classification tests.
    pub(crate) fn item(
        id: &str,
        order: &str,
        duration: f64,
        variant: Option<&str>,
        ulak: Option<&str>,
    ) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            order_id: order.to_string(),
            line_id: "1".to_string(),
            quantity_meters: duration * 15.3,
            duration_hours: duration,
            due_at: moment(2025, 6, 30),
            type_name: "dokuma".to_string(),
            variant: variant.map(str::to_string),
            ulak: ulak.map(str::to_string),
            pick_density: Some(15.0),
        }
    }
}
