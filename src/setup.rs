// Setup-change classification between consecutive items on a loom.

use serde::Serialize;

use crate::prepare::WorkItem;

/// The kind of setup a loom incurs before starting an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetupKind {
    /// The variant carries over from the previous item.
    Variant,
    /// Variants differ but the items share an ulak code.
    Ulak,
    /// Full team change; also the initial preparation on an idle loom.
    Team,
}

impl SetupKind {
    /// Minutes the loom stands still for this setup.
    pub fn minutes(self) -> u32 {
        match self {
            SetupKind::Variant => 30,
            SetupKind::Ulak => 120,
            SetupKind::Team => 180,
        }
    }

    /// Setup time in hours, the unit machine loads are tracked in.
    pub fn hours(self) -> f64 {
        f64::from(self.minutes()) / 60.0
    }
}

/// Classifies the setup between the previous item on a loom (`None` for an
/// idle loom) and the item about to start.
///
/// Codes arrive pre-normalized: ingest has already collapsed the blank
/// stand-ins, so `None` here really means "no code".
pub fn classify(prev: Option<&WorkItem>, cur: &WorkItem) -> SetupKind {
    let Some(prev) = prev else {
        return SetupKind::Team;
    };
    let (Some(prev_variant), Some(cur_variant)) = (&prev.variant, &cur.variant) else {
        return SetupKind::Team;
    };
    if prev_variant == cur_variant {
        return SetupKind::Variant;
    }
    match (&prev.ulak, &cur.ulak) {
        (Some(prev_ulak), Some(cur_ulak)) if prev_ulak == cur_ulak => SetupKind::Ulak,
        _ => SetupKind::Team,
    }
}
