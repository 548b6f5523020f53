//! Trust-gated trait summaries for the management view.

use writ_types::{EntityId, TraitSummary, WritConfig, TRAIT_GATE_OFFSET, TRAIT_SLOTS};

use crate::host::TrustSource;

pub const INSUFFICIENT_SKILL: &str = "You do not have enough skill to see traits.";
pub const SKILL_CUTOFF: &str = "You do not have enough skill to see any more.";
pub const NO_TRAITS: &str = "None";

/// Human-readable line per trait slot. Empty lines mark slots that are never
/// listed, such as the colour bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitCatalog {
    lines: Vec<String>,
}

const HUSBANDRY_TRAITS: [(u32, &str); 19] = [
    (0, "It will fight fiercely."),
    (1, "It has fleeter movement than normal."),
    (2, "It is a tough bugger."),
    (3, "It has a strong body."),
    (4, "It has lightning movement."),
    (5, "It can carry more than average."),
    (6, "It has very strong leg muscles."),
    (7, "It has keen senses."),
    (8, "It has malformed hindlegs."),
    (9, "The legs are of different length."),
    (10, "It seems overly aggressive."),
    (11, "It looks very unmotivated."),
    (12, "It is unusually strong willed."),
    (13, "It has some illness."),
    (14, "It looks constantly hungry."),
    (19, "It looks feeble and unhealthy."),
    (20, "It looks unusually strong and healthy."),
    (21, "It has a certain spark in its eyes."),
    (22, "It has been corrupted."),
];

impl TraitCatalog {
    /// Lines beyond the 64 slots are ignored; missing lines count as empty.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines = lines
            .into_iter()
            .take(TRAIT_SLOTS as usize)
            .map(Into::into)
            .collect::<Vec<String>>();
        lines.resize(TRAIT_SLOTS as usize, String::new());
        Self { lines }
    }

    pub fn husbandry() -> Self {
        let mut lines = vec![String::new(); TRAIT_SLOTS as usize];
        for (index, line) in HUSBANDRY_TRAITS {
            lines[index as usize] = line.to_string();
        }
        Self { lines }
    }

    pub fn line(&self, index: u32) -> &str {
        self.lines
            .get(index as usize)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl Default for TraitCatalog {
    fn default() -> Self {
        Self::husbandry()
    }
}

/// Summarises the set bits of `traits` for a viewer with `trust`.
///
/// With gating on, the viewer sees slots below `trust - 20`; a negative or
/// non-finite budget hides everything. Scanning stops at the first slot past the budget, which
/// adds a cutoff line and marks the count with `?`.
pub fn summarize(traits: u64, trust: f64, gating: bool, catalog: &TraitCatalog) -> TraitSummary {
    let budget = if gating {
        let budget = trust - TRAIT_GATE_OFFSET;
        if !budget.is_finite() || budget < 0.0 {
            return TraitSummary::new("???", INSUFFICIENT_SKILL);
        }
        budget
    } else {
        f64::INFINITY
    };

    let mut lines = Vec::new();
    let mut visible = 0_usize;
    let mut cut_off = false;
    for index in 0..TRAIT_SLOTS {
        if f64::from(index) >= budget {
            lines.push(SKILL_CUTOFF);
            cut_off = true;
            break;
        }
        if traits & (1_u64 << index) != 0 {
            let line = catalog.line(index);
            if !line.is_empty() {
                lines.push(line);
                visible += 1;
            }
        }
    }

    if lines.is_empty() {
        return TraitSummary::new("0", NO_TRAITS);
    }
    let count_label = if cut_off {
        format!("{visible}?")
    } else {
        visible.to_string()
    };
    TraitSummary::new(count_label, lines.join("\n"))
}

/// Summary as seen by `viewer`. When husbandry gating is configured the
/// viewer's skill is the trust score; a viewer with no skill record at all
/// is not gated.
pub fn summarize_for_viewer(
    traits: u64,
    viewer: EntityId,
    config: &WritConfig,
    trust: &dyn TrustSource,
    catalog: &TraitCatalog,
) -> TraitSummary {
    if !config.use_animal_husbandry_for_traits {
        return summarize(traits, 0.0, false, catalog);
    }
    match trust.trust_score_for(viewer) {
        Some(score) => summarize(traits, score, true, catalog),
        None => summarize(traits, 0.0, false, catalog),
    }
}
