//! The contract management view: one row per listed animal, plus removal by row.

use std::collections::{BTreeMap, BTreeSet};

use writ_types::{DocumentId, EntityId, EntityRef, TraitSummary, WritConfig};

use crate::actions::display_name;
use crate::contract::{AnimalContract, ContractContext, ContractError};
use crate::disclosure::{summarize_for_viewer, TraitCatalog};
use crate::host::WritHost;
use crate::protection::ProtectionRegistry;

pub const EMPTY_NOTICE: &str = "No creatures are assigned.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementRow {
    pub entity: EntityRef,
    pub name: String,
    pub species: String,
    pub colour: String,
    pub traits: TraitSummary,
}

/// A submitted management form. Row keys are the row indices of the view the
/// form was rendered from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementAnswer {
    pub update: bool,
    pub remove_rows: BTreeSet<usize>,
}

impl ManagementAnswer {
    /// Reads `update=true` and `<row>=true` fields; anything else is ignored.
    pub fn from_form(fields: &BTreeMap<String, String>) -> Self {
        let update = fields.get("update").map_or(false, |value| value == "true");
        let remove_rows = fields
            .iter()
            .filter(|(_, value)| value.as_str() == "true")
            .filter_map(|(key, _)| key.parse::<usize>().ok())
            .collect();
        Self {
            update,
            remove_rows,
        }
    }

    pub fn removing(rows: impl IntoIterator<Item = usize>) -> Self {
        Self {
            update: true,
            remove_rows: rows.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementView {
    pub writ: DocumentId,
    pub viewer: EntityId,
    pub rows: Vec<ManagementRow>,
}

impl ManagementView {
    pub fn build<H: WritHost>(
        host: &H,
        registry: &ProtectionRegistry,
        viewer: EntityId,
        writ: DocumentId,
        config: &WritConfig,
        catalog: &TraitCatalog,
    ) -> Result<Self, ContractError> {
        let contract = AnimalContract::open(ContractContext::new(host, registry), writ)?;
        let rows = contract
            .snapshot()
            .into_iter()
            .map(|entity| {
                let profile = host.profile(entity.id);
                let traits = profile.as_ref().map_or(0, |profile| profile.traits);
                ManagementRow {
                    entity,
                    name: display_name(host, &entity),
                    species: profile
                        .as_ref()
                        .map(|profile| profile.species.clone())
                        .unwrap_or_default(),
                    colour: profile
                        .as_ref()
                        .map(|profile| profile.colour.clone())
                        .unwrap_or_default(),
                    traits: summarize_for_viewer(traits, viewer, config, host, catalog),
                }
            })
            .collect();
        Ok(Self { writ, viewer, rows })
    }

    pub fn empty_notice(&self) -> Option<&'static str> {
        self.rows.is_empty().then_some(EMPTY_NOTICE)
    }

    /// Removes every flagged row from a freshly loaded contract and returns
    /// the message for each removal. Out-of-range rows are skipped.
    pub fn apply_removals<H: WritHost>(
        &self,
        host: &H,
        registry: &ProtectionRegistry,
        answer: &ManagementAnswer,
    ) -> Result<Vec<String>, ContractError> {
        if !answer.update {
            return Ok(Vec::new());
        }
        let mut contract = AnimalContract::open(ContractContext::new(host, registry), self.writ)?;
        let mut messages = Vec::new();
        for row in answer
            .remove_rows
            .iter()
            .filter_map(|index| self.rows.get(*index))
        {
            contract.remove(&row.entity)?;
            messages.push(format!("You remove {} from the contract.", row.name));
        }
        Ok(messages)
    }

    /// Plain-text table for terminals.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{:<4} {:<20} {:<12} {:<12} Traits\n",
            "#", "Name", "Type", "Colour"
        );
        for (index, row) in self.rows.iter().enumerate() {
            out.push_str(&format!(
                "{:<4} {:<20} {:<12} {:<12} {}\n",
                index, row.name, row.species, row.colour, row.traits.count_label
            ));
            for line in row.traits.detail_text.lines() {
                out.push_str(&format!("{:<52}   {line}\n", ""));
            }
        }
        if let Some(notice) = self.empty_notice() {
            out.push_str(notice);
            out.push('\n');
        }
        out
    }
}
