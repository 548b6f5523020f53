//! Assign/unassign: the player-facing toggle on a contract and an animal.

use writ_types::{DocumentId, EntityId, EntityRef};

use crate::contract::{AnimalContract, ContractContext, ContractError};
use crate::host::WritHost;
use crate::protection::ProtectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionLabel {
    Assign,
    Unassign,
}

impl ActionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "Assign",
            Self::Unassign => "Unassign",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Added { name: String },
    Removed { name: String },
    PermissionDenied,
    ContractFull,
    /// Not an owned contract, or the target is not an eligible animal.
    NotApplicable,
}

impl AssignOutcome {
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Added { name } => Some(format!("You add {name} to the contract.")),
            Self::Removed { name } => Some(format!("You remove {name} from the contract.")),
            Self::PermissionDenied => {
                Some("You do not have permission to control that animal.".to_string())
            }
            Self::ContractFull => Some(
                "There would not be enough space to add that animal to the contract.".to_string(),
            ),
            Self::NotApplicable => None,
        }
    }
}

fn owned_contract<H: WritHost>(host: &H, performer: EntityId, writ: DocumentId) -> bool {
    host.item(writ).map_or(false, |item| {
        item.kind.is_animal_contract() && item.owner_id == Some(performer)
    })
}

pub(crate) fn display_name<H: WritHost>(host: &H, entity: &EntityRef) -> String {
    host.profile(entity.id)
        .map(|profile| profile.name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("creature {}", entity.id))
}

/// The menu entry offered for `target` when `performer` holds `writ`, if any.
pub fn action_label<H: WritHost>(
    host: &H,
    registry: &ProtectionRegistry,
    performer: EntityId,
    writ: DocumentId,
    target: EntityId,
) -> Result<Option<ActionLabel>, ContractError> {
    if !owned_contract(host, performer, writ) {
        return Ok(None);
    }
    let Some(target) = host.resolve(target) else {
        return Ok(None);
    };
    if target.is_player_controlled() {
        return Ok(None);
    }
    let contract = AnimalContract::open(ContractContext::new(host, registry), writ)?;
    Ok(Some(if contract.contains(&target) {
        ActionLabel::Unassign
    } else {
        ActionLabel::Assign
    }))
}

/// Removes `target` if the contract lists it, otherwise adds it subject to
/// the host's control policy and the inscription capacity.
pub fn toggle_assignment<H: WritHost>(
    host: &H,
    registry: &ProtectionRegistry,
    performer: EntityId,
    writ: DocumentId,
    target: EntityId,
) -> Result<AssignOutcome, ContractError> {
    if !owned_contract(host, performer, writ) {
        return Ok(AssignOutcome::NotApplicable);
    }
    let Some(target) = host.resolve(target).filter(EntityRef::is_eligible) else {
        return Ok(AssignOutcome::NotApplicable);
    };

    let mut contract = AnimalContract::open(ContractContext::new(host, registry), writ)?;
    let name = display_name(host, &target);
    if contract.contains(&target) {
        contract.remove(&target)?;
        tracing::info!(%performer, %writ, entity = %target.id, "animal removed from contract");
        return Ok(AssignOutcome::Removed { name });
    }

    if !host.may_control(performer, target.id) {
        return Ok(AssignOutcome::PermissionDenied);
    }
    match contract.add(target) {
        Ok(()) => {
            tracing::info!(%performer, %writ, entity = %target.id, "animal added to contract");
            Ok(AssignOutcome::Added { name })
        }
        Err(ContractError::CapacityExceeded { .. }) => Ok(AssignOutcome::ContractFull),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use writ_types::{EntityKind, ItemKind};

    struct Fixture {
        host: InMemoryHost,
        registry: ProtectionRegistry,
        owner: EntityRef,
        writ: DocumentId,
    }

    fn fixture() -> Fixture {
        let host = InMemoryHost::new();
        let owner = host.spawn(EntityKind::Player, "Rolf", "human");
        let writ = host.create_contract(Some(owner.id));
        Fixture {
            host,
            registry: ProtectionRegistry::new(),
            owner,
            writ,
        }
    }

    #[test]
    fn toggle_adds_then_removes() {
        let f = fixture();
        let horse = f.host.spawn_animal("Dobbin");

        let added = toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("toggle on");
        assert_eq!(added, AssignOutcome::Added { name: "Dobbin".to_string() });
        assert_eq!(
            added.message().as_deref(),
            Some("You add Dobbin to the contract.")
        );
        assert!(f.registry.is_protected(horse.id));

        let removed = toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("toggle off");
        assert_eq!(
            removed.message().as_deref(),
            Some("You remove Dobbin from the contract.")
        );
        assert!(!f.registry.is_protected(horse.id));
    }

    #[test]
    fn toggle_respects_control_policy() {
        let f = fixture();
        let stranger = f.host.spawn(EntityKind::Player, "Mallory", "human");
        let horse = f.host.spawn_animal("Dobbin");
        f.host.set_owner(horse.id, stranger.id);

        let outcome = toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("toggle");
        assert_eq!(outcome, AssignOutcome::PermissionDenied);
        assert_eq!(
            outcome.message().as_deref(),
            Some("You do not have permission to control that animal.")
        );
        assert!(!f.registry.is_protected(horse.id));
    }

    #[test]
    fn toggle_reports_full_contract() {
        let f = fixture();
        let mut contract = AnimalContract::open(ContractContext::new(&f.host, &f.registry), f.writ)
            .expect("open contract");
        // Ids only grow, so once one filler is rejected every later animal is too.
        while contract.add(f.host.spawn_animal("filler")).is_ok() {}
        drop(contract);
        let horse = f.host.spawn_animal("Dobbin");

        let outcome = toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("toggle");
        assert_eq!(outcome, AssignOutcome::ContractFull);
        assert_eq!(
            outcome.message().as_deref(),
            Some("There would not be enough space to add that animal to the contract.")
        );
    }

    #[test]
    fn toggle_ignores_players_and_foreign_writs() {
        let f = fixture();
        let other_player = f.host.spawn(EntityKind::Player, "Mallory", "human");
        let horse = f.host.spawn_animal("Dobbin");
        let letter = f
            .host
            .create_item(ItemKind::Other("papyrus".to_string()), Some(f.owner.id));

        let on_player =
            toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, other_player.id)
                .expect("player target");
        assert_eq!(on_player, AssignOutcome::NotApplicable);
        let on_letter = toggle_assignment(&f.host, &f.registry, f.owner.id, letter, horse.id)
            .expect("letter");
        assert_eq!(on_letter, AssignOutcome::NotApplicable);
        let not_owner =
            toggle_assignment(&f.host, &f.registry, other_player.id, f.writ, horse.id)
                .expect("not owner");
        assert_eq!(not_owner, AssignOutcome::NotApplicable);
        assert!(f.registry.is_empty());
    }

    #[test]
    fn label_tracks_membership() {
        let f = fixture();
        let horse = f.host.spawn_animal("Dobbin");
        let npc = f.host.spawn(EntityKind::ScriptedNpc, "Trader", "human");
        let player = f.host.spawn(EntityKind::Player, "Mallory", "human");

        let label = action_label(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("label");
        assert_eq!(label, Some(ActionLabel::Assign));
        toggle_assignment(&f.host, &f.registry, f.owner.id, f.writ, horse.id).expect("assign");
        let label = action_label(&f.host, &f.registry, f.owner.id, f.writ, horse.id)
            .expect("label");
        assert_eq!(label.map(ActionLabel::as_str), Some("Unassign"));

        let on_npc = action_label(&f.host, &f.registry, f.owner.id, f.writ, npc.id)
            .expect("npc label");
        assert_eq!(on_npc, Some(ActionLabel::Assign));
        let on_player = action_label(&f.host, &f.registry, f.owner.id, f.writ, player.id)
            .expect("player label");
        assert_eq!(on_player, None);
    }
}
