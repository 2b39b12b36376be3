//! Application validation: runs the DNA's callbacks on a record.

use super::ValidationOutcome;
use crate::action::{Action, ActionContent};
use crate::cascade::Cascade;
use crate::dna::{SimulatedDna, SimulatedZome};
use crate::entry::EntryType;
use crate::network::GetOptions;
use crate::record::Record;

/// Zomes whose callbacks judge an action.
///
/// App entries and links belong to the zome that defines their type; every
/// other action is shown to all zomes. `None` if the action names a zome the
/// DNA does not have.
pub fn zomes_for_action<'d>(action: &Action, dna: &'d SimulatedDna) -> Option<Vec<&'d SimulatedZome>> {
    let zome_index = match &action.content {
        ActionContent::Create {
            entry_type: EntryType::App(app),
            ..
        }
        | ActionContent::Update {
            entry_type: EntryType::App(app),
            ..
        } => Some(app.zome_index),
        ActionContent::CreateLink { zome_index, .. } => Some(*zome_index),
        _ => None,
    };
    match zome_index {
        Some(index) => dna.zome_by_index(index).map(|zome| vec![zome]),
        None => Some(dna.zomes.iter().collect()),
    }
}

/// Runs the callbacks for one record. Never mutates anything.
pub async fn app_validate(
    record: &Record,
    dna: &SimulatedDna,
    cascade: &Cascade<'_>,
) -> ValidationOutcome {
    let action = record.action();
    let Some(zomes) = zomes_for_action(action, dna) else {
        return ValidationOutcome::Invalid(format!(
            "action {} refers to a zome that does not exist",
            record.action_hash()
        ));
    };

    match &action.content {
        ActionContent::CreateLink {
            base_address,
            target_address,
            ..
        } => {
            let options = GetOptions::contents();
            let Some(base) = cascade.retrieve_entry(base_address, &options).await else {
                return ValidationOutcome::Unresolved(vec![*base_address]);
            };
            let Some(target) = cascade.retrieve_entry(target_address, &options).await else {
                return ValidationOutcome::Unresolved(vec![*target_address]);
            };
            first_failure(
                zomes
                    .iter()
                    .map(|zome| (zome.validate_create_link)(action, &base, &target)),
            )
        }
        ActionContent::DeleteLink { .. } => {
            first_failure(zomes.iter().map(|zome| (zome.validate_delete_link)(action)))
        }
        ActionContent::Create { .. } | ActionContent::Update { .. } | ActionContent::Delete { .. } => {
            first_failure(zomes.iter().map(|zome| (zome.validate)(record, dna)))
        }
    }
}

fn first_failure(
    results: impl Iterator<Item = crate::dna::ValidateCallbackResult>,
) -> ValidationOutcome {
    for result in results {
        let outcome = ValidationOutcome::from(result);
        if !outcome.is_valid() {
            return outcome;
        }
    }
    ValidationOutcome::Valid
}
