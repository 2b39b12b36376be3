//! Structural validation of records and ops.
//!
//! Checks that an action is internally consistent and that the actions it
//! references exist and have the right shape. Signatures are checked for
//! presence and binding only.

use super::ValidationOutcome;
use crate::action::{ActionContent, SignedActionHashed};
use crate::cascade::Cascade;
use crate::dht_op::{DhtOp, DhtOpType};
use crate::error::CellError;
use crate::network::GetOptions;
use crate::record::{Record, RecordEntry};
use dhtsim_env::ActionHash;

/// Returns early from a check with a non-valid outcome.
macro_rules! check {
    ($outcome:expr) => {
        match $outcome {
            ValidationOutcome::Valid => {}
            other => return Ok(other),
        }
    };
}

/// Sys validation of a record about to be committed by its author.
pub async fn sys_validate_record(
    record: &Record,
    cascade: &Cascade<'_>,
) -> Result<ValidationOutcome, CellError> {
    check!(check_integrity(&record.signed_action)?);
    check!(check_entry(record, true));
    check!(check_prev_action(&record.signed_action, cascade).await);
    check_dependencies(&record.signed_action, cascade).await
}

/// Sys validation of an op received from another agent.
///
/// Only agent-activity authorities check the chain link.
pub async fn sys_validate_op(
    op: &DhtOp,
    cascade: &Cascade<'_>,
) -> Result<ValidationOutcome, CellError> {
    if op.basis().is_none() {
        return Ok(ValidationOutcome::Invalid(format!(
            "{:?} does not apply to a {:?} action",
            op.op_type(),
            op.action().action_type()
        )));
    }
    let record = op.to_record();
    check!(check_integrity(op.signed_action())?);
    check!(check_entry(&record, op.op_type() == DhtOpType::StoreEntry));
    if op.op_type() == DhtOpType::RegisterAgentActivity {
        check!(check_prev_action(op.signed_action(), cascade).await);
    }
    check_dependencies(op.signed_action(), cascade).await
}

fn check_integrity(signed: &SignedActionHashed) -> Result<ValidationOutcome, CellError> {
    if !signed.hash_matches()? {
        return Ok(ValidationOutcome::Invalid(format!(
            "action hash {} does not match its content",
            signed.hash
        )));
    }
    if !signed.signature_matches() {
        return Ok(ValidationOutcome::Invalid(format!(
            "signature on {} does not belong to {}",
            signed.hash,
            signed.author()
        )));
    }
    Ok(ValidationOutcome::Valid)
}

/// The carried entry, if any, must be the one the action names.
fn check_entry(record: &Record, require_entry: bool) -> ValidationOutcome {
    let action = record.action();
    match (action.entry_data(), &record.entry) {
        (None, RecordEntry::Present(_)) => ValidationOutcome::Invalid(format!(
            "{:?} action {} carries an entry",
            action.action_type(),
            record.action_hash()
        )),
        (None, _) => ValidationOutcome::Valid,
        (Some((entry_hash, entry_type)), RecordEntry::Present(entry)) => {
            match entry.hash() {
                Ok(actual) if &actual == entry_hash => {}
                _ => {
                    return ValidationOutcome::Invalid(format!(
                        "entry does not hash to {}",
                        entry_hash
                    ))
                }
            }
            if !entry_type.matches(entry) {
                return ValidationOutcome::Invalid(format!(
                    "entry is not of type {:?}",
                    entry_type
                ));
            }
            ValidationOutcome::Valid
        }
        (Some((entry_hash, entry_type)), RecordEntry::Hidden) => {
            if entry_type.is_public() {
                ValidationOutcome::Invalid(format!("public entry {} is hidden", entry_hash))
            } else {
                ValidationOutcome::Valid
            }
        }
        (Some((entry_hash, _)), RecordEntry::NotApplicable) => {
            if require_entry {
                ValidationOutcome::Invalid(format!("entry {} is missing", entry_hash))
            } else {
                ValidationOutcome::Valid
            }
        }
    }
}

async fn check_prev_action(
    signed: &SignedActionHashed,
    cascade: &Cascade<'_>,
) -> ValidationOutcome {
    let action = &signed.action;
    let prev_hash = match (action.action_seq, action.prev_action) {
        (0, None) => return ValidationOutcome::Valid,
        (0, Some(_)) => {
            return ValidationOutcome::Invalid("first action has a previous action".into())
        }
        (_, None) => {
            return ValidationOutcome::Invalid(format!(
                "action at seq {} has no previous action",
                action.action_seq
            ))
        }
        (_, Some(prev)) => prev,
    };

    let Some(prev) = cascade
        .retrieve_action(&prev_hash, &GetOptions::contents())
        .await
    else {
        return ValidationOutcome::Unresolved(vec![prev_hash]);
    };

    if prev.action.action_seq + 1 != action.action_seq {
        return ValidationOutcome::Invalid(format!(
            "seq {} does not follow previous seq {}",
            action.action_seq, prev.action.action_seq
        ));
    }
    if prev.action.author != action.author {
        return ValidationOutcome::Invalid("previous action has a different author".into());
    }
    if prev.action.timestamp > action.timestamp {
        return ValidationOutcome::Invalid("timestamp is earlier than the previous action".into());
    }
    ValidationOutcome::Valid
}

/// Referenced actions must exist and be of a kind the reference allows.
async fn check_dependencies(
    signed: &SignedActionHashed,
    cascade: &Cascade<'_>,
) -> Result<ValidationOutcome, CellError> {
    let outcome = match &signed.action.content {
        ActionContent::Create { .. } | ActionContent::CreateLink { .. } => ValidationOutcome::Valid,
        ActionContent::Update {
            original_action_address,
            original_entry_address,
            entry_type,
            ..
        } => match fetch(original_action_address, cascade).await {
            Err(missing) => missing,
            Ok(original) => match original.action.entry_data() {
                None => ValidationOutcome::Invalid(format!(
                    "update target {} has no entry",
                    original_action_address
                )),
                Some((hash, _)) if hash != original_entry_address => ValidationOutcome::Invalid(
                    format!("update target does not create {}", original_entry_address),
                ),
                Some((_, original_type)) if original_type != entry_type => {
                    ValidationOutcome::Invalid("update changes the entry type".into())
                }
                Some(_) => ValidationOutcome::Valid,
            },
        },
        ActionContent::Delete {
            deletes_address,
            deletes_entry_address,
        } => match fetch(deletes_address, cascade).await {
            Err(missing) => missing,
            Ok(deleted) => match deleted.action.entry_data() {
                None => ValidationOutcome::Invalid(format!(
                    "delete target {} has no entry",
                    deletes_address
                )),
                Some((hash, _)) if hash != deletes_entry_address => ValidationOutcome::Invalid(
                    format!("delete target does not create {}", deletes_entry_address),
                ),
                Some(_) => ValidationOutcome::Valid,
            },
        },
        ActionContent::DeleteLink {
            base_address,
            link_add_address,
        } => match fetch(link_add_address, cascade).await {
            Err(missing) => missing,
            Ok(create_link) => match &create_link.action.content {
                ActionContent::CreateLink {
                    base_address: link_base,
                    ..
                } if link_base == base_address => ValidationOutcome::Valid,
                ActionContent::CreateLink { .. } => {
                    ValidationOutcome::Invalid("delete link base does not match the link".into())
                }
                _ => ValidationOutcome::Invalid(format!(
                    "{} is not a CreateLink",
                    link_add_address
                )),
            },
        },
    };
    Ok(outcome)
}

async fn fetch(
    hash: &ActionHash,
    cascade: &Cascade<'_>,
) -> Result<SignedActionHashed, ValidationOutcome> {
    cascade
        .retrieve_action(hash, &GetOptions::contents())
        .await
        .ok_or_else(|| ValidationOutcome::Unresolved(vec![*hash]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::bootstrap::BootstrapService;
    use crate::entry::{AppEntryType, Entry, EntryType, EntryVisibility};
    use crate::network::{NetworkConfig, NetworkHandle};
    use crate::state::{ChainStore, WorkingChain};
    use dhtsim_env::{AgentPubKey, CellId, HashType, HoloHash, Timestamp};
    use serde_json::json;
    use std::sync::Arc;

    fn alice() -> AgentPubKey {
        HoloHash::digest(HashType::Agent, b"alice")
    }

    fn network() -> NetworkHandle {
        NetworkHandle::new(
            CellId::new(HoloHash::digest(HashType::Dna, b"dna"), alice()),
            BootstrapService::shared(),
            NetworkConfig::default(),
        )
    }

    fn post_type() -> EntryType {
        EntryType::App(AppEntryType {
            zome_index: 0,
            entry_def_id: "post".into(),
            visibility: EntryVisibility::Public,
        })
    }

    fn chain_with_post() -> (WorkingChain, ActionHash) {
        let mut working = WorkingChain::fork(&Arc::new(ChainStore::default()), alice());
        let entry = Entry::App(json!({"content": "hi"}));
        let hash = working
            .append(
                ActionContent::Create {
                    entry_type: post_type(),
                    entry_hash: entry.hash().unwrap(),
                },
                Some(entry),
                Timestamp::from_micros(5),
            )
            .unwrap();
        (working, hash)
    }

    #[tokio::test]
    async fn test_appended_records_are_valid() {
        let (mut working, create) = chain_with_post();
        working
            .append(
                ActionContent::Delete {
                    deletes_address: create,
                    deletes_entry_address: Entry::App(json!({"content": "hi"})).hash().unwrap(),
                },
                None,
                Timestamp::from_micros(6),
            )
            .unwrap();
        let network = network();
        let cascade = Cascade::new(working.store(), None, &network);

        for record in working.new_records() {
            let outcome = sys_validate_record(&record, &cascade).await.unwrap();
            assert_eq!(outcome, ValidationOutcome::Valid);
        }
    }

    #[tokio::test]
    async fn test_missing_prev_is_unresolved() {
        let missing = HoloHash::digest(HashType::Action, b"missing");
        let entry = Entry::App(json!({"content": "hi"}));
        let action = Action {
            author: alice(),
            timestamp: Timestamp::from_micros(1),
            action_seq: 4,
            prev_action: Some(missing),
            content: ActionContent::Create {
                entry_type: post_type(),
                entry_hash: entry.hash().unwrap(),
            },
        };
        let record = Record::new(SignedActionHashed::sign(action).unwrap(), Some(entry));
        let store = ChainStore::default();
        let network = network();
        let cascade = Cascade::new(&store, None, &network);

        let outcome = sys_validate_record(&record, &cascade).await.unwrap();
        assert_eq!(outcome, ValidationOutcome::Unresolved(vec![missing]));
    }

    #[tokio::test]
    async fn test_broken_link_is_invalid() {
        let (working, create) = chain_with_post();
        let entry = Entry::App(json!({"content": "second"}));
        let action = Action {
            author: alice(),
            timestamp: Timestamp::from_micros(6),
            action_seq: 5,
            prev_action: Some(create),
            content: ActionContent::Create {
                entry_type: post_type(),
                entry_hash: entry.hash().unwrap(),
            },
        };
        let record = Record::new(SignedActionHashed::sign(action).unwrap(), Some(entry));
        let network = network();
        let cascade = Cascade::new(working.store(), None, &network);

        let outcome = sys_validate_record(&record, &cascade).await.unwrap();
        assert!(matches!(outcome, ValidationOutcome::Invalid(_)));
    }

    #[tokio::test]
    async fn test_tampered_entry_is_invalid() {
        let (working, _) = chain_with_post();
        let mut record = working.new_records().remove(0);
        record.entry = RecordEntry::Present(Entry::App(json!({"content": "changed"})));
        let network = network();
        let cascade = Cascade::new(working.store(), None, &network);

        let outcome = sys_validate_record(&record, &cascade).await.unwrap();
        assert!(matches!(outcome, ValidationOutcome::Invalid(_)));
    }

    #[tokio::test]
    async fn test_delete_of_unknown_action_is_unresolved() {
        let missing = HoloHash::digest(HashType::Action, b"gone");
        let mut working = WorkingChain::fork(&Arc::new(ChainStore::default()), alice());
        working
            .append(
                ActionContent::Delete {
                    deletes_address: missing,
                    deletes_entry_address: HoloHash::digest(HashType::Entry, b"e"),
                },
                None,
                Timestamp::from_micros(1),
            )
            .unwrap();
        let network = network();
        let cascade = Cascade::new(working.store(), None, &network);
        let record = working.new_records().remove(0);

        let outcome = sys_validate_record(&record, &cascade).await.unwrap();
        assert_eq!(outcome, ValidationOutcome::Unresolved(vec![missing]));
    }
}
