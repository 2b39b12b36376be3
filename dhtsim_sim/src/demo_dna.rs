//! Demo DNA used by the scenarios and the CLI.
//!
//! One zome, `demo`, with a public `demo_entry`, a private `secret_note`
//! and a `demo_link` link type. Payloads are JSON:
//!
//! ```text
//!   create_entry   {"content": "..."}                  -> ActionHash
//!   update_entry   {"original": ActionHash, "content"} -> ActionHash
//!   delete_entry   ActionHash                          -> ActionHash
//!   get            {"hash": AnyDhtHash, "latest"?}     -> Record | null
//!   get_details    AnyDhtHash                          -> Details | null
//!   create_link    {"base", "target", "tag"?}          -> ActionHash
//!   delete_link    ActionHash                          -> ActionHash
//!   get_links      AnyDhtHash                          -> [Link]
//!   create_secret  {"content": "..."}                  -> ActionHash
//!   grant_access   {"functions": [fn], "secret"?}      -> ActionHash
//! ```

use dhtsim_core::action::{Action, ActionContent, LinkTag};
use dhtsim_core::{
    CapAccess, CapSecret, Entry, EntryDef, GetOptions, GrantedFunctions, HostFnContext,
    HostFnError, Record, SimulatedDna, SimulatedZome, ValidateCallbackResult, ZomeCallCapGrant,
};
use dhtsim_env::{ActionHash, AnyDhtHash};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

pub const DEMO_DNA_NAME: &str = "demo_entries";
pub const DEMO_ZOME: &str = "demo";
pub const DEMO_ENTRY: &str = "demo_entry";
pub const SECRET_NOTE: &str = "secret_note";
pub const DEMO_LINK: &str = "demo_link";

/// Link tag the demo zome refuses to validate.
pub const FORBIDDEN_TAG: &str = "forbidden";

type ZomeResult<'a> = BoxFuture<'a, Result<Value, HostFnError>>;

#[derive(Deserialize)]
struct UpdateInput {
    original: ActionHash,
    content: Value,
}

#[derive(Deserialize)]
struct GetInput {
    hash: AnyDhtHash,
    #[serde(default)]
    latest: bool,
}

#[derive(Deserialize)]
struct LinkInput {
    base: AnyDhtHash,
    target: AnyDhtHash,
    #[serde(default)]
    tag: String,
}

#[derive(Deserialize)]
struct GrantInput {
    functions: Vec<String>,
    secret: Option<CapSecret>,
}

fn create_entry(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let hash = ctx.create_entry(DEMO_ENTRY, payload)?;
        Ok(serde_json::to_value(hash)?)
    })
}

fn update_entry(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let input: UpdateInput = serde_json::from_value(payload)?;
        let hash = ctx.update_entry(input.original, input.content).await?;
        Ok(serde_json::to_value(hash)?)
    })
}

fn delete_entry(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let target: ActionHash = serde_json::from_value(payload)?;
        Ok(serde_json::to_value(ctx.delete_entry(target).await?)?)
    })
}

fn get(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let input: GetInput = serde_json::from_value(payload)?;
        let options = if input.latest {
            GetOptions::latest()
        } else {
            GetOptions::contents()
        };
        Ok(serde_json::to_value(ctx.get(input.hash, options).await?)?)
    })
}

fn get_details(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let hash: AnyDhtHash = serde_json::from_value(payload)?;
        Ok(serde_json::to_value(ctx.get_details(hash).await?)?)
    })
}

fn create_link(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let input: LinkInput = serde_json::from_value(payload)?;
        let hash = ctx.create_link(
            input.base,
            input.target,
            DEMO_LINK,
            LinkTag::from(input.tag.as_str()),
        )?;
        Ok(serde_json::to_value(hash)?)
    })
}

fn delete_link(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let create_link: ActionHash = serde_json::from_value(payload)?;
        Ok(serde_json::to_value(ctx.delete_link(create_link).await?)?)
    })
}

fn get_links(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let base: AnyDhtHash = serde_json::from_value(payload)?;
        Ok(serde_json::to_value(ctx.get_links(base, Some(DEMO_LINK)).await?)?)
    })
}

fn create_secret(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let hash = ctx.create_entry(SECRET_NOTE, payload)?;
        Ok(serde_json::to_value(hash)?)
    })
}

/// Unrestricted without a secret, transferable with one.
fn grant_access(ctx: &mut HostFnContext, payload: Value) -> ZomeResult<'_> {
    Box::pin(async move {
        let input: GrantInput = serde_json::from_value(payload)?;
        let access = match input.secret {
            Some(secret) => CapAccess::Transferable { secret },
            None => CapAccess::Unrestricted,
        };
        let functions = GrantedFunctions::Listed(
            input
                .functions
                .into_iter()
                .map(|f| (DEMO_ZOME.to_string(), f))
                .collect(),
        );
        let hash = ctx.create_cap_grant(ZomeCallCapGrant {
            tag: "demo_access".into(),
            access,
            functions,
        })?;
        Ok(serde_json::to_value(hash)?)
    })
}

/// App entries need a non-empty string `content`.
fn validate(record: &Record, _: &SimulatedDna) -> ValidateCallbackResult {
    let Some(Entry::App(value)) = record.entry() else {
        return ValidateCallbackResult::Valid;
    };
    match value.get("content").and_then(Value::as_str) {
        Some(content) if !content.is_empty() => ValidateCallbackResult::Valid,
        Some(_) => ValidateCallbackResult::Invalid("content is empty".into()),
        None => ValidateCallbackResult::Invalid("content must be a string".into()),
    }
}

fn validate_create_link(action: &Action, _base: &Entry, _target: &Entry) -> ValidateCallbackResult {
    match &action.content {
        ActionContent::CreateLink { tag, .. } if *tag == LinkTag::from(FORBIDDEN_TAG) => {
            ValidateCallbackResult::Invalid(format!("link tag '{}' is not allowed", FORBIDDEN_TAG))
        }
        _ => ValidateCallbackResult::Valid,
    }
}

pub fn demo_zome() -> SimulatedZome {
    SimulatedZome::new(DEMO_ZOME)
        .with_entry_def(EntryDef::public(DEMO_ENTRY))
        .with_entry_def(EntryDef::private(SECRET_NOTE))
        .with_link_type(DEMO_LINK)
        .with_function("create_entry", create_entry)
        .with_function("update_entry", update_entry)
        .with_function("delete_entry", delete_entry)
        .with_function("get", get)
        .with_function("get_details", get_details)
        .with_function("create_link", create_link)
        .with_function("delete_link", delete_link)
        .with_function("get_links", get_links)
        .with_function("create_secret", create_secret)
        .with_function("grant_access", grant_access)
        .with_validate(validate)
        .with_validate_create_link(validate_create_link)
}

/// The demo DNA; `network_seed` separates otherwise identical networks.
pub fn demo_dna(network_seed: impl Into<String>) -> SimulatedDna {
    SimulatedDna::new(DEMO_DNA_NAME)
        .with_network_seed(network_seed)
        .with_zome(demo_zome())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dhtsim_core::action::SignedActionHashed;
    use dhtsim_core::entry::{AppEntryType, EntryType, EntryVisibility};
    use dhtsim_env::{HashType, HoloHash, Timestamp};
    use serde_json::json;

    fn app_record(content: Value) -> Record {
        let entry = Entry::App(content);
        let action = Action {
            author: HoloHash::digest(HashType::Agent, b"a"),
            timestamp: Timestamp::from_micros(1),
            action_seq: 0,
            prev_action: None,
            content: ActionContent::Create {
                entry_type: EntryType::App(AppEntryType {
                    zome_index: 0,
                    entry_def_id: DEMO_ENTRY.into(),
                    visibility: EntryVisibility::Public,
                }),
                entry_hash: entry.hash().unwrap(),
            },
        };
        Record::new(SignedActionHashed::sign(action).unwrap(), Some(entry))
    }

    #[test]
    fn test_validate_content() {
        let dna = demo_dna("");
        assert_eq!(
            validate(&app_record(json!({"content": "hi"})), &dna),
            ValidateCallbackResult::Valid
        );
        assert!(matches!(
            validate(&app_record(json!({"content": ""})), &dna),
            ValidateCallbackResult::Invalid(_)
        ));
        assert!(matches!(
            validate(&app_record(json!({"other": 1})), &dna),
            ValidateCallbackResult::Invalid(_)
        ));
    }

    #[test]
    fn test_forbidden_link_tag() {
        let agent = HoloHash::digest(HashType::Agent, b"a");
        let link = |tag: &str| Action {
            author: agent,
            timestamp: Timestamp::from_micros(1),
            action_seq: 1,
            prev_action: None,
            content: ActionContent::CreateLink {
                base_address: agent,
                target_address: agent,
                zome_index: 0,
                link_type: DEMO_LINK.into(),
                tag: LinkTag::from(tag),
            },
        };
        let entry = Entry::Agent(agent);
        assert_eq!(
            validate_create_link(&link("ok"), &entry, &entry),
            ValidateCallbackResult::Valid
        );
        assert!(matches!(
            validate_create_link(&link(FORBIDDEN_TAG), &entry, &entry),
            ValidateCallbackResult::Invalid(_)
        ));
    }

    #[test]
    fn test_demo_dna_layout() {
        let dna = demo_dna("seed");
        let (index, zome) = dna.zome(DEMO_ZOME).unwrap();
        assert_eq!(index, 0);
        assert!(zome.has_link_type(DEMO_LINK));
        assert_eq!(
            dna.app_entry_type(0, SECRET_NOTE).unwrap().visibility,
            EntryVisibility::Private
        );
        assert_ne!(demo_dna("a").dna_hash().unwrap(), demo_dna("b").dna_hash().unwrap());
    }
}
