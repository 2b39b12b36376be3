//! DNA definitions: zomes, their entry/link types, functions and validation callbacks.

use crate::action::Action;
use crate::entry::{AppEntryType, Entry, EntryVisibility};
use crate::error::{CellError, HostFnError};
use crate::hashing::hash_of;
use crate::host_fn::HostFnContext;
use crate::record::Record;
use dhtsim_env::{AnyDhtHash, DnaHash, HashType};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Most zomes a DNA can hold.
pub const MAX_ZOMES: usize = u8::MAX as usize + 1;

/// Result of an application validation callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidateCallbackResult {
    Valid,
    Invalid(String),
    UnresolvedDependencies(Vec<AnyDhtHash>),
}

/// An application function callable through `call_zome_fn`.
pub type ZomeFn =
    for<'a> fn(&'a mut HostFnContext, Value) -> BoxFuture<'a, Result<Value, HostFnError>>;

/// Validates a Create, Update or Delete record.
pub type ValidateFn = fn(&Record, &SimulatedDna) -> ValidateCallbackResult;

/// Validates a CreateLink given its base and target entries.
pub type ValidateCreateLinkFn = fn(&Action, &Entry, &Entry) -> ValidateCallbackResult;

pub type ValidateDeleteLinkFn = fn(&Action) -> ValidateCallbackResult;

fn accept_record(_: &Record, _: &SimulatedDna) -> ValidateCallbackResult {
    ValidateCallbackResult::Valid
}

fn accept_create_link(_: &Action, _: &Entry, _: &Entry) -> ValidateCallbackResult {
    ValidateCallbackResult::Valid
}

fn accept_delete_link(_: &Action) -> ValidateCallbackResult {
    ValidateCallbackResult::Valid
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDef {
    pub id: String,
    pub visibility: EntryVisibility,
}

impl EntryDef {
    pub fn public(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: EntryVisibility::Public,
        }
    }

    pub fn private(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: EntryVisibility::Private,
        }
    }
}

/// One module of application code and its rules.
#[derive(Clone)]
pub struct SimulatedZome {
    pub name: String,
    pub entry_defs: Vec<EntryDef>,
    pub link_types: Vec<String>,
    pub zome_functions: BTreeMap<String, ZomeFn>,
    pub validate: ValidateFn,
    pub validate_create_link: ValidateCreateLinkFn,
    pub validate_delete_link: ValidateDeleteLinkFn,
}

impl SimulatedZome {
    /// A zome with no definitions that accepts everything.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_defs: Vec::new(),
            link_types: Vec::new(),
            zome_functions: BTreeMap::new(),
            validate: accept_record,
            validate_create_link: accept_create_link,
            validate_delete_link: accept_delete_link,
        }
    }

    pub fn with_entry_def(mut self, def: EntryDef) -> Self {
        self.entry_defs.push(def);
        self
    }

    pub fn with_link_type(mut self, link_type: impl Into<String>) -> Self {
        self.link_types.push(link_type.into());
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, f: ZomeFn) -> Self {
        self.zome_functions.insert(name.into(), f);
        self
    }

    pub fn with_validate(mut self, f: ValidateFn) -> Self {
        self.validate = f;
        self
    }

    pub fn with_validate_create_link(mut self, f: ValidateCreateLinkFn) -> Self {
        self.validate_create_link = f;
        self
    }

    pub fn with_validate_delete_link(mut self, f: ValidateDeleteLinkFn) -> Self {
        self.validate_delete_link = f;
        self
    }

    pub fn entry_def(&self, id: &str) -> Option<&EntryDef> {
        self.entry_defs.iter().find(|def| def.id == id)
    }

    pub fn has_link_type(&self, link_type: &str) -> bool {
        self.link_types.iter().any(|t| t == link_type)
    }
}

impl fmt::Debug for SimulatedZome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedZome")
            .field("name", &self.name)
            .field("entry_defs", &self.entry_defs)
            .field("link_types", &self.link_types)
            .field("zome_functions", &self.zome_functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Hashed part of a zome: its name and type definitions.
#[derive(Serialize)]
struct ZomeDef<'a> {
    name: &'a str,
    entry_defs: &'a [EntryDef],
    link_types: &'a [String],
}

/// The application definition shared by every cell in a network.
#[derive(Debug, Clone)]
pub struct SimulatedDna {
    pub name: String,
    pub network_seed: String,
    pub properties: Value,
    pub zomes: Vec<SimulatedZome>,
}

impl SimulatedDna {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_seed: String::new(),
            properties: Value::Null,
            zomes: Vec::new(),
        }
    }

    pub fn with_network_seed(mut self, seed: impl Into<String>) -> Self {
        self.network_seed = seed.into();
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_zome(mut self, zome: SimulatedZome) -> Self {
        self.zomes.push(zome);
        self
    }

    /// Network namespace: hash of the name, seed, properties and zome definitions.
    ///
    /// Function and callback pointers are not part of the hash.
    pub fn dna_hash(&self) -> Result<DnaHash, serde_json::Error> {
        let zomes: Vec<ZomeDef<'_>> = self
            .zomes
            .iter()
            .map(|z| ZomeDef {
                name: &z.name,
                entry_defs: &z.entry_defs,
                link_types: &z.link_types,
            })
            .collect();
        hash_of(
            HashType::Dna,
            &(&self.name, &self.network_seed, &self.properties, zomes),
        )
    }

    pub fn zome(&self, name: &str) -> Option<(u8, &SimulatedZome)> {
        self.zomes
            .iter()
            .enumerate()
            .find(|(_, z)| z.name == name)
            .and_then(|(i, z)| u8::try_from(i).ok().map(|i| (i, z)))
    }

    /// Zomes are addressed by a `u8` index; more than that cannot run.
    pub fn check_zome_count(&self) -> Result<(), CellError> {
        if self.zomes.len() > MAX_ZOMES {
            return Err(CellError::InvalidDna(format!(
                "{} has {} zomes, at most {} are addressable",
                self.name,
                self.zomes.len(),
                MAX_ZOMES
            )));
        }
        Ok(())
    }

    pub fn zome_by_index(&self, index: u8) -> Option<&SimulatedZome> {
        self.zomes.get(index as usize)
    }

    /// Entry type for an entry def of the given zome.
    pub fn app_entry_type(&self, zome_index: u8, entry_def_id: &str) -> Option<AppEntryType> {
        let def = self.zome_by_index(zome_index)?.entry_def(entry_def_id)?;
        Some(AppEntryType {
            zome_index,
            entry_def_id: def.id.clone(),
            visibility: def.visibility,
        })
    }
}
