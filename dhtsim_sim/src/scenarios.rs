//! Named scenarios exercising the cell workflows end to end.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioId {
    /// SCN-001: commit an entry and read it from every agent
    CreateEntry,

    /// SCN-002: one agent deletes another agent's entry
    PeerDelete,

    /// SCN-003: link to a target nobody holds
    MissingLinkTarget,

    /// SCN-004: zome calls from other agents gated by capability grants
    UnauthorizedCall,

    /// SCN-005: an agent publishes records that skipped its own validation
    BadAgentPublish,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CreateEntry,
            ScenarioId::PeerDelete,
            ScenarioId::MissingLinkTarget,
            ScenarioId::UnauthorizedCall,
            ScenarioId::BadAgentPublish,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CreateEntry => "create_entry",
            ScenarioId::PeerDelete => "peer_delete",
            ScenarioId::MissingLinkTarget => "missing_link_target",
            ScenarioId::UnauthorizedCall => "unauthorized_call",
            ScenarioId::BadAgentPublish => "bad_agent_publish",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CreateEntry => "Commit \"hi\", publish its ops, get it back from every agent",
            ScenarioId::PeerDelete => "Bob deletes Alice's entry; the delete reaches the authorities",
            ScenarioId::MissingLinkTarget => "Link to an unknown hash fails as retryable, chain untouched",
            ScenarioId::UnauthorizedCall => "Foreign calls need a grant and the matching secret",
            ScenarioId::BadAgentPublish => "Unvalidated records are committed locally, rejected by peers",
        }
    }

    /// Fewest agents the scenario needs.
    pub fn min_agents(&self) -> usize {
        match self {
            ScenarioId::CreateEntry | ScenarioId::MissingLinkTarget => 1,
            ScenarioId::PeerDelete | ScenarioId::UnauthorizedCall | ScenarioId::BadAgentPublish => 2,
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create_entry" | "createentry" | "scn-001" => Ok(ScenarioId::CreateEntry),
            "peer_delete" | "peerdelete" | "scn-002" => Ok(ScenarioId::PeerDelete),
            "missing_link_target" | "missinglinktarget" | "scn-003" => {
                Ok(ScenarioId::MissingLinkTarget)
            }
            "unauthorized_call" | "unauthorizedcall" | "scn-004" => Ok(ScenarioId::UnauthorizedCall),
            "bad_agent_publish" | "badagentpublish" | "scn-005" => Ok(ScenarioId::BadAgentPublish),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
