//! Firehose record shapes, tagged by collection nsid.

use serde::{Deserialize, Serialize};

/// The four record kinds the ingester dispatches. Unknown collections are
/// ignored -- only the "wanted collections" list ever reaches the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$type", rename_all = "camelCase")]
pub enum FirehoseRecord {
    #[serde(rename = "sh.tangled.publicKey")]
    PublicKey { key: String },

    #[serde(rename = "sh.tangled.knot.member")]
    KnotMember { domain: String, subject: String },

    #[serde(rename = "sh.tangled.repo.collaborator")]
    RepoCollaborator { repo_at_uri: String, subject: String },

    #[serde(rename = "sh.tangled.repo.pull")]
    Pull {
        repo_at_uri: String,
        source_branch: String,
    },
}

/// One envelope delivered over the websocket: which DID committed the
/// record, when, and the record body itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseMessage {
    pub did: String,
    pub time_us: i64,
    #[serde(flatten)]
    pub record: FirehoseRecord,
}
