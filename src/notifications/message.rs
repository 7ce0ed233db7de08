use crate::state::Job;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Full store snapshot, sent once per subscriber on connect.
    RefreshFiles,
    CreateFile,
    UpdateFile,
    DeleteFile,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::RefreshFiles => "refresh_files",
            MessageType::CreateFile => "create_file",
            MessageType::UpdateFile => "update_file",
            MessageType::DeleteFile => "delete_file",
        }
    }
}

/// Frame pushed to subscribers: `{"type", "mustSend", "data"}`.
///
/// `data` is always an object keyed by job ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(rename = "mustSend")]
    pub must_send: bool,
    pub data: Value,
}

impl HubMessage {
    pub fn new(kind: MessageType, must_send: bool, data: Value) -> Self {
        Self {
            kind,
            must_send,
            data,
        }
    }

    /// Fingerprint used for deduplication.
    ///
    /// Hashes the type and the payload's top-level keys, ignoring values, so
    /// successive progress updates for one job collide.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        if let Value::Object(map) = &self.data {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                hasher.update([0u8]);
                hasher.update(key.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// Payload for a set of jobs: `{"<id>": job, ...}`.
pub fn jobs_payload<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Value {
    let map: Map<String, Value> = jobs
        .into_iter()
        .filter_map(|job| {
            serde_json::to_value(job)
                .ok()
                .map(|value| (job.id.to_string(), value))
        })
        .collect();
    Value::Object(map)
}
