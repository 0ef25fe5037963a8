//! `TenantMetadata` (§3): an append-only key/value list persisted in the
//! document DB (`users_metadata`, one document keyed by namespace). Holds
//! the connection strings and credentials actually allocated for the
//! tenant; read by function code at invocation time.
//!
//! Updates are optimistic (§5): each save reads the current document,
//! merges, and writes back with the revision token; conflicts retry.

use serde::{Deserialize, Serialize};

use crate::components::ComponentContext;
use crate::error::{Error, Result};
use crate::k8s::adapter::PodRef;

const MAX_MERGE_RETRIES: u32 = 5;

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// Mirrors the tenant metadata document fields of §6.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TenantMetadata {
    #[serde(rename = "_id")]
    pub login: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub email: String,
    pub password: String,
    pub metadata: Vec<MetadataEntry>,
    pub quota: Vec<MetadataEntry>,
    pub env: Vec<MetadataEntry>,
    pub userenv: Vec<MetadataEntry>,
}

impl TenantMetadata {
    pub fn new(login: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            revision: None,
            email: email.into(),
            password: password.into(),
            metadata: Vec::new(),
            quota: Vec::new(),
            env: Vec::new(),
            userenv: Vec::new(),
        }
    }

    /// Appends or overwrites a key; this is the "append-only key/value
    /// list" semantics of §3 — later keys win, nothing is ever removed
    /// except by a whole-document delete.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.metadata.iter_mut().find(|e| e.key == key) {
            entry.value = value;
        } else {
            self.metadata.push(MetadataEntry { key, value });
        }
    }
}

fn document_db_pod(namespace: &str) -> PodRef {
    PodRef {
        namespace: namespace.to_owned(),
        name: "documentdb-0".to_owned(),
        container: None,
    }
}

/// Reads the current document for `login`, or `None` if it does not yet
/// exist.
pub async fn read(ctx: &ComponentContext, namespace: &str, login: &str) -> Result<Option<TenantMetadata>> {
    let script = format!("curl -s http://localhost:5984/users_metadata/{login}\n");
    let output = ctx.adapter.run_in_pod(&document_db_pod(namespace), &script, "sh").await?;
    if output.trim().is_empty() || output.contains("\"error\":\"not_found\"") {
        return Ok(None);
    }
    serde_json::from_str(&output).map(Some).map_err(Error::SerializationError)
}

/// Writes `metadata` with optimistic merge: reads the latest revision,
/// re-applies `mutate`, writes back, and retries on a revision conflict.
pub async fn save_with_retry<F>(ctx: &ComponentContext, namespace: &str, login: &str, mut mutate: F) -> Result<()>
where
    F: FnMut(&mut TenantMetadata),
{
    for _attempt in 0..MAX_MERGE_RETRIES {
        let mut document = read(ctx, namespace, login)
            .await?
            .unwrap_or_else(|| TenantMetadata::new(login, "", ""));
        mutate(&mut document);

        let body = serde_json::to_string(&document).map_err(Error::SerializationError)?;
        let script = format!(
            "curl -s -X PUT http://localhost:5984/users_metadata/{login} -d '{body}'\n"
        );
        let output = ctx.adapter.run_in_pod(&document_db_pod(namespace), &script, "sh").await?;
        if output.contains("\"error\":\"conflict\"") {
            continue;
        }
        return Ok(());
    }
    Err(Error::ExternalSystemError {
        component: "tenant-metadata",
        message: format!("users_metadata save for {login} did not converge after {MAX_MERGE_RETRIES} attempts"),
    })
}

/// Removes the tenant's metadata document entirely, on tenant delete.
pub async fn delete(ctx: &ComponentContext, namespace: &str, login: &str) -> Result<()> {
    if let Some(document) = read(ctx, namespace, login).await? {
        let revision = document.revision.unwrap_or_default();
        let script = format!(
            "curl -s -X DELETE 'http://localhost:5984/users_metadata/{login}?rev={revision}'\n"
        );
        ctx.adapter.run_in_pod(&document_db_pod(namespace), &script, "sh").await.map(drop)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_existing_key() {
        let mut metadata = TenantMetadata::new("alice", "alice@example.com", "pw");
        metadata.set("S3_BUCKET_DATA", "alice-data");
        metadata.set("S3_BUCKET_DATA", "alice-data-v2");
        assert_eq!(metadata.metadata.len(), 1);
        assert_eq!(metadata.metadata[0].value, "alice-data-v2");
    }

    #[test]
    fn set_appends_new_keys() {
        let mut metadata = TenantMetadata::new("alice", "alice@example.com", "pw");
        metadata.set("S3_BUCKET_DATA", "alice-data");
        metadata.set("S3_BUCKET_STATIC", "alice-web");
        assert_eq!(metadata.metadata.len(), 2);
    }
}
