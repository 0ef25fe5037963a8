//! Per-tenant provisioning across several heterogeneous external systems,
//! with per-system failure isolation (§1, §4.7, §9's "partial-failure
//! semantics" design note): a tenant create may succeed on 3 of 4
//! subsystems; the state carries per-subsystem outcomes and
//! `users_metadata` is written with whatever keys were actually
//! allocated. A retry of the same declaration converges to full success.

pub mod metadata;

use std::collections::BTreeMap;

use crate::components::{cache, object_store, relational_db, vector_db, ComponentContext};
use crate::crd::whisk_user::WhiskUser;
use crate::error::Result;
use crate::tenant::metadata::TenantMetadata;

/// One `Result<(), Error>` per subsystem, keyed the same as
/// [`crate::crd::whisk_user::WhiskUserStatus::subsystems`] (`objectStorage`,
/// `mongodb`, `postgres`, `redis`, `vectorDb`).
#[derive(Default)]
pub struct ProvisionReport {
    pub results: BTreeMap<&'static str, Result<()>>,
}

impl ProvisionReport {
    pub fn record(&mut self, subsystem: &'static str, result: Result<()>) {
        self.results.insert(subsystem, result);
    }

    /// Renders into the status map's string form (`"on"`/`"error"`),
    /// mirroring the `WhiskStatus.component_states` convention.
    pub fn to_status_map(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .map(|(subsystem, result)| {
                let state = if result.is_ok() { "on" } else { "error" };
                (subsystem.to_string(), state.to_owned())
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(Result::is_ok)
    }
}

/// Provisions every enabled subsystem for `user`, recording one outcome
/// per subsystem and continuing past individual failures. Writes
/// `users_metadata` afterward with whatever keys were actually
/// allocated, partially populated on partial success (§3's Lifecycle
/// rule).
pub async fn provision_tenant(ctx: &ComponentContext, user: &WhiskUser) -> Result<ProvisionReport> {
    user.spec.validate()?;

    let namespace = &user.spec.namespace;
    let (_uuid, auth_key) = user.spec.auth.split_once(':').unwrap_or(("", &user.spec.auth));

    let mut report = ProvisionReport::default();
    let mut allocated = Vec::new();

    if let Some(storage) = &user.spec.object_storage {
        if storage.enabled {
            let data_bucket = storage.data.bucket.clone().unwrap_or_else(|| format!("{namespace}-data"));
            let route_bucket = storage.route.bucket.clone().unwrap_or_else(|| format!("{namespace}-web"));
            let result = object_store::ObjectStore
                .provision_tenant(ctx, namespace, auth_key, Some(&data_bucket), Some(&route_bucket))
                .await;
            if result.is_ok() {
                allocated.push(("S3_BUCKET_DATA", data_bucket));
                allocated.push(("S3_BUCKET_STATIC", route_bucket));
            }
            report.record("objectStorage", result);
        }
    }

    if let Some(postgres) = &user.spec.postgres {
        if postgres.enabled {
            let result = relational_db::create_tenant_database(ctx, namespace, &postgres.database, &postgres.password).await;
            if result.is_ok() {
                allocated.push(("POSTGRES_DATABASE", postgres.database.clone()));
            }
            report.record("postgres", result);
        }
    }

    if let Some(mongodb) = &user.spec.mongodb {
        if mongodb.enabled {
            // mongoProxy fronts the relational database (§4.4); its
            // backing store is a tenant database on the same server.
            let result = relational_db::create_tenant_database(ctx, namespace, &mongodb.database, &mongodb.password).await;
            if result.is_ok() {
                allocated.push(("MONGODB_DATABASE", mongodb.database.clone()));
            }
            report.record("mongodb", result);
        }
    }

    if let Some(redis) = &user.spec.redis {
        if redis.enabled {
            let result = cache::create_tenant_prefix(ctx, namespace, &redis.prefix, auth_key).await;
            if result.is_ok() {
                allocated.push(("REDIS_PREFIX", redis.prefix.clone()));
            }
            report.record("redis", result);
        }
    }

    if let Some(vector) = &user.spec.vector_db {
        if vector.enabled {
            let admin = vector_db::AdminClient::from_config(ctx)?;
            let result = admin.setup_user(ctx, namespace, namespace, &vector.password, &vector.database).await;
            if result.is_ok() {
                allocated.push(("MILVUS_DB_NAME", vector.database.clone()));
            }
            report.record("vectorDb", result);
        }
    }

    metadata::save_with_retry(ctx, namespace, namespace, |existing| {
        existing.password = auth_key.to_owned();
        for (key, value) in &allocated {
            existing.set(*key, value.clone());
        }
    })
    .await?;

    Ok(report)
}

/// Tears down every enabled subsystem for `user`, in the mirror of
/// provisioning, then deletes the `users_metadata` document. Per §4.4
/// component contracts, each subsystem's own delete already tolerates
/// not-found.
pub async fn deprovision_tenant(ctx: &ComponentContext, user: &WhiskUser) -> Result<ProvisionReport> {
    let namespace = &user.spec.namespace;
    let mut report = ProvisionReport::default();

    if let Some(vector) = &user.spec.vector_db {
        if vector.enabled {
            let admin = vector_db::AdminClient::from_config(ctx)?;
            report.record("vectorDb", admin.remove_user(ctx, namespace, namespace, &vector.database).await);
        }
    }
    if let Some(redis) = &user.spec.redis {
        if redis.enabled {
            report.record("redis", cache::delete_tenant_prefix(ctx, namespace, &redis.prefix).await);
        }
    }
    if let Some(mongodb) = &user.spec.mongodb {
        if mongodb.enabled {
            report.record("mongodb", relational_db::drop_tenant_database(ctx, namespace, &mongodb.database).await);
        }
    }
    if let Some(postgres) = &user.spec.postgres {
        if postgres.enabled {
            report.record("postgres", relational_db::drop_tenant_database(ctx, namespace, &postgres.database).await);
        }
    }

    metadata::delete(ctx, namespace, namespace).await?;
    Ok(report)
}

/// `TenantMetadata::new` takes an empty email placeholder: tenants are
/// identified by namespace, not by a registered address, so `users_metadata`
/// carries the namespace as login and leaves email blank unless a future
/// subsystem populates it.
pub fn blank_document(namespace: &str) -> TenantMetadata {
    TenantMetadata::new(namespace, "", "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provision_report_status_map_reflects_outcomes() {
        let mut report = ProvisionReport::default();
        report.record("postgres", Ok(()));
        report.record("redis", Err(crate::error::Error::ValidationError("boom".into())));
        let map = report.to_status_map();
        assert_eq!(map.get("postgres").map(String::as_str), Some("on"));
        assert_eq!(map.get("redis").map(String::as_str), Some("error"));
        assert!(!report.all_succeeded());
    }
}
