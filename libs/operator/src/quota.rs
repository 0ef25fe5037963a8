//! Quota enforcement tick (§4.6). Run once per CronJob invocation (driven
//! by the `quota-tick` CLI subcommand): for every `WhiskUser` with a
//! declared quota, measures usage against the declared limit and toggles
//! access + annotation, using the annotation as the sole idempotency
//! record — without it the loop is a no-op even when usage is above
//! threshold.
//!
//! Grounded on `quota_checker.py`'s `block_*_quota`/`reset_*_quota`/
//! `check_*_quota` trio, generalized over three subsystems.

use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{info, instrument};

use crate::components::{cache, relational_db, ComponentContext};
use crate::config::keys;
use crate::crd::whisk_user::{Quota, WhiskUser};
use crate::error::Result;

/// Outcome of a single subsystem's quota check for one tenant, returned
/// so the caller can log/aggregate without the check function needing to
/// know about metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaTransition {
    /// Usage is under the limit and the annotation was already clear, or
    /// over the limit and already blocked: no write performed.
    Unchanged,
    /// Usage crossed above the limit; access was just revoked.
    Blocked,
    /// Usage fell back under the limit; access was just restored.
    Restored,
}

/// Runs one full tick across every `WhiskUser` in the cluster, one
/// subsystem at a time, per §4.6.
#[instrument(skip(client, ctx))]
pub async fn run_tick(client: &Client, ctx: &ComponentContext) -> Result<()> {
    let api: Api<WhiskUser> = Api::all(client.clone());
    let users = api.list(&Default::default()).await.map_err(crate::error::Error::KubeError)?;

    for user in users.items {
        if let Some(postgres) = &user.spec.postgres {
            if postgres.enabled {
                if let Some(quota_mb) = explicit_mb(&postgres.quota) {
                    let result = check_relational_quota(ctx, &user, &postgres.database, quota_mb).await?;
                    log_transition(&user, "postgres", result);
                }
            }
        }
        if let Some(mongodb) = &user.spec.mongodb {
            if mongodb.enabled {
                if let Some(quota_mb) = explicit_mb(&mongodb.quota) {
                    let result = check_ferret_quota(ctx, &user, &mongodb.database, quota_mb).await?;
                    log_transition(&user, "mongodb", result);
                }
            }
        }
        if let Some(redis) = &user.spec.redis {
            if redis.enabled {
                if let Some(quota_mb) = explicit_mb(&redis.quota) {
                    let result = check_cache_quota(ctx, &user, &redis.prefix, quota_mb).await?;
                    log_transition(&user, "redis", result);
                }
            }
        }
    }
    Ok(())
}

fn explicit_mb(quota: &Quota) -> Option<u64> {
    match quota {
        Quota::Auto(_) => None,
        Quota::Mb(mb) => Some(*mb),
    }
}

fn log_transition(user: &WhiskUser, subsystem: &str, transition: QuotaTransition) {
    if transition != QuotaTransition::Unchanged {
        info!(
            tenant = user.spec.namespace,
            subsystem,
            ?transition,
            "quota transition"
        );
    }
}

/// §4.6 rule 1 (and, with a different annotation, rule 2 for mongoProxy):
/// query current byte size; if at/over the MB limit and not yet
/// annotated, revoke write access and annotate; if under the limit and
/// the annotation is set, restore access and clear it.
async fn check_relational_quota(
    ctx: &ComponentContext,
    user: &WhiskUser,
    database: &str,
    quota_mb: u64,
) -> Result<QuotaTransition> {
    let namespace = &user.spec.namespace;
    let usage = relational_db::database_size_bytes(ctx, namespace, database).await?;
    let limit = quota_mb * 1024 * 1024;
    let blocked = annotation_is_true(user, keys::POSTGRES_QUOTA_REACHED);

    if usage >= limit && !blocked {
        relational_db::revoke_write(ctx, namespace, database).await?;
        annotate(ctx, user, keys::POSTGRES_QUOTA_REACHED, true).await?;
        Ok(QuotaTransition::Blocked)
    } else if usage < limit && blocked {
        relational_db::restore_write(ctx, namespace, database).await?;
        annotate(ctx, user, keys::POSTGRES_QUOTA_REACHED, false).await?;
        Ok(QuotaTransition::Restored)
    } else {
        Ok(QuotaTransition::Unchanged)
    }
}

/// §4.6 rule 2: mongoProxy fronts the relational database (see
/// `components/mongo_proxy.rs`), so its quota is measured and enforced
/// against the same backing database as `check_relational_quota`, gated
/// on the distinct `ferret_db_quota_reached` annotation.
async fn check_ferret_quota(
    ctx: &ComponentContext,
    user: &WhiskUser,
    database: &str,
    quota_mb: u64,
) -> Result<QuotaTransition> {
    let namespace = &user.spec.namespace;
    let usage = relational_db::database_size_bytes(ctx, namespace, database).await?;
    let limit = quota_mb * 1024 * 1024;
    let blocked = annotation_is_true(user, keys::FERRET_QUOTA_REACHED);

    if usage >= limit && !blocked {
        relational_db::revoke_write(ctx, namespace, database).await?;
        annotate(ctx, user, keys::FERRET_QUOTA_REACHED, true).await?;
        Ok(QuotaTransition::Blocked)
    } else if usage < limit && blocked {
        relational_db::restore_write(ctx, namespace, database).await?;
        annotate(ctx, user, keys::FERRET_QUOTA_REACHED, false).await?;
        Ok(QuotaTransition::Restored)
    } else {
        Ok(QuotaTransition::Unchanged)
    }
}

/// §4.6 rule 3: sum `MEMORY USAGE` over the tenant's key prefix; toggle
/// `+@read`/`+@all` against the limit, same idempotency rule.
async fn check_cache_quota(
    ctx: &ComponentContext,
    user: &WhiskUser,
    prefix: &str,
    quota_mb: u64,
) -> Result<QuotaTransition> {
    let namespace = &user.spec.namespace;
    let usage = cache::measure_prefix_usage_bytes(ctx, namespace, prefix).await?;
    let limit = quota_mb * 1024 * 1024;
    let blocked = annotation_is_true(user, keys::REDIS_QUOTA_REACHED);

    if usage >= limit && !blocked {
        cache::set_read_only(ctx, namespace, prefix).await?;
        annotate(ctx, user, keys::REDIS_QUOTA_REACHED, true).await?;
        Ok(QuotaTransition::Blocked)
    } else if usage < limit && blocked {
        cache::set_all(ctx, namespace, prefix).await?;
        annotate(ctx, user, keys::REDIS_QUOTA_REACHED, false).await?;
        Ok(QuotaTransition::Restored)
    } else {
        Ok(QuotaTransition::Unchanged)
    }
}

fn annotation_is_true(user: &WhiskUser, key: &str) -> bool {
    user.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// Writes the annotation with last-writer-wins semantics (`--overwrite`
/// in the source), the single source of truth for idempotency (§4.6,
/// §5's "annotations are the persistence point for quota decisions").
async fn annotate(ctx: &ComponentContext, user: &WhiskUser, key: &str, value: bool) -> Result<()> {
    let client = ctx.adapter_client();
    let api: Api<WhiskUser> = Api::namespaced(client, user.metadata.namespace.as_deref().unwrap_or_default());
    let name = user.metadata.name.as_deref().unwrap_or_default();
    let patch = json!({
        "metadata": {
            "annotations": {
                key: value.to_string(),
            }
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(crate::error::Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn user_with_annotation(key: &str, value: &str) -> WhiskUser {
        let mut user = WhiskUser::new("alice", Default::default());
        let mut annotations = BTreeMap::new();
        annotations.insert(key.to_owned(), value.to_owned());
        user.metadata.annotations = Some(annotations);
        user
    }

    #[test]
    fn annotation_is_true_reads_string_value() {
        let user = user_with_annotation(keys::POSTGRES_QUOTA_REACHED, "true");
        assert!(annotation_is_true(&user, keys::POSTGRES_QUOTA_REACHED));
    }

    #[test]
    fn annotation_is_true_defaults_false_when_absent() {
        let user = WhiskUser::new("alice", Default::default());
        assert!(!annotation_is_true(&user, keys::POSTGRES_QUOTA_REACHED));
    }

    #[test]
    fn explicit_mb_ignores_auto() {
        assert_eq!(explicit_mb(&Quota::Auto(crate::crd::whisk_user::QuotaAuto)), None);
        assert_eq!(explicit_mb(&Quota::Mb(100)), Some(100));
    }
}
