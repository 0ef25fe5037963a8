//! `WhiskUser` reconciliation: provisions or tears down one tenant across
//! the subsystems it declares (§4.7, §9), delegating the actual per-system
//! work to [`crate::tenant::provision_tenant`] /
//! [`crate::tenant::deprovision_tenant`].

use std::sync::Arc;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::json;
use tokio::time::Duration;
use tracing::{field, info, instrument, Span};

use crate::crd::whisk_user::WhiskUser;
use crate::error::{Error, Result};
use crate::finalizer;
use crate::reconcile::Context;
use crate::telemetry;
use crate::tenant;

#[instrument(skip(user, ctx), fields(trace_id))]
pub async fn reconcile(user: Arc<WhiskUser>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = chrono::Utc::now();

    let namespace = user.namespace().ok_or_else(|| {
        Error::ValidationError("WhiskUser resource must be namespaced".to_owned())
    })?;
    let name = user.name_any();
    let client = ctx.client.clone();
    let api: Api<WhiskUser> = Api::namespaced(client.clone(), &namespace);

    if user.meta().deletion_timestamp.is_some() {
        info!("deprovisioning tenant \"{name}\" in {namespace}");
        tenant::deprovision_tenant(&ctx.components, &user).await?;
        finalizer::remove(client, &user).await?;
        return Ok(Action::await_change());
    }

    finalizer::add(client, &user).await?;
    let report = tenant::provision_tenant(&ctx.components, &user).await?;

    patch_status(&api, &name, &report).await?;

    if report.all_succeeded() {
        Ok(Action::requeue(Duration::from_secs(600)))
    } else {
        // At least one subsystem failed; retry sooner than the steady
        // state interval so a transient backend outage self-heals.
        Ok(Action::requeue(Duration::from_secs(60)))
    }
}

async fn patch_status(api: &Api<WhiskUser>, name: &str, report: &tenant::ProvisionReport) -> Result<()> {
    let patch = json!({ "status": { "subsystems": report.to_status_map() } });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}
