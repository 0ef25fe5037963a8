//! `Whisk` reconciliation: validates the component DAG, diffs the last
//! applied declaration against the incoming one, and walks the enabled
//! components in dependency order through [`crate::components::Registry`]
//! (§4.2, §4.3).

use std::collections::BTreeMap;
use std::sync::Arc;

use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};
use tokio::time::Duration;
use tracing::{field, info, instrument, Span};

use crate::config::keys;
use crate::crd::whisk::{Whisk, COMPONENT_ORDER};
use crate::diff::{self, Action as DiffAction};
use crate::error::{Error, Result};
use crate::finalizer;
use crate::k8s::adapter::owner_reference;
use crate::reconcile::Context;
use crate::telemetry;

const API_VERSION: &str = "nuvolaris.org/v1";
const KIND: &str = "Whisk";

#[instrument(skip(whisk, ctx), fields(trace_id))]
pub async fn reconcile(whisk: Arc<Whisk>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = chrono::Utc::now();

    let namespace = whisk.namespace().ok_or_else(|| {
        Error::ValidationError("Whisk resource must be namespaced".to_owned())
    })?;
    let name = whisk.name_any();
    let client = ctx.client.clone();
    let api: Api<Whisk> = Api::namespaced(client.clone(), &namespace);
    let owner = owner_reference(whisk.as_ref(), API_VERSION, KIND);

    if whisk.meta().deletion_timestamp.is_some() {
        info!("deleting Whisk \"{name}\" in {namespace}");
        let enabled = enabled_map(&whisk);
        let actions: BTreeMap<String, DiffAction> =
            enabled.iter().filter(|(_, &on)| on).map(|(c, _)| (c.clone(), DiffAction::Delete)).collect();
        for component in diff::ordered_components(&actions, DiffAction::Delete) {
            if component.ends_with(diff::INGRESSES_SUFFIX) {
                continue;
            }
            if let Some(controller) = ctx.registry.get(&component) {
                controller.delete(&ctx.components, &whisk, &owner).await?;
            }
        }
        finalizer::remove(client, &whisk).await?;
        return Ok(Action::await_change());
    }

    finalizer::add(client.clone(), &whisk).await?;
    whisk.validate()?;
    ctx.components.config.configure_from_spec(&whisk.spec)?;

    let new_spec = serde_json::to_value(&whisk.spec).map_err(Error::SerializationError)?;
    let previous_spec = read_last_applied(&whisk);
    let enabled = enabled_map(&whisk);

    let changes = diff::diff_values(&previous_spec, &new_spec);
    let actions = diff::classify(&changes, &enabled);

    apply_actions(&ctx, &whisk, &owner, &actions, &enabled).await;

    let component_states = status_from_actions(&whisk, &actions);
    patch_status(&api, &name, &component_states).await?;
    patch_last_applied(&api, &name, &new_spec).await?;

    Ok(Action::requeue(Duration::from_secs(300)))
}

fn enabled_map(whisk: &Whisk) -> BTreeMap<String, bool> {
    COMPONENT_ORDER
        .iter()
        .map(|&component| (component.to_owned(), whisk.spec.components.is_enabled(component)))
        .collect()
}

/// First reconcile (no annotation yet) diffs against an empty object, so
/// every enabled component is classified as `create`.
fn read_last_applied(whisk: &Whisk) -> Value {
    whisk
        .annotations()
        .get(keys::LAST_APPLIED_SPEC)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| json!({}))
}

async fn apply_actions(
    ctx: &Context,
    whisk: &Whisk,
    owner: &k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference,
    actions: &BTreeMap<String, DiffAction>,
    enabled: &BTreeMap<String, bool>,
) {
    for action in [DiffAction::Delete, DiffAction::Create, DiffAction::Update] {
        for component in diff::ordered_components(actions, action) {
            if component.ends_with(diff::INGRESSES_SUFFIX) {
                // Ingress-only updates re-run the owning component's apply
                // path; the component name is the pseudo-component minus
                // its suffix.
                let owning = component.trim_end_matches(diff::INGRESSES_SUFFIX);
                if let Some(controller) = ctx.registry.get(owning) {
                    if let Err(e) = controller.patch(&ctx.components, whisk, owner, DiffAction::Update).await {
                        tracing::warn!(component = owning, error = ?e, "ingress re-apply failed");
                    }
                }
                continue;
            }
            if action != DiffAction::Delete && !enabled.get(&component).copied().unwrap_or(false) {
                continue;
            }
            if let Some(controller) = ctx.registry.get(&component) {
                if let Err(e) = controller.patch(&ctx.components, whisk, owner, action).await {
                    tracing::warn!(component, ?action, error = ?e, "component reconcile failed");
                }
            }
        }
    }
}

fn status_from_actions(whisk: &Whisk, actions: &BTreeMap<String, DiffAction>) -> BTreeMap<String, String> {
    let mut states = whisk.status.as_ref().map(|s| s.component_states.clone()).unwrap_or_default();
    for (component, action) in actions {
        if component.ends_with(diff::INGRESSES_SUFFIX) {
            continue;
        }
        let state = match action {
            DiffAction::Delete => "off",
            DiffAction::Create | DiffAction::Update => "on",
        };
        states.insert(component.clone(), state.to_owned());
    }
    states
}

async fn patch_status(api: &Api<Whisk>, name: &str, component_states: &BTreeMap<String, String>) -> Result<()> {
    let patch = json!({ "status": { "componentStates": component_states } });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

async fn patch_last_applied(api: &Api<Whisk>, name: &str, spec: &Value) -> Result<()> {
    let raw = serde_json::to_string(spec).map_err(Error::SerializationError)?;
    let patch = json!({ "metadata": { "annotations": { keys::LAST_APPLIED_SPEC: raw } } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(Error::KubeError)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_map_covers_every_component_order_entry() {
        let whisk = Whisk::default();
        let map = enabled_map(&whisk);
        assert_eq!(map.len(), COMPONENT_ORDER.len());
    }

    #[test]
    fn status_from_actions_marks_created_components_on() {
        let whisk = Whisk::default();
        let mut actions = BTreeMap::new();
        actions.insert("cache".to_owned(), DiffAction::Create);
        actions.insert("registry".to_owned(), DiffAction::Delete);
        let states = status_from_actions(&whisk, &actions);
        assert_eq!(states.get("cache").map(String::as_str), Some("on"));
        assert_eq!(states.get("registry").map(String::as_str), Some("off"));
    }

    #[test]
    fn read_last_applied_defaults_to_empty_object_without_annotation() {
        let whisk = Whisk::default();
        assert_eq!(read_last_applied(&whisk), json!({}));
    }
}
