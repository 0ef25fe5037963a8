//! Coordinator (§4.4): an independent StatefulSet providing the
//! distributed-coordination endpoint consumed by the message log, the
//! function controller and the invoker.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "coordinator";
const LABEL_SELECTOR: &str = "app=whisk-coordinator";

pub struct Coordinator;

#[async_trait]
impl ComponentController for Coordinator {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("coordinator.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;

        // Read back the pod spec's own connection endpoint and publish it
        // under a well-known key for downstream consumers, per §4.4.
        let endpoint = format!("coordinator-0.coordinator.{namespace}.svc.cluster.local:2181");
        ctx.config.record_endpoint("coordinator_url", endpoint)?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("coordinator.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
