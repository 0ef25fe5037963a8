//! Vector-DB coordinator (§4.4): an independent StatefulSet the vector
//! database depends on for its own coordination, distinct from the
//! platform-wide `coordinator` component.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "vectorDBCoordinator";
const LABEL_SELECTOR: &str = "app=whisk-vector-db-coordinator";

pub struct VectorDbCoordinator;

#[async_trait]
impl ComponentController for VectorDbCoordinator {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("vector-db-coordinator.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("vector-db-coordinator.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
