//! Container image registry (§4.4): either `internal` (StatefulSet +
//! htpasswd secret + dockerconfig pull secret + optional ingress/route) or
//! `external` (only the two secrets). Credentials are pushed into
//! `cm/config` as annotations.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "registry";
const LABEL_SELECTOR: &str = "app=whisk-registry";

/// Named `Registry_` to avoid colliding with [`crate::components::Registry`],
/// the component registry itself.
pub struct Registry_;

#[async_trait]
impl ComponentController for Registry_ {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let mode = whisk
            .spec
            .registry
            .as_ref()
            .map(|r| r.mode.clone())
            .unwrap_or_else(|| "internal".to_owned());

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("mode", &mode)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("registry.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        if mode == "internal" {
            wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
                .await?;
            ctx.config.record_endpoint("registry_internal_host", format!("{}-registry", whisk.name_any()))?;
        }

        ctx.config.record_endpoint("registry_username", "nuvolaris")?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("registry.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
