//! Monitoring (§4.4): Prometheus server plus an optional Alertmanager,
//! whose Secret carries the Slack/SMTP credentials.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::template::TemplateData;

const NAME: &str = "monitoring";

pub struct Monitoring;

#[async_trait]
impl ComponentController for Monitoring {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let alertmanager = whisk.spec.monitoring.as_ref().map(|m| m.alertmanager).unwrap_or(false);

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace)
            .set("alertmanager", alertmanager)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("monitoring.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("monitoring.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
