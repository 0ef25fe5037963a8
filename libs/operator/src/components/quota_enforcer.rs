//! Quota enforcer (§4.4, §4.6): a CronJob whose schedule defaults to
//! `*/10 * * * *`, running the operator's own image with a `quota-tick`
//! subcommand (see [`crate::quota`] for the tick logic itself, and
//! `cmd/operator`'s CLI for the entry point).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::template::TemplateData;

const NAME: &str = "quotaEnforcer";

pub struct QuotaEnforcer;

#[async_trait]
impl ComponentController for QuotaEnforcer {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let schedule = whisk
            .spec
            .quota
            .as_ref()
            .map(|q| q.schedule.clone())
            .unwrap_or_else(|| ctx.config.get_string_or("quota.schedule", "*/10 * * * *"));
        let image = ctx.config.get_string_or("operator.image", "ghcr.io/nuvolaris/whisk-operator");
        let tag = ctx.config.get_string_or("operator.tag", "latest");

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace)
            .set("schedule", &schedule)
            .set("image", format!("{image}:{tag}"))
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("quota-enforcer.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("quota-enforcer.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
