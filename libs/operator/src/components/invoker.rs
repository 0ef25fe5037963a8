//! Invoker (§4.4): a StatefulSet whose environment is built from the
//! configuration store (limits, JVM heap options, database URLs,
//! message-log URL, coordinator URL). Requires `documentDB` and, when
//! enabled, `messageLog`.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "invoker";
const LABEL_SELECTOR: &str = "app=whisk-invoker";

pub struct Invoker;

#[async_trait]
impl ComponentController for Invoker {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["documentDB", "messageLog"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let message_log_url = ctx.config.get_string("message_log_url").unwrap_or_default();
        let document_db_host = ctx.config.get_string("document_db_host").unwrap_or_default();

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("message_log_url", &message_log_url)
            .set("document_db_host", &document_db_host)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("invoker.yaml", &data)?;
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
        let manifests = ctx.renderer.render_manifest_list("invoker.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
