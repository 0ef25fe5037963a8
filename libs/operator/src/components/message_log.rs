//! Message log (§4.4): an independent StatefulSet. Reads the coordinator
//! connection endpoint from the configuration store after its own
//! readiness and republishes it under its own well-known key.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "messageLog";
const LABEL_SELECTOR: &str = "app=whisk-message-log";

pub struct MessageLog;

#[async_trait]
impl ComponentController for MessageLog {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["coordinator"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let coordinator_url = ctx.config.require_string(
            "coordinator_url",
            "messageLog requires the coordinator component to have reported its endpoint",
        )?;

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("coordinator_url", &coordinator_url)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("message-log.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;

        let endpoint = format!("message-log-0.message-log.{namespace}.svc.cluster.local:9092");
        ctx.config.record_endpoint("message_log_url", endpoint)?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("message-log.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
