//! Function controller (§4.4): a StatefulSet whose environment mirrors
//! [`crate::components::invoker`]. After readiness, receives an API
//! ingress/route (the `apiEndpoint` component) whose host is computed via
//! [`crate::host`].

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "functionController";
const LABEL_SELECTOR: &str = "app=whisk-function-controller";

pub struct FunctionController;

#[async_trait]
impl ComponentController for FunctionController {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["documentDB", "messageLog", "objectStore"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let document_db_host = ctx.config.get_string("document_db_host").unwrap_or_default();
        let message_log_url = ctx.config.get_string("message_log_url").unwrap_or_default();

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("document_db_host", &document_db_host)
            .set("message_log_url", &message_log_url)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("function-controller.yaml", &data)?;
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
        let manifests = ctx.renderer.render_manifest_list("function-controller.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
