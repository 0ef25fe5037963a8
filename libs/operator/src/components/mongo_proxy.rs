//! MongoDB-compatibility proxy (§4.4): fronts the relational database with
//! a wire-protocol translator. Quota enforcement on its backing database
//! uses a separate annotation (`ferret_db_quota_reached`) from the
//! relational DB's own (§4.6 rule 2).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "mongoProxy";
const LABEL_SELECTOR: &str = "app=whisk-mongo-proxy";

pub struct MongoProxy;

#[async_trait]
impl ComponentController for MongoProxy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["relationalDB"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let postgres_host = ctx.config.require_string(
            "postgres_host",
            "mongoProxy requires the relationalDB component to have reported its endpoint",
        )?;

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("postgres_host", &postgres_host)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("mongo-proxy.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;

        ctx.config.record_endpoint("mongodb_url", format!("mongodb://{}-mongo-proxy:27017", whisk.name_any()))?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("mongo-proxy.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}
