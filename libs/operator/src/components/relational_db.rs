//! Relational database (§4.4): a primary/replica pair with an optional
//! backup CronJob. Per-tenant provisioning creates a database and user;
//! quota enforcement revokes write privileges schema-by-schema and grants
//! read-only, then reverses the operation once usage drops (§4.6).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::{component_labels, PodRef};
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "relationalDB";
const LABEL_SELECTOR: &str = "app=whisk-relational-db,role=primary";

pub struct RelationalDb;

#[async_trait]
impl ComponentController for RelationalDb {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("relational-db.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(&ctx.adapter_client(), &namespace, LABEL_SELECTOR, wait::default_deadline())
            .await?;

        ctx.config.record_endpoint("postgres_host", format!("{}-relational-db", whisk.name_any()))?;
        ctx.config.record_endpoint("postgres_port", "5432")?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("relational-db.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

fn primary_pod(namespace: &str) -> PodRef {
    PodRef {
        namespace: namespace.to_owned(),
        name: "relational-db-0".to_owned(),
        container: None,
    }
}

pub async fn create_tenant_database(ctx: &ComponentContext, namespace: &str, database: &str, password: &str) -> Result<()> {
    let script = format!(
        "psql -c \"CREATE USER {database} WITH PASSWORD '{password}';\" -c \"CREATE DATABASE {database} OWNER {database};\"\n"
    );
    ctx.adapter.run_in_pod(&primary_pod(namespace), &script, "sh").await.map(drop)
}

pub async fn drop_tenant_database(ctx: &ComponentContext, namespace: &str, database: &str) -> Result<()> {
    let script = format!("psql -c \"DROP DATABASE IF EXISTS {database};\" -c \"DROP USER IF EXISTS {database};\"\n");
    ctx.adapter.run_in_pod(&primary_pod(namespace), &script, "sh").await.map(drop)
}

/// Current on-disk size of a tenant's database, in bytes — the quantity
/// the quota checker compares against the declared MB limit (§4.6).
pub async fn database_size_bytes(ctx: &ComponentContext, namespace: &str, database: &str) -> Result<u64> {
    let script = format!("psql -tAc \"SELECT pg_database_size('{database}');\"\n");
    let output = ctx.adapter.run_in_pod(&primary_pod(namespace), &script, "sh").await?;
    Ok(output.trim().parse().unwrap_or(0))
}

/// Revokes `INSERT`/`UPDATE`/`DELETE` on every table in the schema,
/// leaving `SELECT`.
pub async fn revoke_write(ctx: &ComponentContext, namespace: &str, database: &str) -> Result<()> {
    let script = format!(
        "psql -d {database} -c \"REVOKE INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public FROM {database};\"\n"
    );
    ctx.adapter.run_in_pod(&primary_pod(namespace), &script, "sh").await.map(drop)
}

/// Restores full DML privileges.
pub async fn restore_write(ctx: &ComponentContext, namespace: &str, database: &str) -> Result<()> {
    let script = format!(
        "psql -d {database} -c \"GRANT INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {database};\"\n"
    );
    ctx.adapter.run_in_pod(&primary_pod(namespace), &script, "sh").await.map(drop)
}
