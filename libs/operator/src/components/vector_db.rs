//! Vector database (§4.4). Requires an object-store bucket + access keys
//! and a coordinator user, both created up front and passed into the
//! vector DB's Secret objects. Post-readiness, an admin client creates the
//! platform's own database (`nuvolaris`), an admin role, and grants the
//! role the global privileges of §6. Per-tenant provisioning creates a
//! database named after the tenant namespace, a user and role, grants the
//! role the configured privilege set and assigns it to the user. Deletion
//! drops all collections in the database, then role, user, database.
//!
//! Only the "newer" database-per-tenant + role-scoped-by-`db_name`
//! variant is implemented, per the binding resolution in §9; the legacy
//! privilege-enumerated variant survives only as the `Legacy` constant
//! set below, kept because §6 requires both sets to exist as configurable
//! options even though only one variant's *architecture* is built.
//!
//! Grounded on the source's `MilvusAdminClient.setup_user`/`remove_user`.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::Result;
use crate::k8s::adapter::{component_labels, PodRef};
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "vectorDB";
const LABEL_SELECTOR: &str = "app=whisk-vector-db";
const PLATFORM_DATABASE: &str = "nuvolaris";

pub struct VectorDb;

#[async_trait]
impl ComponentController for VectorDb {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["vectorDBCoordinator", "objectStore"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("vector-db.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        // The front-end demands auth on every route and so answers 401
        // even when healthy; 401 is an accepted status alongside 200
        // (§9's readiness-observable design note).
        let host = format!("{}-vector-db.{}.svc.cluster.local", whisk.name_any(), namespace);
        wait::wait_for_http(&format!("http://{host}:19530/healthz"), &[200, 401], wait::default_deadline())
            .await?;

        let admin = AdminClient::from_config(ctx)?;
        let password: String = uuid::Uuid::new_v4().to_string();
        admin.setup_user(ctx, &namespace, "nuvolaris", &password, PLATFORM_DATABASE).await?;

        ctx.config.record_endpoint("milvus_host", host)?;
        ctx.config.record_endpoint("milvus_port", "19530")?;
        ctx.config.record_endpoint("milvus_token", format!("root:{password}"))?;
        ctx.config.record_endpoint("milvus_db_name", PLATFORM_DATABASE)?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("vector-db.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

/// `(object_type, object_name, privilege[, collection, db_name])` tuple,
/// per the glossary's "Privilege set" entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Privilege {
    pub object_type: &'static str,
    pub name: &'static str,
}

/// Legacy privilege-enumerated set (§6): kept as constants only, per the
/// frozen-variant decision in §9 — no code path issues these against a
/// live server.
pub const LEGACY_PRIVILEGES: &[Privilege] = &[
    Privilege { object_type: "Global", name: "CreateCollection" },
    Privilege { object_type: "Global", name: "DropCollection" },
    Privilege { object_type: "Global", name: "DescribeCollection" },
    Privilege { object_type: "Global", name: "ShowCollections" },
    Privilege { object_type: "Global", name: "RenameCollection" },
];

/// V2 privilege set (§6), used by the implemented database-per-tenant
/// variant.
pub const V2_PRIVILEGES: &[Privilege] = &[
    Privilege { object_type: "Global", name: "CollectionAdmin" },
    Privilege { object_type: "Global", name: "DatabaseAdmin" },
];

pub fn active_privilege_set(use_legacy: bool) -> &'static [Privilege] {
    if use_legacy {
        LEGACY_PRIVILEGES
    } else {
        V2_PRIVILEGES
    }
}

fn admin_pod(namespace: &str) -> PodRef {
    PodRef {
        namespace: namespace.to_owned(),
        name: "vector-db-0".to_owned(),
        container: None,
    }
}

/// Database-per-tenant admin client: every user gets its own database,
/// and the role granting its privileges is scoped by `db_name` rather
/// than shared globally.
pub struct AdminClient {
    privilege_set: &'static [Privilege],
}

impl AdminClient {
    pub fn from_config(ctx: &ComponentContext) -> Result<Self> {
        let legacy = ctx.config.get_string_or("vector_db.privilege_set", "v2") == "legacy";
        Ok(Self {
            privilege_set: active_privilege_set(legacy),
        })
    }

    /// Create user → create database → create role scoped to `db_name` →
    /// grant every privilege in the active set, plus the Collection `*`
    /// privilege → grant role to user.
    pub async fn setup_user(&self, ctx: &ComponentContext, namespace: &str, username: &str, password: &str, database: &str) -> Result<()> {
        let role = format!("{username}_role");
        let script = self.setup_script(username, password, database, &role);
        self.run_admin_command(ctx, namespace, &script).await
    }

    /// Drop all collections in the database → drop role → drop user →
    /// drop database.
    pub async fn remove_user(&self, ctx: &ComponentContext, namespace: &str, username: &str, database: &str) -> Result<()> {
        let role = format!("{username}_role");
        let script = format!(
            "milvus_cli drop-collections --db {database} --all\nmilvus_cli drop-role {role}\nmilvus_cli drop-user {username}\nmilvus_cli drop-database {database}\n"
        );
        self.run_admin_command(ctx, namespace, &script).await
    }

    fn setup_script(&self, username: &str, password: &str, database: &str, role: &str) -> String {
        let mut script = format!(
            "milvus_cli create-user {username} --password {password}\nmilvus_cli create-database {database}\nmilvus_cli create-role {role} --db {database}\n"
        );
        for privilege in self.privilege_set {
            script.push_str(&format!(
                "milvus_cli grant-privilege {role} --object-type {} --privilege {} --db {database}\n",
                privilege.object_type, privilege.name
            ));
        }
        script.push_str(&format!(
            "milvus_cli grant-privilege {role} --object-type Collection --object-name '*' --privilege '*' --db {database}\n"
        ));
        script.push_str(&format!("milvus_cli grant-role {username} {role}\n"));
        script
    }

    async fn run_admin_command(&self, ctx: &ComponentContext, namespace: &str, script: &str) -> Result<()> {
        ctx.adapter.run_in_pod(&admin_pod(namespace), script, "sh").await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_is_the_default_active_set() {
        assert_eq!(active_privilege_set(false), V2_PRIVILEGES);
    }

    #[test]
    fn legacy_set_has_five_global_privileges() {
        assert_eq!(LEGACY_PRIVILEGES.len(), 5);
        assert!(LEGACY_PRIVILEGES.iter().all(|p| p.object_type == "Global"));
    }

    #[test]
    fn setup_script_grants_every_privilege_and_the_collection_wildcard() {
        let admin = AdminClient { privilege_set: V2_PRIVILEGES };
        let script = admin.setup_script("alice", "secret", "alice", "alice_role");
        assert!(script.contains("CollectionAdmin"));
        assert!(script.contains("DatabaseAdmin"));
        assert!(script.contains("grant-privilege alice_role --object-type Collection --object-name '*'"));
        assert!(script.contains("grant-role alice alice_role"));
    }
}
