//! Static gateway (§4.4): an Nginx Deployment reverse-proxying a bucket of
//! the object store as `/<bucket>/…`. Produces two ingress records
//! (`apihost`, `www.apihost`, unless the host already starts with `www.`
//! or the runtime is `kind`); per-tenant subdomains rewrite `/` to
//! `/<tenant-bucket>/`. On `openshift` the ingress is replaced by a Route
//! with equivalent semantics.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use serde_json::json;

use crate::components::{ComponentContext, ComponentController};
use crate::crd::whisk::{RuntimeFlavor, Whisk};
use crate::error::Result;
use crate::host;
use crate::k8s::adapter::component_labels;
use crate::k8s::wait;
use crate::template::patch::{self, Patch};
use crate::template::TemplateData;

const NAME: &str = "staticGateway";
const LABEL_SELECTOR: &str = "app=whisk-static-gateway";

pub struct StaticGateway;

#[async_trait]
impl ComponentController for StaticGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["objectStore"]
    }

    async fn create(&self, ctx: &ComponentContext, whisk: &Whisk, owner: &OwnerReference) -> Result<()> {
        let namespace = whisk.metadata.namespace.clone().unwrap_or_default();
        let apihost = ctx.config.require_string("apihost", "staticGateway requires a resolved apihost")?;
        let hosts = self.ingress_hosts(&apihost, &whisk.spec.runtime);
        let use_route = whisk.spec.runtime == RuntimeFlavor::Openshift;

        let data = TemplateData::new()
            .set("name", whisk.name_any())
            .set("namespace", namespace.clone())
            .set("hosts", &hosts)
            .set("use_route", use_route)
            .set("labels", component_labels(&whisk.name_any(), NAME));
        let template = if use_route { "static-gateway-route.yaml" } else { "static-gateway.yaml" };
        let manifests = ctx.renderer.render_manifest_list(template, &data)?;
        let manifests = if use_route {
            manifests
        } else {
            patch::apply(manifests, &self.ingress_class_patches(whisk))
        };
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
        let manifests = ctx.renderer.render_manifest_list("static-gateway.yaml", &data)?;
        ctx.adapter.delete(&manifests).await
    }
}

impl StaticGateway {
    /// One or two hosts: `apihost` always, plus `www.apihost` unless
    /// `apihost` already carries the prefix or the runtime is `kind`.
    fn ingress_hosts(&self, apihost: &str, runtime: &RuntimeFlavor) -> Vec<String> {
        let mut hosts = vec![apihost.to_owned()];
        let (hostname, _) = host::split_hostname_port(apihost);
        if !hostname.starts_with("www.") && *runtime != RuntimeFlavor::Kind {
            hosts.push(host::append_prefix_to_url("www.", apihost));
        }
        hosts
    }

    /// Per-tenant subdomain host and its bucket-rewrite target, e.g.
    /// `alice.example.com` rewriting `/` to `/alice-web/`.
    pub fn tenant_host(&self, apihost: &str, tenant_namespace: &str) -> String {
        format!("{tenant_namespace}.{apihost}")
    }

    /// The runtime-specific "kustomization": the base Ingress template
    /// carries no `ingressClassName`, so each runtime's class (§4.5,
    /// `RuntimeFlavor::ingress_class`) is layered on as an overlay rather
    /// than templated in directly, the way `shipcat` applies
    /// environment-specific overrides over a common base manifest.
    fn ingress_class_patches(&self, whisk: &Whisk) -> Vec<Patch> {
        vec![Patch {
            target_kind: "Ingress".to_owned(),
            target_name: format!("{}-static-gateway", whisk.name_any()),
            merge: json!({"spec": {"ingressClassName": whisk.spec.runtime.ingress_class()}}),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_www_variant_by_default() {
        let gateway = StaticGateway;
        let hosts = gateway.ingress_hosts("example.com", &RuntimeFlavor::Generic);
        assert_eq!(hosts, vec!["example.com", "www.example.com"]);
    }

    #[test]
    fn skips_www_variant_when_already_prefixed() {
        let gateway = StaticGateway;
        let hosts = gateway.ingress_hosts("www.example.com", &RuntimeFlavor::Generic);
        assert_eq!(hosts, vec!["www.example.com"]);
    }

    #[test]
    fn skips_www_variant_on_kind() {
        let gateway = StaticGateway;
        let hosts = gateway.ingress_hosts("example.com", &RuntimeFlavor::Kind);
        assert_eq!(hosts, vec!["example.com"]);
    }

    #[test]
    fn tenant_host_is_a_subdomain() {
        let gateway = StaticGateway;
        assert_eq!(gateway.tenant_host("example.com", "alice"), "alice.example.com");
    }

    #[test]
    fn ingress_class_patch_targets_the_rendered_ingress_by_name() {
        let gateway = StaticGateway;
        let mut whisk = Whisk::default();
        whisk.metadata.name = Some("demo".to_owned());
        whisk.spec.runtime = RuntimeFlavor::Microk8s;

        let patches = gateway.ingress_class_patches(&whisk);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].target_kind, "Ingress");
        assert_eq!(patches[0].target_name, "demo-static-gateway");
        assert_eq!(patches[0].merge["spec"]["ingressClassName"], "public");
    }

    #[test]
    fn ingress_class_patch_applies_onto_the_rendered_manifest() {
        let gateway = StaticGateway;
        let mut whisk = Whisk::default();
        whisk.metadata.name = Some("demo".to_owned());
        whisk.spec.runtime = RuntimeFlavor::K3s;

        let base = vec![serde_json::json!({
            "kind": "Ingress",
            "metadata": {"name": "demo-static-gateway"},
            "spec": {"rules": []},
        })];
        let patched = patch::apply(base, &gateway.ingress_class_patches(&whisk));
        assert_eq!(patched[0]["spec"]["ingressClassName"], "traefik");
    }
}
