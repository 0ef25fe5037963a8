//! The built-in manifest template catalog.
//!
//! Manifest authoring itself is out of scope (templates are inputs, not a
//! reconciliation concern): these are the stand-in bodies the operator
//! ships with, grounded on the `tera`-based "named template + data
//! dictionary" shape the template layer exposes. A real deployment swaps
//! this catalog out (e.g. loaded from a mounted ConfigMap) without
//! touching [`crate::template::Renderer`] itself.

/// A Deployment + Service pair selected by `app={{ app_label }}`, the same
/// selector string each component module's own `LABEL_SELECTOR` constant
/// waits on.
fn deployment_and_service(app_label: &str, extra_pod_label: Option<&str>) -> String {
    let extra_label_line = extra_pod_label.map(|l| format!("        {l}\n")).unwrap_or_default();
    format!(
        r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{{{ name }}}}-{app_label}
  namespace: {{{{ namespace }}}}
  labels:
{{% for k, v in labels %}}    {{{{ k }}}}: {{{{ v }}}}
{{% endfor %}}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {app_label}
  template:
    metadata:
      labels:
        app: {app_label}
{extra_label_line}{{% for k, v in labels %}}        {{{{ k }}}}: {{{{ v }}}}
{{% endfor %}}
    spec:
      containers:
        - name: {app_label}
          image: "{{{{ image | default(value="ghcr.io/nuvolaris/{app_label}") }}}}:{{{{ tag | default(value="latest") }}}}"
---
apiVersion: v1
kind: Service
metadata:
  name: {{{{ name }}}}-{app_label}
  namespace: {{{{ namespace }}}}
  labels:
{{% for k, v in labels %}}    {{{{ k }}}}: {{{{ v }}}}
{{% endfor %}}
spec:
  selector:
    app: {app_label}
  ports:
    - port: {{{{ port | default(value=8080) }}}}
"#
    )
}

const INGRESS: &str = r#"
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: {{ name }}-static-gateway
  namespace: {{ namespace }}
  labels:
{% for k, v in labels %}    {{ k }}: {{ v }}
{% endfor %}
spec:
  rules:
{% for h in hosts %}    - host: {{ h }}
      http:
        paths:
          - path: /
            pathType: Prefix
            backend:
              service:
                name: {{ name }}-static-gateway
                port:
                  number: 8080
{% endfor %}
"#;

const ROUTE: &str = r#"
apiVersion: route.openshift.io/v1
kind: Route
metadata:
  name: {{ name }}-static-gateway
  namespace: {{ namespace }}
  labels:
{% for k, v in labels %}    {{ k }}: {{ v }}
{% endfor %}
spec:
  host: {{ hosts.0 }}
  to:
    kind: Service
    name: {{ name }}-static-gateway
"#;

const QUOTA_ENFORCER: &str = r#"
apiVersion: batch/v1
kind: CronJob
metadata:
  name: {{ name }}-quota-enforcer
  namespace: {{ namespace }}
  labels:
{% for k, v in labels %}    {{ k }}: {{ v }}
{% endfor %}
spec:
  schedule: "{{ schedule }}"
  jobTemplate:
    spec:
      template:
        spec:
          restartPolicy: OnFailure
          containers:
            - name: quota-tick
              image: "{{ image }}"
              args: ["quota-tick"]
"#;

const MONITORING: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ name }}-prometheus
  namespace: {{ namespace }}
  labels:
{% for k, v in labels %}    {{ k }}: {{ v }}
{% endfor %}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: whisk-prometheus
  template:
    metadata:
      labels:
        app: whisk-prometheus
    spec:
      containers:
        - name: prometheus
          image: "prom/prometheus:latest"
{% if alertmanager %}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{ name }}-alertmanager
  namespace: {{ namespace }}
  labels:
{% for k, v in labels %}    {{ k }}: {{ v }}
{% endfor %}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: whisk-alertmanager
  template:
    metadata:
      labels:
        app: whisk-alertmanager
    spec:
      containers:
        - name: alertmanager
          image: "prom/alertmanager:latest"
{% endif %}
"#;

const DESIGN_DOCS: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ name }}-document-db-design-docs
  namespace: {{ namespace }}
data:
  placeholder: "design documents are pushed via run_in_pod, not applied as manifests"
"#;

/// Leaks a `String` to `'static` for the one-time startup catalog build,
/// mirroring [`crate::template::Renderer`]'s "built once, shared read-only
/// afterward" lifecycle.
fn leak(s: String) -> &'static str {
    Box::leak(s.into_boxed_str())
}

/// The full `(name, source)` catalog handed to [`crate::template::Renderer::new`].
pub fn catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("document-db.yaml", leak(deployment_and_service("whisk-document-db", None))),
        ("document-db-design-docs.yaml", DESIGN_DOCS),
        ("object-store.yaml", leak(deployment_and_service("whisk-object-store", None))),
        ("cache.yaml", leak(deployment_and_service("whisk-cache", None))),
        ("coordinator.yaml", leak(deployment_and_service("whisk-coordinator", None))),
        ("registry.yaml", leak(deployment_and_service("whisk-registry", None))),
        ("message-log.yaml", leak(deployment_and_service("whisk-message-log", None))),
        (
            "relational-db.yaml",
            leak(deployment_and_service("whisk-relational-db", Some("role: primary"))),
        ),
        ("mongo-proxy.yaml", leak(deployment_and_service("whisk-mongo-proxy", None))),
        ("invoker.yaml", leak(deployment_and_service("whisk-invoker", None))),
        (
            "function-controller.yaml",
            leak(deployment_and_service("whisk-function-controller", None)),
        ),
        ("static-gateway.yaml", INGRESS),
        ("static-gateway-route.yaml", ROUTE),
        (
            "vector-db-coordinator.yaml",
            leak(deployment_and_service("whisk-vector-db-coordinator", None)),
        ),
        ("vector-db.yaml", leak(deployment_and_service("whisk-vector-db", None))),
        ("quota-enforcer.yaml", QUOTA_ENFORCER),
        ("monitoring.yaml", MONITORING),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Renderer, TemplateData};

    #[test]
    fn every_cataloged_template_compiles() {
        Renderer::new(&catalog()).expect("catalog templates are valid tera sources");
    }

    #[test]
    fn deployment_template_renders_with_minimal_data() {
        let renderer = Renderer::new(&catalog()).unwrap();
        let data = TemplateData::new()
            .set("name", "demo")
            .set("namespace", "demo-ns")
            .set("labels", std::collections::BTreeMap::<String, String>::new());
        let manifests = renderer.render_manifest_list("cache.yaml", &data).unwrap();
        assert_eq!(manifests.len(), 2);
    }

    #[test]
    fn relational_db_template_carries_the_primary_role_label() {
        let renderer = Renderer::new(&catalog()).unwrap();
        let data = TemplateData::new()
            .set("name", "demo")
            .set("namespace", "demo-ns")
            .set("labels", std::collections::BTreeMap::<String, String>::new());
        let yaml = renderer.render_yaml("relational-db.yaml", &data).unwrap();
        assert!(yaml.contains("role: primary"));
    }
}
