//! Diff engine (§4.3): classifies field changes between the previous and
//! new desired state into a per-component action.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crd::whisk::COMPONENT_ORDER;

/// One field-level change, as produced by comparing two JSON trees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub op: ChangeOp,
    pub path: Vec<String>,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOp {
    Add,
    Change,
    Remove,
}

/// The per-component outcome the reconciliation layer acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// Pseudo-component carrying ingress-only changes (§4.3), so ingresses can
/// be re-reconciled without restarting the underlying workload.
pub const INGRESSES_SUFFIX: &str = "-ingresses";

const INGRESS_FIELDS: &[&str] = &["ingress", "hostname", "enabled"];

/// Computes a raw, unordered `change` list between two JSON trees by
/// walking both in lock-step. Used by callers that only have the raw
/// `Whisk.spec` values rather than a change list already supplied by the
/// framework (e.g. tests, or a `kube::runtime` watcher without a diff
/// stream of its own).
pub fn diff_values(old: &Value, new: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk(&[], old, new, &mut changes);
    changes
}

fn walk(path: &[String], old: &Value, new: &Value, out: &mut Vec<FieldChange>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, new_value) in new_map {
                let mut next_path = path.to_vec();
                next_path.push(key.clone());
                match old_map.get(key) {
                    Some(old_value) if old_value != new_value => {
                        walk(&next_path, old_value, new_value, out);
                    }
                    None => out.push(FieldChange {
                        op: ChangeOp::Add,
                        path: next_path,
                        old: None,
                        new: Some(new_value.clone()),
                    }),
                    _ => {}
                }
            }
            for (key, old_value) in old_map {
                if !new_map.contains_key(key) {
                    let mut next_path = path.to_vec();
                    next_path.push(key.clone());
                    out.push(FieldChange {
                        op: ChangeOp::Remove,
                        path: next_path,
                        old: Some(old_value.clone()),
                        new: None,
                    });
                }
            }
        }
        _ if old != new => out.push(FieldChange {
            op: ChangeOp::Change,
            path: path.to_vec(),
            old: Some(old.clone()),
            new: Some(new.clone()),
        }),
        _ => {}
    }
}

/// Maps a change list to `component → action`. Implements:
/// - a component flag flipping `false → true` (or a field added under a
///   previously-off subtree) ⇒ `create`;
/// - a flag flipping `true → false` (or removal) ⇒ `delete`;
/// - any other change under an enabled component's subtree ⇒ `update`;
/// - ingress-related fields produce the `*-ingresses` pseudo-component;
/// - a change to `apiHost`/`protocol` implies `update` on `apiEndpoint`,
///   `staticGateway` and all `*-ingresses`;
/// - ties resolve with `delete` winning over `update`.
pub fn classify(changes: &[FieldChange], components_enabled: &BTreeMap<String, bool>) -> BTreeMap<String, Action> {
    let mut actions: BTreeMap<String, Action> = BTreeMap::new();

    let mut set_action = |actions: &mut BTreeMap<String, Action>, component: String, action: Action| {
        match actions.get(&component) {
            Some(Action::Delete) => {}
            Some(Action::Update) if action == Action::Delete => {
                actions.insert(component, Action::Delete);
            }
            Some(_) => {}
            None => {
                actions.insert(component, action);
            }
        }
    };

    for change in changes {
        let Some(root) = change.path.first() else { continue };

        if root == "components" {
            if let Some(component_name) = change.path.get(1) {
                let component = camel_case(component_name);
                let enabling = matches!(change.new.as_ref().and_then(Value::as_bool), Some(true));
                let disabling = matches!(change.op, ChangeOp::Remove)
                    || matches!(change.new.as_ref().and_then(Value::as_bool), Some(false));
                if enabling {
                    set_action(&mut actions, component, Action::Create);
                } else if disabling {
                    set_action(&mut actions, component, Action::Delete);
                }
            }
            continue;
        }

        if root == "api_host" || root == "apiHost" || root == "protocol" {
            for component in ["apiEndpoint", "staticGateway"] {
                if *components_enabled.get(component).unwrap_or(&false) {
                    set_action(&mut actions, component.to_owned(), Action::Update);
                }
            }
            for (component, enabled) in components_enabled {
                if *enabled {
                    set_action(&mut actions, format!("{component}{INGRESSES_SUFFIX}"), Action::Update);
                }
            }
            continue;
        }

        let component = camel_case(root);
        if !components_enabled.get(&component).copied().unwrap_or(false) {
            continue;
        }
        let is_ingress_change = change
            .path
            .iter()
            .any(|segment| INGRESS_FIELDS.contains(&segment.as_str()));
        if is_ingress_change {
            set_action(&mut actions, format!("{component}{INGRESSES_SUFFIX}"), Action::Update);
        } else {
            set_action(&mut actions, component, Action::Update);
        }
    }

    actions
}

/// Maps a snake_case field name to its component name. Tries an exact
/// match against [`COMPONENT_ORDER`] first (case- and underscore-
/// insensitive) so acronym components like `document_db` resolve to
/// `documentDB` rather than the mechanical `documentDb` a naive camel-case
/// would produce; falls back to mechanical camel-casing for anything not
/// in the table (ingress pseudo-components, unknown fields).
fn camel_case(snake: &str) -> String {
    let normalized: String = snake.chars().filter(|c| *c != '_').collect();
    if let Some(&component) = COMPONENT_ORDER
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(&normalized))
    {
        return component.to_owned();
    }
    mechanical_camel_case(snake)
}

fn mechanical_camel_case(snake: &str) -> String {
    let mut out = String::new();
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Creation order follows [`COMPONENT_ORDER`] (leaves first); deletion
/// order is its reverse (§4.2).
pub fn ordered_components(actions: &BTreeMap<String, Action>, action: Action) -> Vec<String> {
    let mut ordered: Vec<String> = COMPONENT_ORDER
        .iter()
        .map(|s| s.to_string())
        .filter(|c| actions.get(c) == Some(&action))
        .collect();
    if action == Action::Delete {
        ordered.reverse();
    }
    let mut extra: Vec<String> = actions
        .iter()
        .filter(|(c, a)| **a == action && c.ends_with(INGRESSES_SUFFIX))
        .map(|(c, _)| c.clone())
        .collect();
    extra.sort();
    ordered.extend(extra);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enabled(components: &[(&str, bool)]) -> BTreeMap<String, bool> {
        components.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn acronym_component_names_resolve_against_component_order() {
        let old = json!({"components": {"document_db": false}});
        let new = json!({"components": {"document_db": true}});
        let changes = diff_values(&old, &new);
        let actions = classify(&changes, &enabled(&[("documentDB", true)]));
        assert_eq!(actions.get("documentDB"), Some(&Action::Create));
    }

    #[test]
    fn flag_flip_to_true_is_create() {
        let old = json!({"components": {"cache": false}});
        let new = json!({"components": {"cache": true}});
        let changes = diff_values(&old, &new);
        let actions = classify(&changes, &enabled(&[("cache", true)]));
        assert_eq!(actions.get("cache"), Some(&Action::Create));
    }

    #[test]
    fn flag_flip_to_false_is_delete() {
        let old = json!({"components": {"cache": true}});
        let new = json!({"components": {"cache": false}});
        let changes = diff_values(&old, &new);
        let actions = classify(&changes, &enabled(&[("cache", false)]));
        assert_eq!(actions.get("cache"), Some(&Action::Delete));
    }

    #[test]
    fn unrelated_field_change_is_update() {
        let old = json!({"cache": {"replicas": 1}});
        let new = json!({"cache": {"replicas": 2}});
        let changes = diff_values(&old, &new);
        let actions = classify(&changes, &enabled(&[("cache", true)]));
        assert_eq!(actions.get("cache"), Some(&Action::Update));
    }

    #[test]
    fn ingress_field_change_produces_pseudo_component() {
        let old = json!({"cache": {"ingress": {"enabled": false}}});
        let new = json!({"cache": {"ingress": {"enabled": true}}});
        let changes = diff_values(&old, &new);
        let actions = classify(&changes, &enabled(&[("cache", true)]));
        assert_eq!(actions.get("cache-ingresses"), Some(&Action::Update));
        assert!(!actions.contains_key("cache"));
    }

    #[test]
    fn api_host_change_cascades_to_endpoint_and_gateway() {
        let old = json!({"apiHost": "auto"});
        let new = json!({"apiHost": "example.com"});
        let changes = diff_values(&old, &new);
        let actions = classify(
            &changes,
            &enabled(&[("apiEndpoint", true), ("staticGateway", true), ("cache", true)]),
        );
        assert_eq!(actions.get("apiEndpoint"), Some(&Action::Update));
        assert_eq!(actions.get("staticGateway"), Some(&Action::Update));
        assert_eq!(actions.get("cache-ingresses"), Some(&Action::Update));
    }

    #[test]
    fn delete_wins_over_update_on_the_same_component() {
        let mut actions = BTreeMap::new();
        let mut set = |c: &str, a: Action| {
            match actions.get(c) {
                Some(Action::Delete) => {}
                Some(Action::Update) if a == Action::Delete => {
                    actions.insert(c.to_owned(), Action::Delete);
                }
                Some(_) => {}
                None => {
                    actions.insert(c.to_owned(), a);
                }
            }
        };
        set("cache", Action::Update);
        set("cache", Action::Delete);
        assert_eq!(actions.get("cache"), Some(&Action::Delete));
    }

    #[test]
    fn apply_then_apply_same_declaration_is_noop() {
        let value = json!({"components": {"cache": true}, "cache": {"replicas": 1}});
        let changes = diff_values(&value, &value);
        assert!(changes.is_empty());
    }

    #[test]
    fn create_order_respects_dag() {
        let actions = BTreeMap::from([
            ("invoker".to_owned(), Action::Create),
            ("documentDB".to_owned(), Action::Create),
            ("messageLog".to_owned(), Action::Create),
        ]);
        let ordered = ordered_components(&actions, Action::Create);
        assert_eq!(ordered, vec!["documentDB", "messageLog", "invoker"]);
    }

    #[test]
    fn delete_order_is_reversed() {
        let actions = BTreeMap::from([
            ("invoker".to_owned(), Action::Delete),
            ("documentDB".to_owned(), Action::Delete),
            ("messageLog".to_owned(), Action::Delete),
        ]);
        let ordered = ordered_components(&actions, Action::Delete);
        assert_eq!(ordered, vec!["invoker", "messageLog", "documentDB"]);
    }
}
