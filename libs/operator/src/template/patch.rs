//! Strategic-merge-style patch composer: applies a sequence of JSON merge
//! patches over a base manifest set ("kustomization", §2.2b).

use serde_json::Value;

/// One named overlay to fold onto a base manifest.
#[derive(Clone, Debug)]
pub struct Patch {
    pub target_kind: String,
    pub target_name: String,
    pub merge: Value,
}

/// Applies `patches` to `base` in order, matching each patch to manifests
/// by `(kind, metadata.name)`. Unmatched patches are a no-op, mirroring
/// strategic-merge's tolerance of absent targets.
pub fn apply(base: Vec<Value>, patches: &[Patch]) -> Vec<Value> {
    base.into_iter()
        .map(|manifest| {
            let mut manifest = manifest;
            for patch in patches {
                if matches(&manifest, patch) {
                    merge(&mut manifest, &patch.merge);
                }
            }
            manifest
        })
        .collect()
}

fn matches(manifest: &Value, patch: &Patch) -> bool {
    manifest.get("kind").and_then(Value::as_str) == Some(patch.target_kind.as_str())
        && manifest
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            == Some(patch.target_name.as_str())
}

/// Recursive merge: objects merge key-wise, everything else (including
/// arrays) is replaced wholesale by the patch value, matching the
/// strategic-merge default for fields without a patch-merge-key.
fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                merge(base_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_matching_manifest_only() {
        let base = vec![
            json!({"kind": "Deployment", "metadata": {"name": "a"}, "spec": {"replicas": 1}}),
            json!({"kind": "Deployment", "metadata": {"name": "b"}, "spec": {"replicas": 1}}),
        ];
        let patches = vec![Patch {
            target_kind: "Deployment".into(),
            target_name: "a".into(),
            merge: json!({"spec": {"replicas": 3}}),
        }];
        let patched = apply(base, &patches);
        assert_eq!(patched[0]["spec"]["replicas"], 3);
        assert_eq!(patched[1]["spec"]["replicas"], 1);
    }

    #[test]
    fn unmatched_patch_is_noop() {
        let base = vec![json!({"kind": "Service", "metadata": {"name": "a"}})];
        let patches = vec![Patch {
            target_kind: "Deployment".into(),
            target_name: "a".into(),
            merge: json!({"spec": {"replicas": 3}}),
        }];
        let patched = apply(base.clone(), &patches);
        assert_eq!(patched, base);
    }
}
