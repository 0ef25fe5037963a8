use std::collections::BTreeMap;
use std::sync::OnceLock;

use kube::CustomResource;
use regex::Regex;
#[cfg(feature = "schemars")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The `WhiskUser` custom resource declares one tenant onto a `Whisk`
/// platform: which subsystems it needs provisioned (object storage,
/// relational/document/vector databases, cache namespace) and the quota
/// each is allowed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[kube(
    group = "nuvolaris.org",
    version = "v1",
    kind = "WhiskUser",
    plural = "whiskusers",
    singular = "whiskuser",
    shortname = "wsku",
    namespaced,
    status = "WhiskUserStatus",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".spec.namespace"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct WhiskUserSpec {
    /// Tenant namespace: lowercase alphanumerics and `-`, 5-63 characters,
    /// must not start or end with `-`.
    pub namespace: String,

    /// Credential string of the form `uuid:key`, where `uuid` is a valid
    /// UUIDv4 and `key` is at least 64 characters.
    pub auth: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_storage: Option<ObjectStorageTenantSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongodb: Option<TenantDbSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<TenantDbSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<TenantCacheSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_db: Option<TenantDbSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageTenantSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub data: BucketFlag,
    #[serde(default)]
    pub route: BucketFlag,
    #[serde(default)]
    pub quota: Quota,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct BucketFlag {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TenantDbSpec {
    #[serde(default)]
    pub enabled: bool,
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub quota: Quota,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct TenantCacheSpec {
    #[serde(default)]
    pub enabled: bool,
    pub prefix: String,
    #[serde(default)]
    pub quota: Quota,
}

/// Either the literal `"auto"` or a positive number of megabytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(untagged)]
pub enum Quota {
    Auto(QuotaAuto),
    Mb(u64),
}

/// Marker matching only the literal string `"auto"`, used so [`Quota`]'s
/// untagged deserialization can distinguish it from an arbitrary string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(try_from = "String", into = "String")]
pub struct QuotaAuto;

impl TryFrom<String> for QuotaAuto {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value == "auto" {
            Ok(QuotaAuto)
        } else {
            Err(format!("expected the literal \"auto\", got {value:?}"))
        }
    }
}

impl From<QuotaAuto> for String {
    fn from(_: QuotaAuto) -> Self {
        "auto".to_owned()
    }
}

impl Default for Quota {
    fn default() -> Self {
        Quota::Auto(QuotaAuto)
    }
}

impl Quota {
    /// Resolves to a concrete byte count, given the platform's auto-sizing
    /// default for this subsystem.
    pub fn resolve_bytes(&self, auto_default_mb: u64) -> u64 {
        match self {
            Quota::Auto(_) => auto_default_mb * 1024 * 1024,
            Quota::Mb(mb) => mb * 1024 * 1024,
        }
    }
}

fn namespace_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9](?:[a-z0-9]{0,61}[a-z0-9])?$").unwrap())
}

fn uuid_v4_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$",
        )
        .unwrap()
    })
}

impl WhiskUserSpec {
    /// Validates the tenant namespace and credential invariants from §3:
    /// namespace is 5-63 lowercase alphanumeric characters (no hyphens), and
    /// `auth` is `<uuidv4>:<key of at least 64 chars>`.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.len() < 5 || self.namespace.len() > 63 {
            return Err(Error::ValidationError(format!(
                "namespace {:?} must be 5-63 characters",
                self.namespace
            )));
        }
        if !namespace_pattern().is_match(&self.namespace) {
            return Err(Error::ValidationError(format!(
                "namespace {:?} must be lowercase alphanumerics only",
                self.namespace
            )));
        }

        let (uuid, key) = self.auth.split_once(':').ok_or_else(|| {
            Error::ValidationError("auth must be of the form <uuid>:<key>".to_owned())
        })?;
        if !uuid_v4_pattern().is_match(&uuid.to_lowercase()) {
            return Err(Error::ValidationError(format!(
                "auth uuid {uuid:?} is not a valid UUIDv4"
            )));
        }
        if key.len() < 64 {
            return Err(Error::ValidationError(
                "auth key must be at least 64 characters".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Per-subsystem provisioning outcome, keyed by subsystem name
/// (`objectStorage`, `mongodb`, `postgres`, `redis`, `vectorDb`). One
/// `Result` per subsystem so a failure in one does not block the others
/// (record-and-continue, see DESIGN.md).
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[cfg_attr(feature = "schemars", derive(JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct WhiskUserStatus {
    #[serde(default)]
    pub subsystems: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(namespace: &str, auth: &str) -> WhiskUserSpec {
        WhiskUserSpec {
            namespace: namespace.to_owned(),
            auth: auth.to_owned(),
            ..Default::default()
        }
    }

    const VALID_UUID: &str = "9b1deb4d-3b7d-4bad-9bdd-2b0d7b3dcb6d";

    fn key_of_len(n: usize) -> String {
        "a".repeat(n)
    }

    #[test]
    fn namespace_of_four_chars_is_rejected() {
        let s = spec("abcd", &format!("{VALID_UUID}:{}", key_of_len(64)));
        assert!(s.validate().is_err());
    }

    #[test]
    fn namespace_of_five_chars_is_accepted() {
        let s = spec("abcde", &format!("{VALID_UUID}:{}", key_of_len(64)));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn namespace_rejects_leading_dash() {
        let s = spec("-abcde", &format!("{VALID_UUID}:{}", key_of_len(64)));
        assert!(s.validate().is_err());
    }

    #[test]
    fn namespace_rejects_interior_dash() {
        let s = spec("ab-cde", &format!("{VALID_UUID}:{}", key_of_len(64)));
        assert!(s.validate().is_err());
    }

    #[test]
    fn key_of_63_chars_is_rejected() {
        let s = spec("abcde", &format!("{VALID_UUID}:{}", key_of_len(63)));
        assert!(s.validate().is_err());
    }

    #[test]
    fn key_of_64_chars_is_accepted() {
        let s = spec("abcde", &format!("{VALID_UUID}:{}", key_of_len(64)));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn non_v4_uuid_is_rejected() {
        let s = spec(
            "abcde",
            &format!("00000000-0000-1000-8000-000000000000:{}", key_of_len(64)),
        );
        assert!(s.validate().is_err());
    }

    #[test]
    fn quota_parses_auto_literal() {
        let q: Quota = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(q, Quota::Auto(QuotaAuto));
    }

    #[test]
    fn quota_parses_integer_megabytes() {
        let q: Quota = serde_json::from_str("500").unwrap();
        assert_eq!(q, Quota::Mb(500));
        assert_eq!(q.resolve_bytes(100), 500 * 1024 * 1024);
    }

    #[test]
    fn quota_rejects_other_strings() {
        let result: std::result::Result<Quota, _> = serde_json::from_str("\"unlimited\"");
        assert!(result.is_err());
    }
}
