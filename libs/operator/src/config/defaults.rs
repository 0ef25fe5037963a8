//! Built-in defaults for the configuration store, merged in before the
//! `PlatformDeclaration` and environment overrides (§2's "typed defaults").

use config::{Config, ConfigError, File, FileFormat};

const DEFAULTS_TOML: &str = r#"
[operator]
image = "ghcr.io/nuvolaris/whisk-operator"
tag = "latest"

[quota]
schedule = "*/10 * * * *"
max_backoff_seconds = 120

[document_db]
image = "ghcr.io/nuvolaris/whisk-documentdb"
tag = "latest"
replicas = 1
storage_size = "2Gi"

[cache]
image = "ghcr.io/nuvolaris/whisk-cache"
tag = "latest"
default_quota_mb = 100

[object_store]
provider = "minio"
image = "ghcr.io/nuvolaris/whisk-objectstore"
tag = "latest"
default_quota_mb = 100

[relational_db]
image = "ghcr.io/nuvolaris/whisk-relationaldb"
tag = "latest"
default_quota_mb = 100

[vector_db]
image = "ghcr.io/nuvolaris/whisk-vectordb"
tag = "latest"
admin_database = "nuvolaris"
privilege_set = "v2"

[registry]
mode = "internal"
image = "ghcr.io/nuvolaris/whisk-registry"
tag = "latest"

[wait]
deadline_seconds = 120
"#;

/// Seeds a [`config::Config`] builder with the built-in defaults. Callers
/// layer the `PlatformDeclaration` and environment overrides on top.
pub fn seed() -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(File::from_str(DEFAULTS_TOML, FileFormat::Toml))
        .build()
}
