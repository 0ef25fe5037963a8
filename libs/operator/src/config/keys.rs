//! Well-known annotation keys written onto `cm/config` by component modules
//! and read by tenant code at invocation time (§6), plus the tenant
//! annotation keys the quota enforcer toggles (§4.6).

pub const CONFIG_MAP_NAME: &str = "config";

pub const APIHOST: &str = "apihost";

pub const S3_HOST: &str = "s3_host";
pub const S3_PORT: &str = "s3_port";
pub const S3_ACCESS_KEY: &str = "s3_access_key";
pub const S3_SECRET_KEY: &str = "s3_secret_key";
pub const S3_BUCKET_DATA: &str = "s3_bucket_data";
pub const S3_BUCKET_STATIC: &str = "s3_bucket_static";
pub const S3_PROVIDER: &str = "s3_provider";
pub const S3_API_URL: &str = "s3_api_url";
pub const S3_CONSOLE_URL: &str = "s3_console_url";
pub const MINIO_HOST: &str = "minio_host";
pub const MINIO_PORT: &str = "minio_port";
pub const MINIO_ACCESS_KEY: &str = "minio_access_key";
pub const MINIO_SECRET_KEY: &str = "minio_secret_key";

pub const MONGODB_URL: &str = "mongodb_url";

pub const POSTGRES_URL: &str = "postgres_url";
pub const POSTGRES_HOST: &str = "postgres_host";
pub const POSTGRES_PORT: &str = "postgres_port";
pub const POSTGRES_DATABASE: &str = "postgres_database";
pub const POSTGRES_USERNAME: &str = "postgres_username";
pub const POSTGRES_PASSWORD: &str = "postgres_password";

pub const REDIS_URL: &str = "redis_url";
pub const REDIS_ALT_URL: &str = "redis_alt_url";
pub const REDIS_SERVICE: &str = "redis_service";
pub const REDIS_PORT: &str = "redis_port";
pub const REDIS_PREFIX: &str = "redis_prefix";
pub const REDIS_PASSWORD: &str = "redis_password";
pub const REDIS_PROVIDER: &str = "redis_provider";

pub const MILVUS_HOST: &str = "milvus_host";
pub const MILVUS_PORT: &str = "milvus_port";
pub const MILVUS_TOKEN: &str = "milvus_token";
pub const MILVUS_DB_NAME: &str = "milvus_db_name";

pub const REGISTRY_HOST: &str = "registry_host";
pub const REGISTRY_INTERNAL_HOST: &str = "registry_internal_host";
pub const REGISTRY_USERNAME: &str = "registry_username";
pub const REGISTRY_PASSWORD: &str = "registry_password";
pub const REGISTRY_URL: &str = "registry_url";

/// Tenant-resource annotation toggled by the quota enforcer (§4.6). The
/// annotation is the single source of truth for idempotency: it is both
/// the record of "already revoked" and the trigger to restore.
pub const POSTGRES_QUOTA_REACHED: &str = "postgres_db_quota_reached";
pub const FERRET_QUOTA_REACHED: &str = "ferret_db_quota_reached";
pub const REDIS_QUOTA_REACHED: &str = "redis_db_quota_reached";

/// Label applied to every manifest owned by a `Whisk`/`WhiskUser`, keyed by
/// the component that produced it. Used by §8's "no manifest survives with
/// `component=c` when `c` is disabled" property.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "whisk-operator";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "component";

/// Annotation the reconciler stamps on a `Whisk` with the JSON form of the
/// spec it last successfully reconciled, the input to the diff engine on
/// the next event. Mirrors the `kubectl apply` last-applied-configuration
/// convention.
pub const LAST_APPLIED_SPEC: &str = "nuvolaris.org/last-applied-spec";
