//! Kubernetes adapter: the single point through which the reconciliation
//! layer touches the cluster (§4.1). Everything above this module talks to
//! [`KubeAdapter`], never to `kube::Client` directly.

pub mod adapter;
pub mod wait;

pub use adapter::KubeAdapter;
