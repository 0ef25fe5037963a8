//! Readiness waits, all attached to an observable rather than a wall-clock
//! sleep (§9): pod phase, an HTTP probe with an allowed-status set, or a
//! custom resource's `.status.phase`. Each implements the truncated
//! exponential backoff of §5: `delay = min(2^n + rand(0,1), maxBackoff)`,
//! aborting past a deadline and reporting [`Error::ExternalSystemError`].

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::{Client, ResourceExt};
use rand::Rng;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::k8s::adapter::KubeAdapter;

const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// One exponential-backoff wait loop. `probe` is polled until it returns
/// `Ok(true)`, an error, or the deadline elapses.
pub async fn poll_until<F, Fut>(deadline: Duration, max_backoff: Duration, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = tokio::time::Instant::now();
    let mut attempt: u32 = 0;
    loop {
        if probe().await? {
            return Ok(());
        }
        if start.elapsed() >= deadline {
            return Err(Error::ExternalSystemError {
                component: "readiness-wait",
                message: format!("condition not satisfied within {:?}", deadline),
            });
        }
        let backoff = backoff_delay(attempt, max_backoff);
        debug!(attempt, ?backoff, "condition not yet satisfied, backing off");
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// `delay = min(2^n + rand(0,1), maxBackoff)`.
pub fn backoff_delay(attempt: u32, max_backoff: Duration) -> Duration {
    let exp = 2f64.powi(attempt as i32);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let seconds = (exp + jitter).min(max_backoff.as_secs_f64());
    Duration::from_secs_f64(seconds)
}

/// Waits until every pod matched by `label_selector` in `namespace` has
/// its `Ready` condition true.
#[instrument(skip(client))]
pub async fn wait_for_pod_ready(
    client: &Client,
    namespace: &str,
    label_selector: &str,
    deadline: Duration,
) -> Result<()> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    poll_until(deadline, DEFAULT_MAX_BACKOFF, || async {
        let pods = api
            .list(&kube::api::ListParams::default().labels(label_selector))
            .await
            .map_err(Error::KubeError)?;
        if pods.items.is_empty() {
            return Ok(false);
        }
        Ok(pods.items.iter().all(pod_is_ready))
    })
    .await
}

fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == "Ready" && condition.status == "True")
        })
        .unwrap_or(false)
}

/// Waits until an HTTP GET on `url` returns one of `accepted_statuses`. The
/// vector-DB front-end, for example, answers `401` even when healthy
/// because it demands auth on every route (§9).
#[instrument(skip(accepted_statuses))]
pub async fn wait_for_http(url: &str, accepted_statuses: &[u16], deadline: Duration) -> Result<()> {
    let http_client = reqwest_client();
    poll_until(deadline, DEFAULT_MAX_BACKOFF, || async {
        match http_client.get(url).send().await {
            Ok(response) => Ok(accepted_statuses.contains(&response.status().as_u16())),
            Err(_) => Ok(false),
        }
    })
    .await
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("building the readiness-probe HTTP client")
}

/// Waits until a dynamic custom resource's `.status.phase` equals
/// `expected_phase` (e.g. a bucket claim reaching `Bound`, §4.4).
#[instrument(skip(adapter))]
pub async fn wait_for_custom_status(
    adapter: &KubeAdapter,
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
    expected_phase: &str,
    deadline: Duration,
) -> Result<()> {
    poll_until(deadline, DEFAULT_MAX_BACKOFF, || async {
        let phases = adapter
            .query(api_version, kind, namespace, name, "status.phase")
            .await?;
        Ok(phases
            .first()
            .and_then(|v| v.as_str())
            .map(|phase| phase == expected_phase)
            .unwrap_or(false))
    })
    .await
}

pub fn default_deadline() -> Duration {
    DEFAULT_DEADLINE
}

#[allow(dead_code)]
fn _assert_resource_ext<K: ResourceExt>() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        let max = Duration::from_secs(10);
        assert!(backoff_delay(0, max).as_secs_f64() < 2.0);
        assert!(backoff_delay(1, max).as_secs_f64() < 3.0);
        assert_eq!(backoff_delay(10, max), max);
    }

    #[tokio::test]
    async fn poll_until_succeeds_immediately() {
        let result = poll_until(Duration::from_secs(1), Duration::from_millis(10), || async {
            Ok(true)
        })
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn poll_until_times_out() {
        let result = poll_until(Duration::from_millis(50), Duration::from_millis(5), || async {
            Ok(false)
        })
        .await;
        assert!(matches!(result, Err(Error::ExternalSystemError { .. })));
    }
}
