//! Host computation (§4.5): resolving the externally-visible hostname and
//! scheme for every exposed endpoint from the configured `apihost`, the
//! runtime flavor and the protocol hint.
//!
//! Grounded on `apihost_util.py`'s `ensure_host`/`assign_protocol`/
//! `calculate_apihost` family; the doctest examples in that file became
//! the unit tests below.

use std::sync::OnceLock;

use regex::Regex;

use crate::crd::whisk::{Protocol, RuntimeFlavor};
use crate::error::{Error, Result};

fn ipv4_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,3}\.){3}\d{1,3}$").unwrap())
}

/// An already-resolved ingress endpoint: either a DNS hostname or a bare
/// IPv4 address, as reported by `status.loadBalancer.ingress`.
#[derive(Clone, Debug)]
pub enum IngressAddress {
    Hostname(String),
    Ip(String),
}

/// Rewrites a bare IP into its `nip.io` wildcard-DNS form; a hostname
/// passes through unchanged. Idempotent: re-running it on an
/// already-rewritten `x.y.z.w.nip.io` host is a no-op because the regex
/// only matches a bare dotted-quad, not a `.nip.io`-suffixed string.
///
/// ```ignore
/// assert_eq!(ensure_host("142.251.163.105"), "142.251.163.105.nip.io");
/// assert_eq!(ensure_host("example.com"), "example.com");
/// ```
pub fn ensure_host(host: &str) -> String {
    if ipv4_pattern().is_match(host) {
        format!("{host}.nip.io")
    } else {
        host.to_owned()
    }
}

/// Whether ingress controller services on this runtime get a cloud
/// load-balancer address, vs. needing the host's own public IP.
pub fn is_load_balanced(runtime: &RuntimeFlavor) -> bool {
    runtime.is_load_balanced()
}

/// Computes the effective `apihost`. A literal (non-`auto`) value is used
/// as-is; `auto` resolves from the ingress controller's load-balancer
/// address (rewritten through [`ensure_host`]), or — on non-load-balanced
/// runtimes — from `public_ip` (the caller's own address lookup).
pub fn calculate_apihost(
    configured: &str,
    runtime: &RuntimeFlavor,
    ingress_address: Option<&IngressAddress>,
    public_ip: Option<&str>,
) -> Result<String> {
    if configured != "auto" {
        return Ok(configured.to_owned());
    }
    if !is_load_balanced(runtime) {
        let ip = public_ip.ok_or_else(|| Error::ExternalSystemError {
            component: "host",
            message: "apihost=auto on a non-load-balanced runtime requires the host's public IP".into(),
        })?;
        return Ok(ensure_host(ip));
    }
    match ingress_address {
        Some(IngressAddress::Hostname(h)) => Ok(h.clone()),
        Some(IngressAddress::Ip(ip)) => Ok(ensure_host(ip)),
        None => Err(Error::ExternalSystemError {
            component: "host",
            message: "apihost=auto but the ingress controller has no load-balancer address yet".into(),
        }),
    }
}

/// Splits `host[:port]` into its hostname and optional port.
pub fn split_hostname_port(host: &str) -> (&str, Option<&str>) {
    match host.rsplit_once(':') {
        Some((h, p)) if p.chars().all(|c| c.is_ascii_digit()) => (h, Some(p)),
        _ => (host, None),
    }
}

/// Prepends `prefix` to a host, preserving any port, and is idempotent: if
/// the host already carries the prefix, it is returned unchanged.
///
/// ```ignore
/// assert_eq!(append_prefix_to_url("www.", "example.com"), "www.example.com");
/// assert_eq!(append_prefix_to_url("www.", "www.example.com"), "www.example.com");
/// assert_eq!(append_prefix_to_url("www.", "example.com:8080"), "www.example.com:8080");
/// ```
pub fn append_prefix_to_url(prefix: &str, host: &str) -> String {
    let (hostname, port) = split_hostname_port(host);
    let prefixed = if hostname.starts_with(prefix) {
        hostname.to_owned()
    } else {
        format!("{prefix}{hostname}")
    };
    match port {
        Some(port) => format!("{prefixed}:{port}"),
        None => prefixed,
    }
}

/// Chooses `http`/`https`. An explicit `protocol` config wins; otherwise
/// `tls=true` selects `https`. Runtime `kind` always downgrades to `http`
/// regardless of the other two inputs.
pub fn assign_protocol(protocol: &Protocol, tls: bool, runtime: &RuntimeFlavor) -> &'static str {
    if *runtime == RuntimeFlavor::Kind {
        return "http";
    }
    match protocol {
        Protocol::Http => "http",
        Protocol::Https => "https",
        Protocol::Auto if tls => "https",
        Protocol::Auto => "http",
    }
}

/// Full URL for a given sub-host, per §4.5 steps 2-3.
pub fn compute_url(apihost: &str, prefix: Option<&str>, protocol: &Protocol, tls: bool, runtime: &RuntimeFlavor) -> String {
    let host = match prefix {
        Some(p) => append_prefix_to_url(p, apihost),
        None => apihost.to_owned(),
    };
    let scheme = assign_protocol(protocol, tls, runtime);
    format!("{scheme}://{host}")
}

/// `host(host(x)) == host(x)` for an already-qualified host — the
/// idempotence property of §8. Exercised directly in tests below via
/// repeated [`ensure_host`] and [`append_prefix_to_url`] calls.
pub fn compute_host(apihost: &str, prefix: Option<&str>) -> String {
    let rewritten = ensure_host(apihost);
    match prefix {
        Some(p) => append_prefix_to_url(p, &rewritten),
        None => rewritten,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_host_rewrites_bare_ip() {
        assert_eq!(ensure_host("142.251.163.105"), "142.251.163.105.nip.io");
    }

    #[test]
    fn ensure_host_passes_through_dns_name() {
        assert_eq!(ensure_host("example.com"), "example.com");
    }

    #[test]
    fn ensure_host_is_idempotent_on_rewritten_host() {
        let once = ensure_host("142.251.163.105");
        assert_eq!(ensure_host(&once), once);
    }

    #[test]
    fn load_balancer_ip_yields_nip_io_host() {
        let apihost = calculate_apihost(
            "auto",
            &RuntimeFlavor::Generic,
            Some(&IngressAddress::Ip("142.251.163.105".into())),
            None,
        )
        .unwrap();
        assert_eq!(apihost, "142.251.163.105.nip.io");
    }

    #[test]
    fn kind_runtime_forces_http_even_with_tls() {
        assert_eq!(assign_protocol(&Protocol::Auto, true, &RuntimeFlavor::Kind), "http");
        assert_eq!(assign_protocol(&Protocol::Https, true, &RuntimeFlavor::Kind), "http");
    }

    #[test]
    fn tls_selects_https_off_kind() {
        assert_eq!(assign_protocol(&Protocol::Auto, true, &RuntimeFlavor::Generic), "https");
        assert_eq!(assign_protocol(&Protocol::Auto, false, &RuntimeFlavor::Generic), "http");
    }

    #[test]
    fn explicit_protocol_wins_over_tls() {
        assert_eq!(assign_protocol(&Protocol::Http, true, &RuntimeFlavor::Generic), "http");
    }

    #[test]
    fn www_prefix_is_idempotent() {
        let once = append_prefix_to_url("www.", "example.com");
        assert_eq!(append_prefix_to_url("www.", &once), once);
    }

    #[test]
    fn prefix_preserves_port() {
        assert_eq!(append_prefix_to_url("www.", "example.com:8080"), "www.example.com:8080");
    }

    #[test]
    fn compute_host_is_idempotent_for_already_qualified_host() {
        let first = compute_host("142.251.163.105", Some("www."));
        let second = compute_host(&first, Some("www."));
        assert_eq!(first, second);
    }

    #[test]
    fn non_load_balanced_runtime_requires_public_ip() {
        let err = calculate_apihost("auto", &RuntimeFlavor::K3s, None, None);
        assert!(err.is_err());
        let ok = calculate_apihost("auto", &RuntimeFlavor::K3s, None, Some("10.0.0.5")).unwrap();
        assert_eq!(ok, "10.0.0.5.nip.io");
    }
}
