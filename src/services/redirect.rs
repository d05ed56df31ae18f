//! Redirect dispatcher: resolves a code, enforces the open-redirect
//! policy, chooses the redirect status, and schedules accounting and
//! event emission off the response path.

use crate::error::{AppError, AppResult};
use crate::events::EventBus;
use crate::jobs::JobSender;
use crate::metrics::AppMetrics;
use crate::models::HitEvent;
use crate::services::url_service::UrlService;
use axum::http::StatusCode;
use chrono::Utc;
use regex::Regex;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, OnceLock};
use tracing::error;
use url::{Host, Url};

use crate::analytics::enrich::{AgentParser, GeoLookup};

/// Top-level domains refused as redirect targets.
const SUSPICIOUS_TLDS: &[&str] = &[".tk", ".ml", ".ga", ".cf"];

/// Hosts stable enough to deserve a permanent (301) redirect.
const STABLE_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "github.com",
    "gitlab.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "medium.com",
    "stackoverflow.com",
];

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap_or_else(|_| unreachable!()))
}

/// Request metadata accompanying a redirect.
#[derive(Debug, Clone)]
pub struct RedirectContext {
    pub ip: String,
    pub user_agent: String,
    pub referrer: Option<String>,
}

/// The response the boundary turns into a real redirect.
#[derive(Debug, Clone)]
pub struct RedirectOutcome {
    pub status: StatusCode,
    pub location: String,
}

pub fn is_valid_code(code: &str) -> bool {
    code_pattern().is_match(code)
}

/// Open-redirect defense. Returns the violated rule on failure.
pub fn check_redirect_target(original: &str) -> Result<(), &'static str> {
    let url = Url::parse(original).map_err(|_| "target does not parse")?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err("target scheme is not http or https");
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost" {
                return Err("target host is loopback");
            }
            // A numeric host can hide behind the Domain form.
            if let Ok(ip) = domain.parse::<Ipv4Addr>() {
                check_ipv4(ip)?;
            }
            if SUSPICIOUS_TLDS.iter().any(|tld| domain.ends_with(tld)) {
                return Err("target TLD is on the suspicious list");
            }
            Ok(())
        }
        Some(Host::Ipv4(ip)) => check_ipv4(ip),
        Some(Host::Ipv6(ip)) => check_ipv6(ip),
        None => Err("target has no host"),
    }
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), &'static str> {
    let octets = ip.octets();
    if ip.is_loopback() {
        return Err("target host is loopback");
    }
    let private = octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 169 && octets[1] == 254);
    if private {
        return Err("target host is in a private range");
    }
    Ok(())
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), &'static str> {
    if ip.is_loopback() {
        return Err("target host is loopback");
    }
    Ok(())
}

/// Permanent redirect for the stable-host allowlist, temporary otherwise.
pub fn choose_status(original: &str) -> StatusCode {
    let host = Url::parse(original)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_ascii_lowercase()));
    match host {
        Some(host) => {
            let effective = host.strip_prefix("www.").unwrap_or(&host);
            if STABLE_HOSTS.contains(&effective) {
                StatusCode::MOVED_PERMANENTLY
            } else {
                StatusCode::FOUND
            }
        }
        None => StatusCode::FOUND,
    }
}

#[derive(Clone)]
pub struct RedirectDispatcher {
    urls: UrlService,
    jobs: JobSender,
    events: EventBus,
    geo: Arc<dyn GeoLookup>,
    agents: Arc<dyn AgentParser>,
    metrics: &'static AppMetrics,
}

impl RedirectDispatcher {
    pub fn new(
        urls: UrlService,
        jobs: JobSender,
        events: EventBus,
        geo: Arc<dyn GeoLookup>,
        agents: Arc<dyn AgentParser>,
        metrics: &'static AppMetrics,
    ) -> Self {
        Self {
            urls,
            jobs,
            events,
            geo,
            agents,
            metrics,
        }
    }

    /// Resolve a code to its redirect. Accounting and event emission are
    /// scheduled onto background tasks; their failure, and cancellation of
    /// the incoming request, never touch the response.
    pub async fn resolve_and_redirect(
        &self,
        code: &str,
        context: RedirectContext,
    ) -> AppResult<RedirectOutcome> {
        if !is_valid_code(code) {
            return Err(AppError::InvalidCode);
        }

        let target = self
            .urls
            .resolve(code)
            .await?
            .ok_or_else(|| AppError::NotFound(code.to_string()))?;

        if let Some(expires_at) = target.expires_at {
            if expires_at <= Utc::now() {
                return Err(AppError::Gone(code.to_string()));
            }
        }

        if let Err(reason) = check_redirect_target(&target.original) {
            error!(
                security = true,
                code,
                target = %target.original,
                reason,
                "refusing unsafe redirect target"
            );
            return Err(AppError::InvalidRedirect);
        }

        let status = choose_status(&target.original);
        self.metrics
            .redirects_total
            .with_label_values(&[status.as_str()])
            .inc();

        self.schedule_side_effects(code.to_string(), context);

        Ok(RedirectOutcome {
            status,
            location: target.original,
        })
    }

    /// Fire-and-forget: hit accounting through the worker, enrichment and
    /// publish on a fresh task.
    fn schedule_side_effects(&self, code: String, context: RedirectContext) {
        self.jobs.record_hit(code.clone());

        let events = self.events.clone();
        let geo = Arc::clone(&self.geo);
        let agents = Arc::clone(&self.agents);
        tokio::spawn(async move {
            let geo_info = geo.lookup(&context.ip);
            let agent_info = agents.parse(&context.user_agent);

            let event = HitEvent {
                code,
                timestamp: Utc::now(),
                ip: context.ip,
                user_agent: context.user_agent,
                referrer: context.referrer,
                country: geo_info.country,
                city: geo_info.city,
                device_type: agent_info.device_type,
                browser: agent_info.browser,
                os: agent_info.os,
            };

            events.publish(&event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_pattern() {
        assert!(is_valid_code("abc123X"));
        assert!(is_valid_code("my-link_2"));
        assert!(!is_valid_code("has space"));
        assert!(!is_valid_code("semi;colon"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_guard_accepts_public_hosts() {
        assert!(check_redirect_target("https://example.com/page").is_ok());
        assert!(check_redirect_target("http://93.184.216.34/x").is_ok());
    }

    #[test]
    fn test_guard_rejects_loopback() {
        assert!(check_redirect_target("http://127.0.0.1/x").is_err());
        assert!(check_redirect_target("http://127.8.8.8/x").is_err());
        assert!(check_redirect_target("http://localhost/x").is_err());
        assert!(check_redirect_target("http://[::1]/x").is_err());
    }

    #[test]
    fn test_guard_rejects_private_ranges() {
        for target in [
            "http://10.0.0.1/",
            "http://172.16.0.1/",
            "http://172.31.255.1/",
            "http://192.168.1.1/",
            "http://169.254.0.1/",
        ] {
            assert!(check_redirect_target(target).is_err(), "allowed {}", target);
        }
        // Neighbors of the 172.16/12 block are public.
        assert!(check_redirect_target("http://172.15.0.1/").is_ok());
        assert!(check_redirect_target("http://172.32.0.1/").is_ok());
    }

    #[test]
    fn test_guard_rejects_non_http_schemes() {
        assert!(check_redirect_target("ftp://example.com").is_err());
        assert!(check_redirect_target("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_guard_rejects_suspicious_tlds() {
        assert!(check_redirect_target("http://free-money.tk/").is_err());
        assert!(check_redirect_target("https://a.ml/x").is_err());
        assert!(check_redirect_target("https://a.ga/x").is_err());
        assert!(check_redirect_target("https://a.cf/x").is_err());
        // Only the TLD is policy, not a substring anywhere in the host.
        assert!(check_redirect_target("https://tk.example.com/").is_ok());
    }

    #[test]
    fn test_status_choice_for_stable_hosts() {
        assert_eq!(
            choose_status("https://github.com/rust-lang/rust"),
            StatusCode::MOVED_PERMANENTLY
        );
        assert_eq!(
            choose_status("https://www.youtube.com/watch?v=x"),
            StatusCode::MOVED_PERMANENTLY
        );
        assert_eq!(choose_status("https://example.com/"), StatusCode::FOUND);
        assert_eq!(
            choose_status("https://notgithub.com/"),
            StatusCode::FOUND
        );
    }
}
