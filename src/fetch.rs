use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, redirect, Client, Response};
use tracing::{info, warn};
use url::{Host, Url};

use crate::error::LaasError;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 5;

/// A downloaded resource and the content type the server declared for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAsset {
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, LaasError>;

    async fn fetch_asset(&self, url: &str) -> Result<FetchedAsset, LaasError>;
}

/// HTTP fetcher with a per-request timeout.
///
/// Redirects are only followed to hosts that [`validate_url`] accepts, so a
/// public page cannot bounce a request onto the internal network.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, LaasError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::custom(|attempt| {
                if redirect_allowed(attempt.url(), attempt.previous().len()) {
                    attempt.follow()
                } else {
                    let target = attempt.url().to_string();
                    attempt.error(format!("redirect to {target} is not allowed"))
                }
            }))
            .build()
            .map_err(|e| LaasError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, accept: &str) -> Result<Response, LaasError> {
        let response = self
            .client
            .get(url)
            .header("Accept", accept)
            .send()
            .await
            .map_err(|e| LaasError::Fetch(format!("GET {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LaasError::Fetch(format!("GET {url}: status {status}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, LaasError> {
        let response = self.get(url, "text/html,application/xhtml+xml,text/css;q=0.9,*/*;q=0.8").await?;
        let body = response.text().await.map_err(|e| LaasError::Fetch(format!("GET {url}: {e}")))?;
        info!(url, bytes = body.len(), "fetched");
        Ok(body)
    }

    async fn fetch_asset(&self, url: &str) -> Result<FetchedAsset, LaasError> {
        let response = self.get(url, "*/*").await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(|e| LaasError::Fetch(format!("GET {url}: {e}")))?;
        info!(url, bytes = body.len(), "asset fetched");
        Ok(FetchedAsset { body, content_type })
    }
}

/// A redirect hop is followed only within the hop limit and to a public http(s) URL.
fn redirect_allowed(next: &Url, previous_hops: usize) -> bool {
    previous_hops < MAX_REDIRECTS && validate_url(next.as_str()).is_ok()
}

/// Fetches a page, retrying failures with a doubling delay.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    attempts: u32,
    base_delay: Duration,
) -> Result<String, LaasError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match fetcher.fetch_text(url).await {
            Ok(body) => return Ok(body),
            Err(e) if attempt < attempts => {
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(url, attempt, attempts, error = %e, delay_ms = delay.as_millis() as u64, "fetch failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(url, attempts, error = %e, "fetch failed");
                return Err(e);
            }
        }
    }
}

/// Removes the query string and fragment; unparsable input comes back unchanged.
pub fn strip_query_params(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Resolves an attribute or `url(...)` reference against `base`. Empty and
/// `data:` references carry nothing to fetch and come back as `None`.
pub fn resolve_reference(base: Option<&Url>, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with("data:") {
        return None;
    }
    match Url::parse(reference) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base.and_then(|b| b.join(reference).ok()).map(|u| u.to_string()),
    }
}

/// Accepts public http(s) URLs only.
pub fn validate_url(raw: &str) -> Result<Url, LaasError> {
    let invalid = || LaasError::Validation(format!("Invalid URL provided: {raw}"));
    let url = Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let allowed = match url.host() {
        None => false,
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain != "localhost" && !domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
    };
    if allowed { Ok(url) } else { Err(invalid()) }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [first, ..] = ip.octets();
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || first == 0
        || first >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}
