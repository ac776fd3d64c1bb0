use std::time::Duration;

use reqwest::redirect::Policy;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::error::Result;

/// Budget for one probe unless configured otherwise
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(8_000);

/// One bounded-time reachability check.
///
/// Implementations never fail: any network-level problem, including running
/// past `deadline`, is reported as `false`. There are no retries.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &Url, deadline: Duration) -> bool;
}

/// HTTP(S) probe: a single GET that succeeds as soon as response headers arrive.
///
/// Any status counts as "up", error statuses and redirects included; the
/// check answers "is anything listening", not "is the site healthy".
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client })
    }

    /// Use a preconfigured client (proxy settings, custom roots, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &Url, deadline: Duration) -> bool {
        match timeout(deadline, self.client.get(url.clone()).send()).await {
            Ok(Ok(response)) => {
                debug!(%url, status = %response.status(), "Probe answered");
                true
            }
            Ok(Err(error)) => {
                debug!(%url, %error, "Probe failed");
                false
            }
            Err(_) => {
                debug!(%url, ?deadline, "Probe timed out");
                false
            }
        }
    }
}
