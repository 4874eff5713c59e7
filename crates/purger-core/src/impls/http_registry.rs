//! HttpListRegistry - 平文リストによる登録チェック
//!
//! 1 行 1 名のリストを HTTP で取得してキャッシュし、refresh 間隔ごとに
//! 取り直します。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::RegistryError;
use crate::ports::{Clock, RegistryProvider};

#[derive(Debug, Default)]
struct CachedList {
    names: Option<HashSet<String>>,
    refreshed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
}

impl CachedList {
    fn is_fresh(&self, now: DateTime<Utc>, refresh: Duration, retry_after: Duration) -> bool {
        let recent = |at: Option<DateTime<Utc>>, window: Duration| {
            at.is_some_and(|at| now.signed_duration_since(at) < window)
        };
        recent(self.refreshed_at, refresh) || recent(self.failed_at, retry_after)
    }
}

/// List-backed registry.
///
/// # Caching
/// - At most one download per refresh interval (default 1 hour).
/// - A failed download keeps the previous list and is not retried before
///   the failure backoff (default 1 minute) has passed.
/// - Until one download has succeeded every call fails with
///   [`RegistryError::Unavailable`].
pub struct HttpListRegistry {
    client: reqwest::Client,
    url: String,
    refresh: Duration,
    retry_after: Duration,
    clock: Arc<dyn Clock>,
    cache: RwLock<CachedList>,
}

impl HttpListRegistry {
    pub fn new(url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self::with_client(client, url, clock)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            url: url.into(),
            refresh: Duration::hours(1),
            retry_after: Duration::minutes(1),
            clock,
            cache: RwLock::new(CachedList::default()),
        }
    }

    pub fn refresh_every(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Wait after a failed download before trying again.
    pub fn retry_failures_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    async fn refresh_if_stale(&self) {
        let now = self.clock.now();
        let mut cache = self.cache.write().await;
        if cache.is_fresh(now, self.refresh, self.retry_after) {
            return;
        }

        match self.download().await {
            Ok(names) => {
                debug!(url = %self.url, names = names.len(), "refreshed registered member list");
                cache.names = Some(names);
                cache.refreshed_at = Some(now);
                cache.failed_at = None;
            }
            Err(err) => {
                cache.failed_at = Some(now);
                warn!(url = %self.url, error = %err, "failed to refresh registered member list");
            }
        }
    }

    async fn download(&self) -> Result<HashSet<String>, RegistryError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::BadResponse(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::BadResponse(e.to_string()))?;
        Ok(parse_name_list(&body))
    }

    async fn cached_names(&self) -> Result<HashSet<String>, RegistryError> {
        self.refresh_if_stale().await;
        self.cache
            .read()
            .await
            .names
            .clone()
            .ok_or_else(|| RegistryError::Unavailable("registered member list never loaded".to_string()))
    }
}

/// One name per line; blank lines ignored, names lowercased.
pub fn parse_name_list(body: &str) -> HashSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl RegistryProvider for HttpListRegistry {
    async fn is_eligible_member(&self, name: &str) -> Result<bool, RegistryError> {
        self.refresh_if_stale().await;
        let cache = self.cache.read().await;
        match &cache.names {
            Some(names) => Ok(names.contains(&name.to_lowercase())),
            None => Err(RegistryError::Unavailable(
                "registered member list never loaded".to_string(),
            )),
        }
    }

    async fn list_eligible_members(&self) -> Result<HashSet<String>, RegistryError> {
        self.cached_names().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::TimeZone;
    use std::io::ErrorKind as IoErrorKind;
    use std::net::TcpListener;

    /// Connections the kernel queued on `listener`, accepted and counted.
    fn drain_connections(listener: &TcpListener) -> usize {
        let mut count = 0;
        loop {
            match listener.accept() {
                Ok(_) => count += 1,
                Err(e) if e.kind() == IoErrorKind::WouldBlock => return count,
                Err(e) => panic!("accept failed: {e}"),
            }
        }
    }

    #[test]
    fn parses_names_case_insensitively() {
        let names = parse_name_list("Alpha Pilot\r\n\n  beta  \nALPHA PILOT\n");
        assert_eq!(names.len(), 2);
        assert!(names.contains("alpha pilot"));
        assert!(names.contains("beta"));
    }

    #[tokio::test]
    async fn unreachable_list_is_unavailable_not_empty() {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_millis(500))
            .build()
            .unwrap();
        let registry = HttpListRegistry::with_client(
            client,
            "http://127.0.0.1:9/registered.txt",
            Arc::new(SystemClock),
        );

        assert!(matches!(
            registry.list_eligible_members().await,
            Err(RegistryError::Unavailable(_))
        ));
        assert!(registry.is_eligible_member("anyone").await.is_err());
    }

    #[tokio::test]
    async fn failed_download_is_not_retried_within_backoff() {
        // Nothing ever answers: connections queue up in the backlog and time out.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("http://{}/registered.txt", listener.local_addr().unwrap());

        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_millis(300))
            .build()
            .unwrap();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let registry = HttpListRegistry::with_client(client, url, Arc::new(clock.clone()));

        assert!(registry.is_eligible_member("anyone").await.is_err());
        assert_eq!(drain_connections(&listener), 1);

        clock.advance(Duration::seconds(30));
        assert!(registry.is_eligible_member("anyone").await.is_err());
        assert!(registry.list_eligible_members().await.is_err());
        assert_eq!(drain_connections(&listener), 0);

        clock.advance(Duration::seconds(31));
        assert!(registry.is_eligible_member("anyone").await.is_err());
        assert_eq!(drain_connections(&listener), 1);
    }
}
