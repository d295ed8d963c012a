//! Gateway readiness probing.

use std::time::Duration;

use {
    tokio::time::Instant,
    tracing::{debug, info, warn},
};

use crate::error::Error;

/// Paths polled on every attempt. Any HTTP response at all, whatever the
/// status, means the gateway is accepting connections.
pub const READINESS_PATHS: &[&str] = &["/openclaw", "/", "/health"];

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Polls the gateway until it answers or the deadline passes.
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl ReadinessProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap_or_default(),
            target: target.into().trim_end_matches('/').to_string(),
            interval: DEFAULT_INTERVAL,
            timeout,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Single probe round: `true` as soon as one path answers.
    pub async fn check_once(&self) -> bool {
        for path in READINESS_PATHS {
            let url = format!("{}{path}", self.target);
            match self
                .client
                .get(&url)
                .timeout(self.interval.max(Duration::from_secs(1)))
                .send()
                .await
            {
                Ok(resp) => {
                    debug!(%url, status = resp.status().as_u16(), "gateway answered readiness probe");
                    return true;
                },
                Err(e) => debug!(%url, error = %e, "readiness probe failed"),
            }
        }
        false
    }

    /// Poll every interval until the gateway answers, or fail with
    /// [`Error::StartTimeout`] once the deadline has passed. Never gives up
    /// before the full timeout.
    pub async fn wait_ready(&self) -> Result<(), Error> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            if self.check_once().await {
                info!(
                    target = %self.target,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "gateway ready"
                );
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(target = %self.target, timeout_ms = self.timeout.as_millis() as u64, "gateway not ready before deadline");
                return Err(Error::StartTimeout {
                    timeout: self.timeout,
                });
            }
            // The last sleep is shortened so the final attempt lands on the deadline.
            tokio::time::sleep(self.interval.min(remaining)).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        axum::{Router, http::StatusCode, routing::get},
        std::net::SocketAddr,
        tokio::net::TcpListener,
    };

    async fn serve(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Reserve a loopback port nobody is listening on.
    async fn dead_port() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn any_status_counts_as_ready() {
        let app = Router::new().fallback(|| async { StatusCode::UNAUTHORIZED });
        let addr = serve(app).await;
        let probe = ReadinessProbe::new(format!("http://{addr}"), Duration::from_secs(2));
        probe.wait_ready().await.unwrap();
    }

    #[tokio::test]
    async fn later_path_can_answer() {
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let addr = serve(app).await;
        let probe = ReadinessProbe::new(format!("http://{addr}/"), Duration::from_secs(2));
        assert!(probe.check_once().await);
    }

    #[tokio::test]
    async fn times_out_when_nothing_listens() {
        let addr = dead_port().await;
        let probe = ReadinessProbe::new(format!("http://{addr}"), Duration::from_millis(600))
            .with_interval(Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = probe.wait_ready().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::StartTimeout { timeout } if timeout == Duration::from_millis(600)));
        assert!(elapsed >= Duration::from_millis(600), "gave up early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "overran deadline: {elapsed:?}");
    }

    #[tokio::test]
    async fn default_interval_waits_for_full_timeout() {
        let addr = dead_port().await;
        let timeout = Duration::from_millis(600);
        let probe = ReadinessProbe::new(format!("http://{addr}"), timeout);

        let started = std::time::Instant::now();
        let err = probe.wait_ready().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::StartTimeout { .. }));
        assert!(elapsed >= timeout, "gave up early: {elapsed:?}");
    }

    #[tokio::test]
    async fn becomes_ready_after_late_bind() {
        let addr = dead_port().await;
        let probe = ReadinessProbe::new(format!("http://{addr}"), Duration::from_secs(5))
            .with_interval(Duration::from_millis(50));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            axum::serve(listener, Router::new().fallback(|| async { "late" }))
                .await
                .unwrap();
        });

        probe.wait_ready().await.unwrap();
    }
}
