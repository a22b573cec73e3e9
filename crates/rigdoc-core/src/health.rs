//! Periodic provider health monitoring
//!
//! The monitor owns the health table and is its only writer. Readers get
//! copies. A failed probe marks a provider known-unhealthy only until the
//! next probe round or until the record goes stale, so no provider is ever
//! banned for good.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::{ProviderAdapter, ProviderId};
use crate::error::ProviderError;
use crate::timeout::with_timeout;
use crate::types::ProviderHealth;

pub struct HealthMonitor {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    table: RwLock<HashMap<ProviderId, ProviderHealth>>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let table = adapters
            .iter()
            .map(|a| (a.id(), ProviderHealth::unknown(a.id())))
            .collect();
        Self {
            adapters,
            table: RwLock::new(table),
            interval,
            probe_timeout,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Age after which a failed probe no longer counts against a provider
    pub fn stale_after(&self) -> Duration {
        self.interval * 2
    }

    /// Probe every provider concurrently and record the results
    ///
    /// A probe that hangs past the probe timeout counts as a failure. One
    /// provider's failure never prevents the others from being recorded.
    pub async fn probe_once(&self) -> Vec<ProviderHealth> {
        let probes = self.adapters.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let limit = self.probe_timeout;
            async move {
                match with_timeout(adapter.probe(), limit).await {
                    Ok(health) => health,
                    Err(e) => ProviderHealth::down(adapter.id(), ProviderError::from(e).to_string()),
                }
            }
        });
        let results = join_all(probes).await;

        {
            let mut table = self.table.write();
            for health in &results {
                table.insert(health.provider, health.clone());
            }
        }

        for health in &results {
            if health.healthy {
                debug!(
                    provider = health.provider.tag(),
                    latency_ms = health.latency_ms,
                    "Provider healthy"
                );
            } else {
                warn!(
                    provider = health.provider.tag(),
                    error = health.error.as_deref().unwrap_or(""),
                    "Provider unhealthy"
                );
            }
        }

        results
    }

    /// Current record for one provider
    pub fn get(&self, provider: ProviderId) -> ProviderHealth {
        self.table
            .read()
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| ProviderHealth::unknown(provider))
    }

    /// Copy of the table in fallback order
    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        let table = self.table.read();
        ProviderId::all()
            .iter()
            .filter_map(|id| table.get(id).cloned())
            .collect()
    }

    /// Whether a fresh probe says this provider is down
    ///
    /// Never-probed and stale records are given the benefit of the doubt.
    pub fn is_known_unhealthy(&self, provider: ProviderId) -> bool {
        let table = self.table.read();
        let Some(health) = table.get(&provider) else {
            return false;
        };
        if health.healthy {
            return false;
        }
        let Some(checked) = health.last_checked else {
            return false;
        };
        let age = Utc::now()
            .signed_duration_since(checked)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age <= self.stale_after()
    }

    /// Start probing on a fixed interval, beginning immediately
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let monitor = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = monitor.interval.as_secs_f64(),
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.probe_once().await;
                    }
                }
            }

            debug!("Health monitor loop ended");
        });

        MonitorHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Running monitor loop; the loop stops when this is stopped or dropped
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for an in-flight round to wind down
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Health monitor stopped");
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAdapter;

    fn monitor_with(
        adapters: Vec<Arc<ScriptedAdapter>>,
        interval: Duration,
    ) -> Arc<HealthMonitor> {
        let adapters = adapters
            .into_iter()
            .map(|a| a as Arc<dyn ProviderAdapter>)
            .collect();
        Arc::new(HealthMonitor::new(
            adapters,
            interval,
            Duration::from_millis(200),
        ))
    }

    #[tokio::test]
    async fn test_unknown_until_first_probe() {
        let agent = Arc::new(ScriptedAdapter::ok(ProviderId::AzureAgent));
        let monitor = monitor_with(vec![agent], Duration::from_secs(60));

        let health = monitor.get(ProviderId::AzureAgent);
        assert!(health.last_checked.is_none());
        assert!(!monitor.is_known_unhealthy(ProviderId::AzureAgent));
        assert!(!monitor.is_known_unhealthy(ProviderId::Inference));
    }

    #[tokio::test]
    async fn test_probe_once_records_every_provider() {
        let agent = Arc::new(ScriptedAdapter::ok(ProviderId::AzureAgent));
        let openai = Arc::new(ScriptedAdapter::ok(ProviderId::AzureOpenAi));
        openai.set_healthy(false);
        let inference = Arc::new(ScriptedAdapter::ok(ProviderId::Inference));
        let monitor = monitor_with(
            vec![inference.clone(), agent.clone(), openai.clone()],
            Duration::from_secs(60),
        );

        let results = monitor.probe_once().await;
        assert_eq!(results.len(), 3);

        let snapshot = monitor.snapshot();
        let order: Vec<_> = snapshot.iter().map(|h| h.provider).collect();
        assert_eq!(order, ProviderId::all().to_vec());
        assert!(snapshot[0].healthy);
        assert!(!snapshot[1].healthy);
        assert!(monitor.is_known_unhealthy(ProviderId::AzureOpenAi));
        assert!(!monitor.is_known_unhealthy(ProviderId::AzureAgent));
    }

    #[tokio::test]
    async fn test_provider_recovers_on_next_round() {
        let openai = Arc::new(ScriptedAdapter::ok(ProviderId::AzureOpenAi));
        let monitor = monitor_with(vec![openai.clone()], Duration::from_secs(60));

        openai.set_healthy(false);
        monitor.probe_once().await;
        assert!(monitor.is_known_unhealthy(ProviderId::AzureOpenAi));

        openai.set_healthy(true);
        monitor.probe_once().await;
        assert!(!monitor.is_known_unhealthy(ProviderId::AzureOpenAi));
        assert_eq!(openai.probes(), 2);
    }

    #[tokio::test]
    async fn test_stale_failure_is_forgiven() {
        let inference = Arc::new(ScriptedAdapter::ok(ProviderId::Inference));
        inference.set_healthy(false);
        let monitor = monitor_with(vec![inference], Duration::from_millis(10));

        monitor.probe_once().await;
        assert!(monitor.is_known_unhealthy(ProviderId::Inference));

        std::thread::sleep(Duration::from_millis(50));
        assert!(!monitor.is_known_unhealthy(ProviderId::Inference));
    }

    struct HangingProbe;

    #[async_trait::async_trait]
    impl ProviderAdapter for HangingProbe {
        fn id(&self) -> ProviderId {
            ProviderId::AzureAgent
        }

        async fn diagnose(
            &self,
            _request: &crate::types::DiagnosisRequest,
        ) -> Result<crate::types::DiagnosisResult, ProviderError> {
            Err(ProviderError::Network("unused".into()))
        }

        async fn chat(
            &self,
            _messages: &[crate::types::ChatMessage],
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Network("unused".into()))
        }

        async fn probe(&self) -> ProviderHealth {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            ProviderHealth::up(ProviderId::AzureAgent, 0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_probe_times_out_as_unhealthy() {
        let monitor = HealthMonitor::new(
            vec![Arc::new(HangingProbe)],
            Duration::from_secs(60),
            Duration::from_secs(10),
        );

        let results = monitor.probe_once().await;
        assert!(!results[0].healthy);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_background_loop_probes_until_stopped() {
        let agent = Arc::new(ScriptedAdapter::ok(ProviderId::AzureAgent));
        let monitor = monitor_with(vec![agent.clone()], Duration::from_millis(20));

        let handle = monitor.start();
        assert!(handle.is_running());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while agent.probes() < 3 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(agent.probes() >= 3);

        handle.stop().await;
        let after_stop = agent.probes();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(agent.probes(), after_stop);
    }
}
