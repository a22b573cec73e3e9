//! Scripted provider adapter for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::ai::{ProviderAdapter, ProviderId};
use crate::error::ProviderError;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, ProviderHealth};

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed,
    Fail(ProviderError),
    /// Answer only after the given delay
    Slow(Duration),
}

pub(crate) struct ScriptedAdapter {
    id: ProviderId,
    behavior: Mutex<Behavior>,
    healthy: AtomicBool,
    pub diagnose_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new(id: ProviderId, behavior: Behavior) -> Self {
        Self {
            id,
            behavior: Mutex::new(behavior),
            healthy: AtomicBool::new(true),
            diagnose_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }

    pub fn ok(id: ProviderId) -> Self {
        Self::new(id, Behavior::Succeed)
    }

    pub fn failing(id: ProviderId) -> Self {
        Self::new(
            id,
            Behavior::Fail(ProviderError::Http {
                status: 503,
                message: format!("{} unavailable", id.tag()),
            }),
        )
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn diagnoses(&self) -> usize {
        self.diagnose_calls.load(Ordering::SeqCst)
    }

    pub fn chats(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    async fn outcome(&self) -> Result<(), ProviderError> {
        let behavior = self.behavior.lock().clone();
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail(e) => Err(e),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, ProviderError> {
        self.diagnose_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome().await?;
        Ok(DiagnosisResult {
            diagnosis: format!("{} diagnosis", self.id.tag()),
            possible_causes: vec!["Scripted cause".to_string()],
            recommendations: vec!["Scripted recommendation".to_string()],
            confidence: 0.9,
            estimated_cost: "$100 - $200".to_string(),
            urgency: request.urgency,
            provider: self.id.tag().to_string(),
            tools_needed: Vec::new(),
            safety_notes: Vec::new(),
        })
    }

    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome().await?;
        Ok(format!("{} reply", self.id.tag()))
    }

    async fn probe(&self) -> ProviderHealth {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            ProviderHealth::up(self.id, 5)
        } else {
            ProviderHealth::down(self.id, "probe failed")
        }
    }
}
