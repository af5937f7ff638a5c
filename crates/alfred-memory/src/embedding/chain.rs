// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered fallback over embedding providers.
//!
//! Providers are tried in priority order. A provider that reports itself
//! unavailable, times out, errors, or returns a malformed vector is recorded
//! as a failure and the next one is tried. The first success wins and is
//! attributed by name. Only when every provider failed does the caller see
//! an error, carrying each provider's reason.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use alfred_core::{AlfredError, EmbeddingAdapter, ProviderFailure};

use super::normalize;
use crate::types::{BatchEmbedResult, EmbedResult, ProviderStatus};

/// Default bound on an availability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on one embed or embed-batch call.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Embedding providers in priority order, all of one dimensionality.
pub struct EmbeddingChain {
    providers: Vec<Arc<dyn EmbeddingAdapter>>,
    probe_timeout: Duration,
    embed_timeout: Duration,
}

impl EmbeddingChain {
    /// Build a chain, rejecting any provider whose dimensionality differs
    /// from the lead provider's.
    pub fn new(providers: Vec<Arc<dyn EmbeddingAdapter>>) -> Result<Self, AlfredError> {
        if let Some(lead) = providers.first() {
            let expected = lead.dimensions();
            if let Some(odd) = providers.iter().find(|p| p.dimensions() != expected) {
                return Err(AlfredError::DimensionMismatch {
                    expected,
                    actual: odd.dimensions(),
                });
            }
        }
        Ok(Self {
            providers,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, probe_timeout: Duration, embed_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.embed_timeout = embed_timeout;
        self
    }

    /// Dimensionality of every vector the chain returns, `None` when empty.
    pub fn dimensions(&self) -> Option<usize> {
        self.providers.first().map(|p| p.dimensions())
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Probe every provider (bounded by the probe timeout).
    pub async fn availability(&self) -> Vec<ProviderStatus> {
        let mut statuses = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let available = tokio::time::timeout(self.probe_timeout, provider.is_available())
                .await
                .unwrap_or(false);
            statuses.push(ProviderStatus {
                name: provider.name().to_string(),
                dimensions: provider.dimensions(),
                available,
            });
        }
        statuses
    }

    /// Embed one text with the first provider that succeeds.
    pub async fn embed(&self, text: &str) -> Result<EmbedResult, AlfredError> {
        let mut failures = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            if let Err(reason) = self.probe(provider.as_ref()).await {
                self.fall_through(&mut failures, name, reason);
                continue;
            }

            let outcome = match tokio::time::timeout(self.embed_timeout, provider.embed(text)).await {
                Err(_) => Err(timeout_reason(self.embed_timeout)),
                Ok(Err(e)) => Err(e.to_string()),
                Ok(Ok(vector)) => checked(vector, provider.dimensions()),
            };

            match outcome {
                Ok(embedding) => {
                    debug!(provider = %name, dims = embedding.len(), "embedded text");
                    metrics::counter!("alfred_embedding_requests_total", "provider" => name.to_string(), "outcome" => "ok")
                        .increment(1);
                    return Ok(EmbedResult {
                        embedding,
                        provider: name.to_string(),
                    });
                }
                Err(reason) => self.fall_through(&mut failures, name, reason),
            }
        }

        Err(AlfredError::AllProvidersFailed { failures })
    }

    /// Embed a whole batch with a single provider.
    ///
    /// A provider either embeds every text or the chain moves on with the
    /// full batch; providers are never mixed within one call.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<BatchEmbedResult, AlfredError> {
        if texts.is_empty() {
            return Ok(BatchEmbedResult {
                embeddings: Vec::new(),
                provider: String::new(),
            });
        }

        let mut failures = Vec::new();

        for provider in &self.providers {
            let name = provider.name();
            if let Err(reason) = self.probe(provider.as_ref()).await {
                self.fall_through(&mut failures, name, reason);
                continue;
            }

            let outcome =
                match tokio::time::timeout(self.embed_timeout, provider.embed_batch(texts)).await {
                    Err(_) => Err(timeout_reason(self.embed_timeout)),
                    Ok(Err(e)) => Err(e.to_string()),
                    Ok(Ok(vectors)) if vectors.len() != texts.len() => Err(format!(
                        "returned {} embeddings for {} inputs",
                        vectors.len(),
                        texts.len()
                    )),
                    Ok(Ok(vectors)) => vectors
                        .into_iter()
                        .map(|v| checked(v, provider.dimensions()))
                        .collect::<Result<Vec<_>, _>>(),
                };

            match outcome {
                Ok(embeddings) => {
                    debug!(provider = %name, count = embeddings.len(), "embedded batch");
                    metrics::counter!("alfred_embedding_requests_total", "provider" => name.to_string(), "outcome" => "ok")
                        .increment(1);
                    return Ok(BatchEmbedResult {
                        embeddings,
                        provider: name.to_string(),
                    });
                }
                Err(reason) => self.fall_through(&mut failures, name, reason),
            }
        }

        Err(AlfredError::AllProvidersFailed { failures })
    }

    async fn probe(&self, provider: &dyn EmbeddingAdapter) -> Result<(), String> {
        match tokio::time::timeout(self.probe_timeout, provider.is_available()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err("unavailable".to_string()),
            Err(_) => Err(format!("availability probe: {}", timeout_reason(self.probe_timeout))),
        }
    }

    fn fall_through(&self, failures: &mut Vec<ProviderFailure>, name: &str, reason: String) {
        warn!(provider = %name, reason = %reason, "embedding provider failed, trying next");
        metrics::counter!("alfred_embedding_requests_total", "provider" => name.to_string(), "outcome" => "error")
            .increment(1);
        metrics::counter!("alfred_embedding_fallbacks_total").increment(1);
        failures.push(ProviderFailure::new(name, reason));
    }
}

fn timeout_reason(limit: Duration) -> String {
    AlfredError::Timeout { duration: limit }.to_string()
}

/// Validate a provider's raw output and normalize it.
fn checked(vector: Vec<f32>, dimensions: usize) -> Result<Vec<f32>, String> {
    if vector.len() != dimensions {
        return Err(format!(
            "returned {} dimensions, expected {dimensions}",
            vector.len()
        ));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err("returned non-finite values".to_string());
    }
    Ok(normalize(vector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use alfred_core::{AdapterType, HealthStatus, PluginAdapter};

    /// Scripted provider: fixed availability and either a vector or an error.
    struct Scripted {
        name: &'static str,
        dims: usize,
        available: bool,
        output: Option<Vec<f32>>,
        delay: Option<Duration>,
        embed_calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, output: Vec<f32>) -> Self {
            Self {
                name,
                dims: output.len(),
                available: true,
                output: Some(output),
                delay: None,
                embed_calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, dims: usize) -> Self {
            Self {
                name,
                dims,
                available: true,
                output: None,
                delay: None,
                embed_calls: AtomicUsize::new(0),
            }
        }

        fn unavailable(name: &'static str, dims: usize) -> Self {
            Self {
                available: false,
                ..Self::failing(name, dims)
            }
        }

        fn calls(&self) -> usize {
            self.embed_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PluginAdapter for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Embedding
        }

        async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
            Ok(HealthStatus::Healthy)
        }

        async fn shutdown(&self) -> Result<(), AlfredError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EmbeddingAdapter for Scripted {
        fn dimensions(&self) -> usize {
            self.dims
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AlfredError> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.output.clone().ok_or_else(|| AlfredError::Embedding {
                provider: self.name.to_string(),
                message: "boom".to_string(),
            })
        }
    }

    fn chain_of(providers: Vec<Arc<Scripted>>) -> EmbeddingChain {
        let providers: Vec<Arc<dyn EmbeddingAdapter>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn EmbeddingAdapter>)
            .collect();
        EmbeddingChain::new(providers).unwrap()
    }

    #[tokio::test]
    async fn third_provider_wins_after_two_failures() {
        let first = Arc::new(Scripted::failing("first", 2));
        let second = Arc::new(Scripted::failing("second", 2));
        let third = Arc::new(Scripted::ok("third", vec![3.0, 4.0]));
        let chain = chain_of(vec![first.clone(), second.clone(), third.clone()]);

        let result = chain.embed("hello").await.unwrap();
        assert_eq!(result.provider, "third");
        assert!((result.embedding[0] - 0.6).abs() < 1e-6);
        assert!((result.embedding[1] - 0.8).abs() < 1e-6);
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn first_success_stops_the_chain() {
        let first = Arc::new(Scripted::ok("first", vec![1.0, 0.0]));
        let second = Arc::new(Scripted::ok("second", vec![0.0, 1.0]));
        let chain = chain_of(vec![first, second.clone()]);

        assert_eq!(chain.embed("x").await.unwrap().provider, "first");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn all_unavailable_fails_without_embedding() {
        let a = Arc::new(Scripted::unavailable("a", 2));
        let b = Arc::new(Scripted::unavailable("b", 2));
        let chain = chain_of(vec![a.clone(), b.clone()]);

        let err = chain.embed("x").await.unwrap_err();
        match err {
            AlfredError::AllProvidersFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0], ProviderFailure::new("a", "unavailable"));
                assert_eq!(failures[1].provider, "b");
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
        assert_eq!(a.calls() + b.calls(), 0);
    }

    #[tokio::test]
    async fn empty_chain_reports_no_providers() {
        let chain = EmbeddingChain::new(vec![]).unwrap();
        let err = chain.embed("x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "all embedding providers failed: no embedding providers configured"
        );
        assert_eq!(chain.dimensions(), None);
    }

    #[tokio::test]
    async fn wrong_length_output_is_a_provider_failure() {
        let liar = Arc::new(Scripted {
            dims: 3,
            ..Scripted::ok("liar", vec![1.0, 0.0])
        });
        let honest = Arc::new(Scripted::ok("honest", vec![0.0, 0.0, 2.0]));
        let chain = chain_of(vec![liar, honest]);

        let result = chain.embed("x").await.unwrap();
        assert_eq!(result.provider, "honest");
        assert_eq!(result.embedding, vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn non_finite_output_is_a_provider_failure() {
        let nan = Arc::new(Scripted::ok("nan", vec![f32::NAN, 1.0]));
        let chain = chain_of(vec![nan]);
        assert!(matches!(
            chain.embed("x").await,
            Err(AlfredError::AllProvidersFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_and_falls_through() {
        let slow = Arc::new(Scripted {
            delay: Some(Duration::from_secs(60)),
            ..Scripted::ok("slow", vec![1.0, 0.0])
        });
        let fast = Arc::new(Scripted::ok("fast", vec![0.0, 1.0]));
        let chain = chain_of(vec![slow, fast])
            .with_timeouts(Duration::from_millis(100), Duration::from_secs(1));

        let result = chain.embed("x").await.unwrap();
        assert_eq!(result.provider, "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_in_failure_reason() {
        let slow = Arc::new(Scripted {
            delay: Some(Duration::from_secs(60)),
            ..Scripted::ok("slow", vec![1.0, 0.0])
        });
        let chain = chain_of(vec![slow])
            .with_timeouts(Duration::from_millis(100), Duration::from_secs(1));

        match chain.embed("x").await {
            Err(AlfredError::AllProvidersFailed { failures }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].reason, "operation timed out after 1s");
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let providers: Vec<Arc<dyn EmbeddingAdapter>> = vec![
            Arc::new(Scripted::ok("a", vec![1.0, 0.0])),
            Arc::new(Scripted::ok("b", vec![1.0, 0.0, 0.0])),
        ];
        assert!(matches!(
            EmbeddingChain::new(providers),
            Err(AlfredError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn batch_uses_one_provider_for_all_texts() {
        let broken = Arc::new(Scripted::failing("broken", 2));
        let good = Arc::new(Scripted::ok("good", vec![0.0, 5.0]));
        let chain = chain_of(vec![broken, good.clone()]);

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = chain.embed_batch(&texts).await.unwrap();
        assert_eq!(result.provider, "good");
        assert_eq!(result.embeddings, vec![vec![0.0, 1.0]; 3]);
        assert_eq!(good.calls(), 3);
    }

    #[tokio::test]
    async fn empty_batch_touches_no_provider() {
        let good = Arc::new(Scripted::ok("good", vec![1.0]));
        let chain = chain_of(vec![good.clone()]);
        let result = chain.embed_batch(&[]).await.unwrap();
        assert!(result.embeddings.is_empty());
        assert_eq!(good.calls(), 0);
    }

    #[tokio::test]
    async fn availability_reports_every_provider() {
        let chain = chain_of(vec![
            Arc::new(Scripted::unavailable("down", 2)),
            Arc::new(Scripted::ok("up", vec![1.0, 0.0])),
        ]);
        let statuses = chain.availability().await;
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].available);
        assert!(statuses[1].available);
        assert_eq!(chain.provider_names(), vec!["down", "up"]);
    }
}
