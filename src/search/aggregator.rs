use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::{
    normalize_url, AggregatedContext, AttemptOutcome, ProviderAttempt, ProviderError,
    SearchProvider,
};

/// Merges results from an ordered list of providers into one bounded,
/// deduplicated context. Holds no per-request state.
pub struct WebSearchAggregator {
    providers: Vec<Arc<dyn SearchProvider>>,
    max_documents: usize,
    provider_timeout: Duration,
}

impl WebSearchAggregator {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        max_documents: usize,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            max_documents,
            provider_timeout,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn max_documents(&self) -> usize {
        self.max_documents
    }

    /// Never fails: provider errors are recorded in the attempt log.
    pub async fn aggregate(&self, query: &str) -> AggregatedContext {
        let mut context = AggregatedContext::default();
        let mut seen: HashSet<String> = HashSet::new();

        if query.trim().is_empty() {
            tracing::debug!("search.aggregate.empty_query");
            context.attempts = self
                .providers
                .iter()
                .map(|p| skipped(p.name()))
                .collect();
            return context;
        }

        for (rank, provider) in self.providers.iter().enumerate() {
            let name = provider.name().to_string();

            if context.documents.len() >= self.max_documents {
                tracing::debug!(provider = %name, "search.provider.skipped");
                context.attempts.push(skipped(&name));
                continue;
            }

            let result = match tokio::time::timeout(
                self.provider_timeout,
                provider.search(query, self.max_documents),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.provider_timeout)),
            };

            let outcome = match result {
                Ok(documents) => {
                    let returned = documents.len();
                    let mut added = 0;
                    for mut document in documents {
                        if context.documents.len() >= self.max_documents {
                            break;
                        }
                        let Some(key) = normalize_url(&document.url) else {
                            tracing::debug!(provider = %name, url = %document.url, "search.document.dropped");
                            continue;
                        };
                        if !seen.insert(key) {
                            continue;
                        }
                        document.provider_rank = rank;
                        document.provider = name.clone();
                        context.documents.push(document);
                        added += 1;
                    }
                    tracing::info!(
                        provider = %name,
                        returned,
                        added,
                        documents = context.documents.len(),
                        "search.provider.succeeded"
                    );
                    AttemptOutcome::Succeeded { returned, added }
                }
                Err(err) => {
                    tracing::warn!(provider = %name, reason = %err, "search.provider.failed");
                    AttemptOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };

            context.attempts.push(ProviderAttempt {
                provider: name,
                outcome,
            });
        }

        if context.documents.is_empty() {
            tracing::warn!(
                providers = self.providers.len(),
                "search.aggregate.no_documents"
            );
        }

        context
    }
}

fn skipped(name: &str) -> ProviderAttempt {
    ProviderAttempt {
        provider: name.to_string(),
        outcome: AttemptOutcome::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Document;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Returns(Vec<Document>),
        Fails(&'static str),
        Hangs,
    }

    struct FakeProvider {
        name: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn returning(name: &'static str, urls: &[&str]) -> Arc<Self> {
            let documents = urls
                .iter()
                .map(|url| Document::new(*url, format!("{} result", name), "snippet"))
                .collect();
            Arc::new(Self {
                name,
                behaviour: Behaviour::Returns(documents),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str, reason: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour: Behaviour::Fails(reason),
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour: Behaviour::Hangs,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Vec<Document>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Returns(docs) => Ok(docs.clone()),
                Behaviour::Fails(reason) => Err(ProviderError::Transport(reason.to_string())),
                Behaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn dynp(provider: &Arc<FakeProvider>) -> Arc<dyn SearchProvider> {
        provider.clone()
    }

    fn aggregator(providers: Vec<Arc<dyn SearchProvider>>, max: usize) -> WebSearchAggregator {
        WebSearchAggregator::new(providers, max, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn trailing_slash_duplicates_collapse_to_first_provider() {
        let p1 = FakeProvider::returning("p1", &["http://a.com/x", "http://a.com/x/"]);
        let p2 = FakeProvider::returning("p2", &["http://a.com/x"]);
        let agg = aggregator(vec![dynp(&p1), dynp(&p2)], 5);

        let context = agg.aggregate("pythagorean theorem").await;

        assert_eq!(context.documents.len(), 1);
        assert_eq!(context.documents[0].provider, "p1");
        assert_eq!(context.documents[0].provider_rank, 0);
        assert_eq!(
            context.attempts[1].outcome,
            AttemptOutcome::Succeeded {
                returned: 1,
                added: 0
            }
        );
    }

    #[tokio::test]
    async fn path_case_variants_collapse_to_first_provider() {
        let p1 = FakeProvider::returning("p1", &["http://a.com/X"]);
        let p2 = FakeProvider::returning("p2", &["http://a.com/x/"]);
        let agg = aggregator(vec![dynp(&p1), dynp(&p2)], 5);

        let context = agg.aggregate("vectors").await;

        assert_eq!(context.documents.len(), 1);
        assert_eq!(context.documents[0].url, "http://a.com/X");
        assert_eq!(context.documents[0].provider, "p1");
    }

    #[tokio::test]
    async fn early_stop_skips_remaining_providers() {
        let p1 = FakeProvider::returning("p1", &["https://a.com/1", "https://a.com/2", "https://a.com/3"]);
        let p2 = FakeProvider::returning("p2", &["https://b.com/1"]);
        let agg = aggregator(vec![dynp(&p1), dynp(&p2)], 2);

        let context = agg.aggregate("limits").await;

        assert_eq!(context.documents.len(), 2);
        assert!(context.documents.iter().all(|d| d.provider == "p1"));
        assert_eq!(p2.calls(), 0);
        assert_eq!(context.attempts[1].outcome, AttemptOutcome::Skipped);
        assert_eq!(
            context.attempts[0].outcome,
            AttemptOutcome::Succeeded {
                returned: 3,
                added: 2
            }
        );
    }

    #[tokio::test]
    async fn timed_out_provider_is_recorded_and_next_one_used() {
        let p1 = FakeProvider::hanging("p1");
        let p2 = FakeProvider::returning("p2", &["https://b.com/derivatives"]);
        let agg = aggregator(vec![dynp(&p1), dynp(&p2)], 5);

        let context = agg.aggregate("derivative of x^2").await;

        assert_eq!(context.documents.len(), 1);
        assert_eq!(context.documents[0].provider, "p2");
        assert_eq!(context.documents[0].provider_rank, 1);
        match &context.attempts[0].outcome {
            AttemptOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(matches!(
            context.attempts[1].outcome,
            AttemptOutcome::Succeeded { returned: 1, added: 1 }
        ));
    }

    #[tokio::test]
    async fn all_providers_failing_yields_empty_context() {
        let agg = aggregator(
            vec![
                dynp(&FakeProvider::failing("p1", "connection refused")),
                dynp(&FakeProvider::failing("p2", "bad gateway")),
            ],
            5,
        );

        let context = agg.aggregate("integrals").await;

        assert!(context.is_empty());
        assert_eq!(context.attempts.len(), 2);
        assert!(context
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Failed { .. })));
    }

    #[tokio::test]
    async fn unusable_urls_are_dropped() {
        let p1 = FakeProvider::returning("p1", &["", "not a url", "https://a.com/ok"]);
        let context = aggregator(vec![dynp(&p1)], 5).aggregate("q").await;
        assert_eq!(context.documents.len(), 1);
        assert_eq!(context.documents[0].url, "https://a.com/ok");
    }

    #[tokio::test]
    async fn output_is_unique_and_bounded_for_every_ordering() {
        let lists: [&[&str]; 3] = [
            &["https://a.com/1", "https://a.com/2/", "https://b.com/1"],
            &["https://A.com/2", "https://c.com/1?ref=x", "https://a.com/1/"],
            &["https://c.com/1", "https://d.com/1", "https://e.com/1", "https://f.com/1"],
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        let names = ["p0", "p1", "p2"];

        for order in orders {
            for max in [1, 3, 5, 10] {
                let providers: Vec<Arc<dyn SearchProvider>> = order
                    .iter()
                    .map(|&i| dynp(&FakeProvider::returning(names[i], lists[i])))
                    .collect();
                let context = aggregator(providers, max).aggregate("q").await;

                assert!(context.documents.len() <= max);
                let keys: HashSet<_> = context
                    .documents
                    .iter()
                    .filter_map(|d| normalize_url(&d.url))
                    .collect();
                assert_eq!(keys.len(), context.documents.len());

                // Ranks never decrease: higher-priority documents come first.
                let ranks: Vec<_> = context.documents.iter().map(|d| d.provider_rank).collect();
                assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[tokio::test]
    async fn no_providers_means_no_documents() {
        let context = aggregator(Vec::new(), 5).aggregate("q").await;
        assert!(context.is_empty());
        assert!(context.attempts.is_empty());
    }
}
