//! Pitch Generation — orchestrates the resilient generation pipeline.
//!
//! Flow: cache lookup → credential check → attempt loop
//!       (complete → extract → usable?) → back-fill → cache store → return.
//!
//! The caller-visible contract is binary: a fully populated record or `None`.
//! Failure causes are reported through logs only.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::generation::cache::ResultCache;
use crate::generation::extractor::extract;
use crate::generation::prompts::pitch_prompts;
use crate::generation::record::PitchRecord;
use crate::llm_client::{AttemptOutcome, CompletionClient, LlmError};

/// Raw model output longer than this is truncated in debug logs.
const LOG_PREVIEW_CHARS: usize = 500;

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// Attempt budget and timing for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationPolicy {
    /// Upper bound on completion calls per generation. At least 1.
    pub max_attempts: u32,
    /// Hard wall-clock bound on a single completion call.
    pub attempt_timeout: Duration,
    /// Sleep before attempt `n` (n ≥ 2) is `n × backoff_step`.
    pub backoff_step: Duration,
    /// Optional bound on the whole attempt loop, backoff included.
    pub deadline: Option<Duration>,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(25),
            backoff_step: Duration::from_secs(1),
            deadline: None,
        }
    }
}

impl GenerationPolicy {
    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        self.backoff_step
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum GenerationState {
    Idle,
    Attempting { attempt: u32 },
    Completed(PitchRecord),
    Failed(LlmError),
}

/// Drives attempts against a `CompletionClient` and memoizes successes in the
/// injected `ResultCache`.
#[derive(Clone)]
pub struct PitchGenerator {
    client: Arc<dyn CompletionClient>,
    cache: Arc<ResultCache>,
    policy: GenerationPolicy,
}

impl PitchGenerator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        cache: Arc<ResultCache>,
        policy: GenerationPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            policy,
        }
    }

    pub fn client(&self) -> &dyn CompletionClient {
        self.client.as_ref()
    }

    /// Generates a pitch for `input`, reusing a cached record when one exists.
    ///
    /// Returns `None` on total failure: configuration error, rejected
    /// credentials, exhausted attempts or an expired deadline. A returned
    /// record never has an empty field.
    pub async fn generate(&self, input: &str) -> Option<Arc<PitchRecord>> {
        if let Some(cached) = self.cache.get(input) {
            info!("Returning cached pitch for {:?}", preview(input, 50));
            return Some(cached);
        }

        let record = match self.policy.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, self.run(input)).await {
                Ok(record) => record,
                Err(_) => {
                    warn!("Generation abandoned: deadline of {deadline:?} expired");
                    None
                }
            },
            None => self.run(input).await,
        }?;

        debug!("Final pitch:\n{}", record.to_canonical_text());
        let record = Arc::new(record);
        self.cache.put(input, Arc::clone(&record));
        debug!("Result cache holds {} pitch(es)", self.cache.len());
        Some(record)
    }

    async fn run(&self, input: &str) -> Option<PitchRecord> {
        info!("Starting pitch generation for {:?}", preview(input, 50));
        let (system, user) = pitch_prompts(input);

        let mut state = GenerationState::Idle;
        loop {
            state = match state {
                GenerationState::Completed(record) => return Some(record),
                GenerationState::Failed(cause) => {
                    warn!("Pitch generation failed: {cause}");
                    return None;
                }
                state => self.step(state, &system, &user).await,
            };
        }
    }

    async fn step(&self, state: GenerationState, system: &str, user: &str) -> GenerationState {
        match state {
            GenerationState::Idle => match self.client.check_credentials() {
                Ok(()) => GenerationState::Attempting { attempt: 1 },
                Err(e) => GenerationState::Failed(e),
            },
            GenerationState::Attempting { attempt } => {
                if attempt > 1 {
                    tokio::time::sleep(self.policy.backoff_before(attempt)).await;
                }
                info!(
                    "Calling completion service (attempt {}/{}, timeout {:?})",
                    attempt, self.policy.max_attempts, self.policy.attempt_timeout
                );

                match self
                    .client
                    .complete(system, user, self.policy.attempt_timeout)
                    .await
                {
                    AttemptOutcome::FatalFailure(e) => GenerationState::Failed(e),
                    AttemptOutcome::RetryableFailure(e) => self.retry_or_fail(attempt, e),
                    AttemptOutcome::Success(raw) => self.accept(attempt, &raw),
                }
            }
            terminal => terminal,
        }
    }

    /// Extracts the sections of a successful response. Zero recovered
    /// sections count as a retryable malformed-output failure.
    fn accept(&self, attempt: u32, raw: &str) -> GenerationState {
        debug!(
            "Raw completion (attempt {}, {} chars): {}",
            attempt,
            raw.chars().count(),
            preview(raw, LOG_PREVIEW_CHARS)
        );

        let mut record = extract(raw);
        let recovered = record.recovered_count();
        if recovered == 0 {
            warn!("Attempt {attempt}: no section recognized in the completion");
            return self.retry_or_fail(attempt, LlmError::MalformedOutput);
        }

        let backfilled = record.backfill();
        if !backfilled.is_empty() {
            warn!(
                "Only {}/6 sections recovered, back-filled {:?}",
                recovered, backfilled
            );
        }
        info!("Pitch generated on attempt {attempt} ({recovered}/6 sections recovered)");
        GenerationState::Completed(record)
    }

    fn retry_or_fail(&self, attempt: u32, cause: LlmError) -> GenerationState {
        if attempt < self.policy.max_attempts {
            warn!(
                "Attempt {}/{} failed: {}, retrying",
                attempt, self.policy.max_attempts, cause
            );
            GenerationState::Attempting {
                attempt: attempt + 1,
            }
        } else {
            warn!("All {} attempts exhausted", self.policy.max_attempts);
            GenerationState::Failed(cause)
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::generation::record::FieldKey;

    const FULL: &str = "1. [Problème] Manque d'outils\n2. [Solution] App mobile\n3. [Marché] PME\n4. [Valeur] Rapide\n5. [Canaux] Réseaux sociaux\n6. [Modèle] Abonnement";

    enum Step {
        Text(&'static str),
        Retryable,
        Fatal,
        Hang,
    }

    /// Completion client replaying a fixed script and counting calls.
    struct ScriptedClient {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        credentials: bool,
    }

    impl ScriptedClient {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
                credentials: true,
            })
        }

        fn without_credentials() -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                credentials: false,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn check_credentials(&self) -> Result<(), LlmError> {
            if self.credentials {
                Ok(())
            } else {
                Err(LlmError::MissingCredentials)
            }
        }

        async fn complete(&self, _system: &str, _user: &str, _timeout: Duration) -> AttemptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().pop_front();
            match step {
                Some(Step::Text(text)) => AttemptOutcome::Success(text.to_string()),
                Some(Step::Fatal) => AttemptOutcome::FatalFailure(LlmError::Unauthorized {
                    status: 401,
                    message: "invalid key".to_string(),
                }),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    AttemptOutcome::RetryableFailure(LlmError::Timeout(Duration::from_secs(3600)))
                }
                Some(Step::Retryable) | None => AttemptOutcome::RetryableFailure(LlmError::EmptyContent),
            }
        }
    }

    fn generator(client: Arc<ScriptedClient>, policy: GenerationPolicy) -> PitchGenerator {
        PitchGenerator::new(client, Arc::new(ResultCache::new()), policy)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt() {
        let client = ScriptedClient::new(vec![Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let record = pitches.generate("Une app pour les PME").await.unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(record.problem, "Manque d'outils");
        assert_eq!(record.model, "Abonnement");
        assert_eq!(record.raw, FULL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_stops_after_one_call() {
        let client = ScriptedClient::new(vec![Step::Fatal, Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        assert!(pitches.generate("idée").await.is_none());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credentials_makes_no_attempt() {
        let client = ScriptedClient::without_credentials();
        let pitches = generator(client.clone(), GenerationPolicy::default());

        assert!(pitches.generate("idée").await.is_none());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_never_exceed_max_attempts() {
        let client = ScriptedClient::new(vec![
            Step::Retryable,
            Step::Retryable,
            Step::Retryable,
            Step::Text(FULL),
        ]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        assert!(pitches.generate("idée").await.is_none());
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_retryable_failure() {
        let client = ScriptedClient::new(vec![Step::Retryable, Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let record = pitches.generate("idée").await.unwrap();

        assert_eq!(client.calls(), 2);
        assert!(record.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_output_is_retried() {
        let client = ScriptedClient::new(vec![
            Step::Text("Je ne peux pas vous aider."),
            Step::Text(FULL),
        ]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let record = pitches.generate("idée").await.unwrap();

        assert_eq!(client.calls(), 2);
        assert_eq!(record.solution, "App mobile");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_output_on_last_attempt_fails() {
        let client = ScriptedClient::new(vec![Step::Text("rien"), Step::Text("toujours rien")]);
        let policy = GenerationPolicy {
            max_attempts: 2,
            ..GenerationPolicy::default()
        };
        let pitches = generator(client.clone(), policy);

        assert!(pitches.generate("idée").await.is_none());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_extraction_is_backfilled() {
        let client = ScriptedClient::new(vec![Step::Text("1. Problème: pas assez d'info")]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let record = pitches.generate("idée").await.unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(record.problem, "pas assez d'info");
        for key in FieldKey::ALL.into_iter().skip(1) {
            assert_eq!(record.get(key), key.placeholder());
        }
        assert!(record.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_with_same_input_hits_cache() {
        let client = ScriptedClient::new(vec![Step::Text(FULL), Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let first = pitches.generate("Une app pour les PME").await.unwrap();
        let second = pitches.generate("  Une app pour les PME  ").await.unwrap();

        assert_eq!(client.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let client = ScriptedClient::new(vec![Step::Fatal, Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        assert!(pitches.generate("idée").await.is_none());
        assert!(pitches.generate("idée").await.is_some());
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_with_attempt_number() {
        let client = ScriptedClient::new(vec![Step::Retryable, Step::Retryable, Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let start = tokio::time::Instant::now();
        pitches.generate("idée").await.unwrap();
        let elapsed = start.elapsed();

        // 2s before attempt 2, 3s before attempt 3.
        assert!(elapsed >= Duration::from_secs(5), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_in_flight_attempt() {
        let client = ScriptedClient::new(vec![Step::Hang, Step::Text(FULL)]);
        let policy = GenerationPolicy {
            deadline: Some(Duration::from_secs(10)),
            ..GenerationPolicy::default()
        };
        let pitches = generator(client.clone(), policy);

        let start = tokio::time::Instant::now();
        assert!(pitches.generate("idée").await.is_none());

        assert_eq!(client.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_generations_are_independent() {
        let client = ScriptedClient::new(vec![Step::Text(FULL), Step::Text(FULL)]);
        let pitches = generator(client.clone(), GenerationPolicy::default());

        let (a, b) = tokio::join!(pitches.generate("projet A"), pitches.generate("projet B"));

        assert!(a.is_some() && b.is_some());
        assert_eq!(client.calls(), 2);
    }

    #[test]
    fn test_default_policy() {
        let policy = GenerationPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(25));
        assert_eq!(policy.backoff_before(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_before(3), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = GenerationPolicy {
            backoff_step: Duration::MAX,
            ..GenerationPolicy::default()
        };
        assert_eq!(policy.backoff_before(2), Duration::MAX);
        assert_eq!(policy.backoff_before(1), Duration::MAX);
    }
}
