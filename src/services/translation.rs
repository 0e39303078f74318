// Translation Batcher
// Rate-limited, resumable clause translation jobs

use crate::models::{
    Document, TranslationItemResult, TranslationOutcome, TranslationProgress, TranslationState,
};
use crate::services::providers::{ProviderError, TranslationBackend};
use crate::services::resilience::RateLimiter;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Unsupported target language: {0}")]
    UnsupportedLanguage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
}

static SUPPORTED_LANGUAGES: &[Language] = &[
    Language { code: "hi", name: "Hindi", native_name: "हिंदी" },
    Language { code: "ta", name: "Tamil", native_name: "தமிழ்" },
    Language { code: "te", name: "Telugu", native_name: "తెలుగు" },
    Language { code: "bn", name: "Bengali", native_name: "বাংলা" },
    Language { code: "mr", name: "Marathi", native_name: "मराठी" },
    Language { code: "gu", name: "Gujarati", native_name: "ગુજરાતી" },
    Language { code: "kn", name: "Kannada", native_name: "ಕನ್ನಡ" },
    Language { code: "ml", name: "Malayalam", native_name: "മലയാളം" },
    Language { code: "pa", name: "Punjabi", native_name: "ਪੰਜਾਬੀ" },
    Language { code: "ur", name: "Urdu", native_name: "اردو" },
    Language { code: "or", name: "Odia", native_name: "ଓଡ଼ିଆ" },
    Language { code: "as", name: "Assamese", native_name: "অসমীয়া" },
];

pub fn supported_languages() -> &'static [Language] {
    SUPPORTED_LANGUAGES
}

/// Look up a language by code or English name, ignoring case.
pub fn find_language(code_or_name: &str) -> Option<&'static Language> {
    let wanted = code_or_name.trim();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(wanted) || l.name.eq_ignore_ascii_case(wanted))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationItem {
    pub clause_index: usize,
    pub text: String,
}

/// Cloneable cancel signal for a running job.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Queue of clause texts for one target language.
///
/// `completed()` is the resume point: items before it are never sent again.
#[derive(Debug)]
pub struct TranslationJob {
    id: String,
    language: &'static Language,
    items: Vec<TranslationItem>,
    cursor: usize,
    failed: usize,
    outcomes: Vec<TranslationOutcome>,
    cancel: CancelHandle,
}

impl TranslationJob {
    pub fn new(language: &str, items: Vec<TranslationItem>) -> Result<Self, TranslationError> {
        let language = find_language(language)
            .ok_or_else(|| TranslationError::UnsupportedLanguage(language.to_string()))?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            language,
            items,
            cursor: 0,
            failed: 0,
            outcomes: Vec::new(),
            cancel: CancelHandle::default(),
        })
    }

    /// One item per clause in document order, preferring the simplified text.
    pub fn from_document(document: &Document, language: &str) -> Result<Self, TranslationError> {
        let items = document
            .clauses
            .iter()
            .map(|c| TranslationItem {
                clause_index: c.index,
                text: c.simplified_text().unwrap_or(&c.text).to_string(),
            })
            .collect();
        Self::new(language, items)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &'static Language {
        self.language
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn completed(&self) -> usize {
        self.cursor
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn outcomes(&self) -> &[TranslationOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<TranslationOutcome> {
        self.outcomes
    }

    pub fn state(&self) -> TranslationState {
        if self.is_complete() {
            TranslationState::Completed
        } else if self.is_cancelled() {
            TranslationState::Cancelled
        } else if self.cursor == 0 {
            TranslationState::Pending
        } else {
            TranslationState::Running
        }
    }

    pub fn progress(&self) -> TranslationProgress {
        TranslationProgress {
            job_id: self.id.clone(),
            target_language: self.language.code.to_string(),
            completed: self.cursor,
            failed: self.failed,
            total: self.items.len(),
            state: self.state(),
        }
    }

    fn pending_item(&self) -> Option<&TranslationItem> {
        self.items.get(self.cursor)
    }

    fn record(&mut self, outcome: TranslationOutcome) {
        if outcome.is_error() {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
        self.cursor += 1;
    }
}

pub struct TranslationBatcher {
    backend: Arc<dyn TranslationBackend>,
    limiter: Arc<RateLimiter>,
    request_timeout: Duration,
}

impl TranslationBatcher {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        limiter: Arc<RateLimiter>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            limiter,
            request_timeout,
        }
    }

    /// Translate the next pending item of the job.
    ///
    /// Returns `None` once the job is complete or cancelled.
    pub async fn next(&self, job: &mut TranslationJob) -> Option<TranslationOutcome> {
        if job.is_cancelled() {
            return None;
        }
        let item = job.pending_item()?.clone();

        let result = if item.text.trim().is_empty() {
            Ok(String::new())
        } else {
            let _permit = self.limiter.acquire().await;
            // the wait for a slot can be long; honor a cancel that arrived meanwhile
            if job.is_cancelled() {
                return None;
            }
            match tokio::time::timeout(
                self.request_timeout,
                self.backend.translate(&item.text, job.language.code),
            )
            .await
            {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout),
            }
        };

        let outcome = TranslationOutcome {
            clause_index: item.clause_index,
            result: match result {
                Ok(text) => TranslationItemResult::Translated { text },
                Err(e) => {
                    warn!(
                        "[translation] job={} clause={} failed: {}",
                        job.id, item.clause_index, e
                    );
                    TranslationItemResult::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            },
        };
        job.record(outcome.clone());

        if job.is_complete() {
            info!(
                "[translation] job={} lang={} completed={} failed={}",
                job.id, job.language.code, job.cursor, job.failed
            );
        }
        Some(outcome)
    }

    /// Lazy stream over the job's remaining items. Dropping it pauses the
    /// job; a later stream resumes at the first untranslated item.
    pub fn stream<'a>(
        &'a self,
        job: &'a mut TranslationJob,
    ) -> impl Stream<Item = TranslationOutcome> + 'a {
        stream::unfold(job, move |job| async move {
            let outcome = self.next(job).await?;
            Some((outcome, job))
        })
    }

    /// Translate up to `max_items` pending items.
    pub async fn run_batch(&self, job: &mut TranslationJob, max_items: usize) -> Vec<TranslationOutcome> {
        let mut out = Vec::new();
        while out.len() < max_items {
            match self.next(job).await {
                Some(outcome) => out.push(outcome),
                None => break,
            }
        }
        out
    }

    /// Translate everything that is still pending.
    pub async fn run(&self, job: &mut TranslationJob) -> Vec<TranslationOutcome> {
        self.run_batch(job, usize::MAX).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::AtomicUsize;

    struct EchoTranslator {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl EchoTranslator {
        fn new(fail_on: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                fail_on,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationBackend for EchoTranslator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn translate(&self, text: &str, language: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(text) {
                return Err(ProviderError::Unavailable {
                    status: Some(500),
                    message: "boom".to_string(),
                });
            }
            Ok(format!("[{}] {}", language, text))
        }
    }

    fn items(n: usize) -> Vec<TranslationItem> {
        (0..n)
            .map(|i| TranslationItem {
                clause_index: i,
                text: format!("clause {}", i),
            })
            .collect()
    }

    fn batcher(backend: Arc<EchoTranslator>) -> TranslationBatcher {
        TranslationBatcher::new(
            backend,
            Arc::new(RateLimiter::new("translation", 1, Duration::ZERO)),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_language_lookup() {
        assert_eq!(find_language("hi").map(|l| l.name), Some("Hindi"));
        assert_eq!(find_language(" TAMIL ").map(|l| l.code), Some("ta"));
        assert!(find_language("klingon").is_none());
        assert_eq!(supported_languages().len(), 12);
    }

    #[test]
    fn test_unsupported_language_rejected_at_creation() {
        let err = TranslationJob::new("xx", items(1)).unwrap_err();
        assert_eq!(err, TranslationError::UnsupportedLanguage("xx".to_string()));
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort_job() {
        let backend = EchoTranslator::new(Some("clause 2"));
        let b = batcher(backend.clone());
        let mut job = TranslationJob::new("hindi", items(5)).unwrap();

        let outcomes = b.run(&mut job).await;
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.is_error()).count(), 1);
        assert!(outcomes[2].is_error());
        assert_eq!(outcomes[0].translated_text(), Some("[hi] clause 0"));

        let progress = job.progress();
        assert_eq!(progress.completed, 5);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.state, TranslationState::Completed);
    }

    #[tokio::test]
    async fn test_stream_is_lazy_and_resumable() {
        let backend = EchoTranslator::new(None);
        let b = batcher(backend.clone());
        let mut job = TranslationJob::new("ta", items(5)).unwrap();

        let first: Vec<_> = b.stream(&mut job).take(2).collect().await;
        assert_eq!(first.len(), 2);
        assert_eq!(backend.calls(), 2);
        assert_eq!(job.progress().state, TranslationState::Running);

        let rest: Vec<_> = b.stream(&mut job).collect().await;
        assert_eq!(rest.iter().map(|o| o.clause_index).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(backend.calls(), 5);
        assert_eq!(job.outcomes().len(), 5);
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_items() {
        let backend = EchoTranslator::new(None);
        let b = batcher(backend.clone());
        let mut job = TranslationJob::new("bn", items(5)).unwrap();
        let handle = job.cancel_handle();

        let done = b.run_batch(&mut job, 2).await;
        assert_eq!(done.len(), 2);
        handle.cancel();

        assert!(b.run(&mut job).await.is_empty());
        assert_eq!(backend.calls(), 2);
        assert_eq!(job.outcomes().len(), 2);
        assert_eq!(job.progress().state, TranslationState::Cancelled);
    }

    #[tokio::test]
    async fn test_empty_text_is_not_sent() {
        let backend = EchoTranslator::new(None);
        let b = batcher(backend.clone());
        let mut job = TranslationJob::new(
            "ur",
            vec![TranslationItem {
                clause_index: 0,
                text: "  ".to_string(),
            }],
        )
        .unwrap();
        let outcomes = b.run(&mut job).await;
        assert_eq!(outcomes[0].translated_text(), Some(""));
        assert_eq!(backend.calls(), 0);
    }
}
