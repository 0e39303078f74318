// Document Pipeline
// Extraction input -> normalized, segmented, classified, scored and simplified document

use crate::models::{Clause, Document, ExtractedDocument, ExtractionInputError, RiskSummary};
use crate::services::analysis::{
    summarize_risks, ClauseClassifier, ClauseExplainer, RiskScorer, RuleTables,
};
use crate::services::clause_segmenter::ClauseSegmenter;
use crate::services::config_store::{AppConfig, ConfigurationError, ProviderConfig};
use crate::services::providers::{
    ProviderClient, ProviderEndpoint, RemoteSimplifier, RemoteTranslator, SimplificationBackend,
};
use crate::services::resilience::ProviderGates;
use crate::services::simplification::{LocalSimplifier, SimplificationOrchestrator};
use crate::services::text_processor::{normalize_text, word_count};
use crate::services::translation::{TranslationBatcher, TranslationError, TranslationJob};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Below this many clauses per worker, classification stays on the calling thread.
const PARALLEL_MIN_CHUNK: usize = 8;

pub struct DocumentPipeline {
    segmenter: ClauseSegmenter,
    annotator: Annotator,
    orchestrator: SimplificationOrchestrator,
    translator: Option<TranslationBatcher>,
}

impl DocumentPipeline {
    pub fn new(
        segmenter: ClauseSegmenter,
        rules: Arc<RuleTables>,
        orchestrator: SimplificationOrchestrator,
        translator: Option<TranslationBatcher>,
    ) -> Self {
        Self {
            segmenter,
            annotator: Annotator {
                classifier: ClauseClassifier::new(Arc::clone(&rules)),
                scorer: RiskScorer::new(Arc::clone(&rules)),
                explainer: ClauseExplainer::new(rules),
            },
            orchestrator,
            translator,
        }
    }

    /// Build the pipeline from configuration. `offline` keeps every call local:
    /// simplification uses only the substitution rules and translation is off.
    pub fn from_config(config: &AppConfig, offline: bool) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let rules = RuleTables::load(config.rules.as_ref())?;
        let segmenter = ClauseSegmenter::new(config.segmentation.clone());
        let local = LocalSimplifier::new(Arc::clone(&rules));

        if offline {
            info!("[pipeline] offline mode, local rules only");
            return Ok(Self::new(
                segmenter,
                rules,
                SimplificationOrchestrator::local_only(local),
                None,
            ));
        }

        let simp = &config.simplification;
        let client = ProviderClient::from_proxy_config(config.proxy.as_ref(), simp.request_timeout())
            .map_err(|e| ConfigurationError::InvalidSetting {
                field: "proxy",
                reason: e.to_string(),
            })?;
        let client = Arc::new(client);
        let gates = Arc::new(ProviderGates::from_config(config));

        let remote = |slot: &str, provider: &ProviderConfig| {
            if !provider.enabled {
                info!("[pipeline] {} provider disabled", slot);
                return None;
            }
            let endpoint = ProviderEndpoint::resolve(provider, config);
            if endpoint.api_key.is_none() {
                warn!(
                    "[pipeline] no API key for {} provider '{}', calls will fail over",
                    slot, endpoint.name
                );
            }
            let backend: Arc<dyn SimplificationBackend> =
                Arc::new(RemoteSimplifier::new(Arc::clone(&client), endpoint));
            Some(backend)
        };
        let orchestrator = SimplificationOrchestrator::new(
            remote("primary", &simp.primary),
            remote("secondary", &simp.secondary),
            Arc::clone(&gates),
            local,
            simp.request_timeout(),
        );

        let tcfg = &config.translation;
        let translator = if tcfg.provider.enabled {
            let endpoint = ProviderEndpoint::resolve(&tcfg.provider, config);
            Some(TranslationBatcher::new(
                Arc::new(RemoteTranslator::new(Arc::clone(&client), endpoint)),
                Arc::clone(&gates.translation),
                tcfg.request_timeout(),
            ))
        } else {
            None
        };

        Ok(Self::new(segmenter, rules, orchestrator, translator))
    }

    pub fn orchestrator(&self) -> &SimplificationOrchestrator {
        &self.orchestrator
    }

    pub fn translator(&self) -> Option<&TranslationBatcher> {
        self.translator.as_ref()
    }

    /// Normalize, segment, classify, rate, explain and score. No network access.
    pub fn analyze(&self, input: ExtractedDocument) -> Document {
        let started = Instant::now();
        let id = input
            .document_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let page_count = input.pages.as_ref().map(Vec::len);

        let text = normalize_text(&input.raw_text);
        let input_warning = if input.raw_text.trim().is_empty() {
            Some(ExtractionInputError::EmptyText)
        } else if text.is_empty() {
            Some(ExtractionInputError::Unreadable)
        } else {
            None
        };
        if let Some(w) = &input_warning {
            warn!("[pipeline] document {}: {}", id, w);
        }

        let (strategy, spans) = self.segmenter.segment_with_strategy(&text);
        let mut clauses: Vec<Clause> = if spans.is_empty() {
            vec![Clause::from_span(0, 0, 0, String::new())]
        } else {
            spans
                .into_iter()
                .enumerate()
                .map(|(index, span)| Clause::from_span(index, span.start, span.end, span.text))
                .collect()
        };

        self.annotate(&mut clauses);

        info!(
            "[pipeline] document {} analyzed: chars={} words={} clauses={} strategy={:?} elapsed={}ms",
            id,
            text.len(),
            word_count(&text),
            clauses.len(),
            strategy,
            started.elapsed().as_millis()
        );

        Document {
            id,
            text,
            clauses,
            strategy,
            input_warning,
            page_count,
            created_at: Utc::now(),
        }
    }

    /// Annotate every clause, spreading large documents over scoped threads.
    fn annotate(&self, clauses: &mut [Clause]) {
        let annotator = &self.annotator;
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(clauses.len() / PARALLEL_MIN_CHUNK)
            .max(1);

        if workers == 1 {
            clauses
                .iter_mut()
                .for_each(|c| annotator.annotate(c));
            return;
        }

        let chunk = clauses.len().div_ceil(workers);
        std::thread::scope(|s| {
            for part in clauses.chunks_mut(chunk) {
                s.spawn(move || {
                    part.iter_mut()
                        .for_each(|c| annotator.annotate(c))
                });
            }
        });
    }

    /// Full run: analysis followed by simplification of every clause.
    pub async fn process(&self, input: ExtractedDocument) -> Document {
        let mut document = self.analyze(input);
        self.orchestrator.simplify_document(&mut document).await;
        document
    }

    /// Queue the document's clauses for translation. Uses simplified text where present.
    pub fn start_translation(
        &self,
        document: &Document,
        language: &str,
    ) -> Result<TranslationJob, TranslationError> {
        let job = TranslationJob::from_document(document, language)?;
        info!(
            "[pipeline] translation job {} queued: lang={} items={}",
            job.id(),
            job.language().code,
            job.total()
        );
        Ok(job)
    }

    pub fn summary(&self, document: &Document) -> RiskSummary {
        summarize_risks(&document.clauses)
    }
}

struct Annotator {
    classifier: ClauseClassifier,
    scorer: RiskScorer,
    explainer: ClauseExplainer,
}

impl Annotator {
    fn annotate(&self, clause: &mut Clause) {
        clause.category = self.classifier.classify(&clause.text);
        clause.importance = self.explainer.importance(&clause.text);
        clause.explanation = Some(self.explainer.explain(&clause.text, clause.category));
        clause.risk = Some(self.scorer.score(&clause.text, clause.category));
    }
}
