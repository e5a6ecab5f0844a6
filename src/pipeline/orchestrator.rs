use serde::Serialize;
use tracing::{info, warn};

use crate::engine::BillingConfig;
use crate::error::PipelineError;
use crate::models::{PipelineState, StageId, StageState, StageStatus, VisitStatus};
use crate::pipeline::{Phase, RetryPolicy};
use crate::stages::{
    StageCtx, run_align, run_bill, run_contract, run_diarize, run_note, run_transcribe,
};

/// Configuration for one pipeline invocation
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Statically skip diarization (and therefore alignment)
    pub skip_diarization: bool,
    /// Allow the reset to discard reviewer-adjusted billable items
    pub force_rerun: bool,
    /// Retry policy for orchestrator-level failures
    pub retry: RetryPolicy,
    /// Rule table and thresholds for the billing stage
    pub billing: BillingConfig,
}

/// The status surface external callers read
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub visit_id: String,
    pub status: VisitStatus,
    pub pipeline_state: PipelineState,
}

/// Drives one visit through transcription, diarization, alignment, billing,
/// note, and contract generation
///
/// Stage state transitions are the single source of truth for what has been
/// done to a visit; callers read them through [`Orchestrator::status`] and
/// never re-derive progress from entity tables.
pub struct Orchestrator {
    ctx: StageCtx,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(ctx: StageCtx, config: PipelineConfig) -> Self {
        Self { ctx, config }
    }

    /// Run the full pipeline for a visit, retrying bookkeeping failures
    ///
    /// Stage failures never trigger a retry; they are terminal states the
    /// reviewer resolves. Guard errors (unknown visit, adjusted items) are
    /// returned immediately.
    pub async fn run(&self, visit_id: &str) -> Result<PipelineStatus, PipelineError> {
        let mut attempt = 1;
        loop {
            match self.run_once(visit_id).await {
                Ok(()) => return self.status(visit_id),
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_attempts => {
                    warn!(
                        visit_id,
                        attempt,
                        max_attempts = self.config.retry.max_attempts,
                        "pipeline attempt failed, backing off: {e}"
                    );
                    tokio::time::sleep(self.config.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read-only status for external callers
    pub fn status(&self, visit_id: &str) -> Result<PipelineStatus, PipelineError> {
        let visit = self
            .ctx
            .store
            .visit(visit_id)
            .map_err(storage)?
            .ok_or_else(|| PipelineError::VisitNotFound(visit_id.to_string()))?;
        let pipeline_state = self.ctx.store.pipeline_state(visit_id).map_err(storage)?;

        Ok(PipelineStatus {
            visit_id: visit.visit_id,
            status: visit.status,
            pipeline_state,
        })
    }

    async fn run_once(&self, visit_id: &str) -> Result<(), PipelineError> {
        let store = self.ctx.store.clone();

        store
            .visit(visit_id)
            .map_err(storage)?
            .ok_or_else(|| PipelineError::VisitNotFound(visit_id.to_string()))?;

        // A fresh run deletes everything a previous run generated, including
        // reviewer adjustments on billable items. Refuse unless forced.
        if !self.config.force_rerun {
            let items = store.billable_items(visit_id).map_err(storage)?;
            if items.iter().any(|i| i.adjusted_minutes.is_some()) {
                return Err(PipelineError::AdjustedItemsPresent(visit_id.to_string()));
            }
        }

        // Reset: wipe generated entities, all stages back to pending
        store.clear_generated(visit_id).map_err(storage)?;
        store
            .put_pipeline_state(visit_id, PipelineState::reset())
            .map_err(storage)?;
        store
            .set_visit_status(visit_id, VisitStatus::Processing)
            .map_err(storage)?;

        let run_mark = StageState::processing();
        store
            .update_stage(visit_id, StageId::FullPipeline, run_mark.clone())
            .map_err(storage)?;
        info!(visit_id, "pipeline run started");

        // Phase 1: transcription and diarization in parallel, isolated
        let mut ingest = Phase::new("ingest").add(StageId::Transcription, {
            let ctx = self.ctx.clone();
            let visit_id = visit_id.to_string();
            async move { run_transcribe(&ctx, &visit_id).await }
        });
        if self.config.skip_diarization {
            store
                .update_stage(
                    visit_id,
                    StageId::Diarization,
                    StageState::skipped("diarization disabled by configuration"),
                )
                .map_err(storage)?;
        } else {
            ingest = ingest.add(StageId::Diarization, {
                let ctx = self.ctx.clone();
                let visit_id = visit_id.to_string();
                async move { run_diarize(&ctx, &visit_id).await }
            });
        }
        ingest.run(store.clone(), visit_id).await?;

        // Phase 2: alignment needs both phase-1 stages to have completed
        let state = store.pipeline_state(visit_id).map_err(storage)?;
        if state.status(StageId::Transcription) == StageStatus::Completed
            && state.status(StageId::Diarization) == StageStatus::Completed
        {
            Phase::new("align")
                .add(StageId::Alignment, {
                    let ctx = self.ctx.clone();
                    let visit_id = visit_id.to_string();
                    async move { run_align(&ctx, &visit_id).await }
                })
                .run(store.clone(), visit_id)
                .await?;
        } else {
            store
                .update_stage(
                    visit_id,
                    StageId::Alignment,
                    StageState::skipped("transcription and diarization did not both complete"),
                )
                .map_err(storage)?;
        }

        // Phase 3: billing first, then note and contract which read its output
        Phase::new("billing")
            .add(StageId::Billing, {
                let ctx = self.ctx.clone();
                let visit_id = visit_id.to_string();
                let billing = self.config.billing.clone();
                async move { run_bill(&ctx, &visit_id, &billing).await }
            })
            .run(store.clone(), visit_id)
            .await?;

        let state = store.pipeline_state(visit_id).map_err(storage)?;
        let transcribed = state.status(StageId::Transcription) == StageStatus::Completed;
        let billed = state.status(StageId::Billing) == StageStatus::Completed;

        let mut outputs = Phase::new("outputs");
        if transcribed && billed {
            outputs = outputs.add(StageId::Note, {
                let ctx = self.ctx.clone();
                let visit_id = visit_id.to_string();
                async move { run_note(&ctx, &visit_id).await }
            });
        } else {
            store
                .update_stage(
                    visit_id,
                    StageId::Note,
                    StageState::skipped("transcription or billing did not complete"),
                )
                .map_err(storage)?;
        }
        if billed {
            outputs = outputs.add(StageId::Contract, {
                let ctx = self.ctx.clone();
                let visit_id = visit_id.to_string();
                let billing = self.config.billing.clone();
                async move { run_contract(&ctx, &visit_id, &billing).await }
            });
        } else {
            store
                .update_stage(
                    visit_id,
                    StageId::Contract,
                    StageState::skipped("billing did not complete"),
                )
                .map_err(storage)?;
        }
        if !outputs.is_empty() {
            outputs.run(store.clone(), visit_id).await?;
        }

        // Finalize: the visit reaches review regardless of stage outcomes
        store
            .update_stage(visit_id, StageId::FullPipeline, run_mark.completed())
            .map_err(storage)?;
        store
            .set_visit_status(visit_id, VisitStatus::PendingReview)
            .map_err(storage)?;
        info!(visit_id, "pipeline run finished");

        Ok(())
    }
}

fn storage(e: anyhow::Error) -> PipelineError {
    PipelineError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::{Result, anyhow};
    use async_trait::async_trait;

    use super::*;
    use crate::models::{
        AudioAsset, AudioStatus, BillableItem, DiarizationTurn, ServiceContract,
        TranscriptSegment, Visit, VisitNote,
    };
    use crate::services::{
        Diarizer, EnrolledSpeaker, LanguageModel, SpeakerInferenceRequest, SpeechToText,
        VoiceprintMatcher,
    };
    use crate::store::{MemoryStore, VisitStore};

    struct FakeStt {
        segments: Vec<TranscriptSegment>,
        fail: bool,
    }

    #[async_trait]
    impl SpeechToText for FakeStt {
        async fn transcribe(&self, _audio_uri: &str) -> Result<Vec<TranscriptSegment>> {
            if self.fail {
                return Err(anyhow!("transcription backend unreachable"));
            }
            Ok(self.segments.clone())
        }
    }

    struct FakeDiarizer {
        turns: Vec<DiarizationTurn>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Diarizer for FakeDiarizer {
        async fn diarize(&self, _audio_uri: &str) -> Result<Vec<DiarizationTurn>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("diarization backend unreachable"));
            }
            Ok(self.turns.clone())
        }
    }

    struct FakeVoiceprint {
        names: HashMap<String, String>,
    }

    #[async_trait]
    impl VoiceprintMatcher for FakeVoiceprint {
        async fn match_speakers(
            &self,
            _audio_uri: &str,
            labels: &[String],
            _roster: &[EnrolledSpeaker],
        ) -> Result<HashMap<String, String>> {
            Ok(self
                .names
                .iter()
                .filter(|(label, _)| labels.contains(label))
                .map(|(l, n)| (l.clone(), n.clone()))
                .collect())
        }
    }

    struct FakeLlm {
        names: HashMap<String, String>,
        requests: Mutex<Vec<SpeakerInferenceRequest>>,
    }

    #[async_trait]
    impl LanguageModel for FakeLlm {
        async fn identify_speakers(
            &self,
            request: &SpeakerInferenceRequest,
        ) -> Result<HashMap<String, String>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.names.clone())
        }

        async fn draft_note(&self, _transcript: &str, _billing: &str) -> Result<VisitNote> {
            Ok(VisitNote {
                summary: "Routine visit.".to_string(),
                ..Default::default()
            })
        }

        async fn draft_contract(
            &self,
            _transcript: &str,
            _billing: &str,
            client_name: &str,
            caregiver_name: &str,
        ) -> Result<ServiceContract> {
            Ok(ServiceContract {
                client_name: client_name.to_string(),
                caregiver_name: caregiver_name.to_string(),
                schedule: Some("weekday mornings".to_string()),
                ..Default::default()
            })
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        ctx: StageCtx,
        visit_id: String,
        diarizer: Arc<FakeDiarizer>,
        llm: Arc<FakeLlm>,
    }

    fn seg(start_ms: u64, end_ms: u64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start_ms, end_ms, text)
    }

    fn turn(start_ms: u64, end_ms: u64, speaker: &str) -> DiarizationTurn {
        DiarizationTurn {
            start_ms,
            end_ms,
            speaker: speaker.to_string(),
            confidence: Some(0.9),
        }
    }

    /// Ten minutes of two-speaker dialogue with a long medication span
    fn default_segments() -> Vec<TranscriptSegment> {
        vec![
            seg(0, 2_000, "Good morning Mrs. Alvarez, it's Maria"),
            seg(2_000, 4_000, "Good morning Maria, come in"),
            seg(60_000, 420_000, "Let's sort out your medication for the week"),
            seg(430_000, 600_000, "Thank you dear, that helps"),
        ]
    }

    fn default_turns() -> Vec<DiarizationTurn> {
        vec![
            turn(0, 2_000, "SPEAKER_00"),
            turn(2_000, 4_000, "SPEAKER_01"),
            turn(60_000, 420_000, "SPEAKER_00"),
            turn(430_000, 600_000, "SPEAKER_01"),
        ]
    }

    fn fixture(
        segments: Vec<TranscriptSegment>,
        turns: Vec<DiarizationTurn>,
        stt_fail: bool,
        diarizer_fail: bool,
        with_audio: bool,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let visit = Visit::new("Rosa Alvarez", "Maria Gomez");
        let visit_id = visit.visit_id.clone();
        store.put_visit(visit).unwrap();
        if with_audio {
            store
                .put_audio_asset(AudioAsset::new(&visit_id, "visit.wav"))
                .unwrap();
        }

        let diarizer = Arc::new(FakeDiarizer {
            turns,
            fail: diarizer_fail,
            calls: AtomicUsize::new(0),
        });
        let llm = Arc::new(FakeLlm {
            names: HashMap::from([("SPEAKER_01".to_string(), "Rosa Alvarez".to_string())]),
            requests: Mutex::new(Vec::new()),
        });
        let ctx = StageCtx {
            store: store.clone(),
            stt: Arc::new(FakeStt {
                segments,
                fail: stt_fail,
            }),
            diarizer: diarizer.clone(),
            voiceprint: Arc::new(FakeVoiceprint {
                names: HashMap::from([("SPEAKER_00".to_string(), "Maria Gomez".to_string())]),
            }),
            llm: llm.clone(),
            roster: vec![EnrolledSpeaker {
                display_name: "Maria Gomez".to_string(),
                fingerprint: vec![1.0, 0.0, 0.0],
            }],
        };

        Fixture {
            store,
            ctx,
            visit_id,
            diarizer,
            llm,
        }
    }

    fn orchestrator(fx: &Fixture, config: PipelineConfig) -> Orchestrator {
        Orchestrator::new(fx.ctx.clone(), config)
    }

    #[tokio::test]
    async fn test_full_pipeline_happy_path() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        let orch = orchestrator(&fx, PipelineConfig::default());

        let status = orch.run(&fx.visit_id).await.unwrap();

        assert_eq!(status.status, VisitStatus::PendingReview);
        for id in [
            StageId::Transcription,
            StageId::Diarization,
            StageId::Alignment,
            StageId::Billing,
            StageId::Note,
            StageId::Contract,
            StageId::FullPipeline,
        ] {
            assert_eq!(
                status.pipeline_state.status(id),
                StageStatus::Completed,
                "stage {id} not completed"
            );
        }

        let items = fx.store.billable_items(&fx.visit_id).unwrap();
        assert!(items.iter().any(|i| i.category == "MED_REMINDER"));

        // Labels resolved through both sources and applied to segments
        let segments = fx.store.segments(&fx.visit_id).unwrap();
        let speakers: Vec<_> = segments.iter().filter_map(|s| s.speaker.clone()).collect();
        assert!(speakers.contains(&"Maria Gomez".to_string()));
        assert!(speakers.contains(&"Rosa Alvarez".to_string()));

        assert!(fx.store.note(&fx.visit_id).unwrap().is_some());
        let contract = fx.store.contract(&fx.visit_id).unwrap().unwrap();
        assert!(!contract.service_lines.is_empty());

        // Audio marked processed
        let audio = fx.store.latest_audio(&fx.visit_id).unwrap().unwrap();
        assert_eq!(audio.status, AudioStatus::Processed);
    }

    #[tokio::test]
    async fn test_diarize_failure_does_not_abort_siblings_or_billing() {
        let fx = fixture(default_segments(), vec![], false, true, true);
        let orch = orchestrator(&fx, PipelineConfig::default());

        let status = orch.run(&fx.visit_id).await.unwrap();
        let state = &status.pipeline_state;

        assert_eq!(state.status(StageId::Transcription), StageStatus::Completed);
        assert_eq!(state.status(StageId::Diarization), StageStatus::Failed);
        assert!(
            state
                .stage(StageId::Diarization)
                .error
                .as_deref()
                .unwrap()
                .contains("diarization")
        );
        assert_eq!(state.status(StageId::Alignment), StageStatus::Skipped);

        // Billing still runs against the unlabeled segments
        assert_eq!(state.status(StageId::Billing), StageStatus::Completed);
        let items = fx.store.billable_items(&fx.visit_id).unwrap();
        assert!(!items.is_empty());

        assert_eq!(status.status, VisitStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_skip_diarization_flag_bypasses_the_service() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        let config = PipelineConfig {
            skip_diarization: true,
            ..Default::default()
        };
        let orch = orchestrator(&fx, config);

        let status = orch.run(&fx.visit_id).await.unwrap();

        assert_eq!(fx.diarizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            status.pipeline_state.status(StageId::Diarization),
            StageStatus::Skipped
        );
        assert_eq!(
            status.pipeline_state.status(StageId::Alignment),
            StageStatus::Skipped
        );
        assert_eq!(status.status, VisitStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_missing_audio_fails_ingest_but_finishes_run() {
        let fx = fixture(default_segments(), default_turns(), false, false, false);
        let orch = orchestrator(&fx, PipelineConfig::default());

        let status = orch.run(&fx.visit_id).await.unwrap();
        let state = &status.pipeline_state;

        assert_eq!(state.status(StageId::Transcription), StageStatus::Failed);
        assert!(
            state
                .stage(StageId::Transcription)
                .error
                .as_deref()
                .unwrap()
                .contains("no audio")
        );
        assert_eq!(state.status(StageId::Alignment), StageStatus::Skipped);
        // Billing completes with an empty evidence set and zero items
        assert_eq!(state.status(StageId::Billing), StageStatus::Completed);
        assert!(fx.store.billable_items(&fx.visit_id).unwrap().is_empty());
        // The note needs transcript text; the contract only needs billing
        assert_eq!(state.status(StageId::Note), StageStatus::Skipped);
        assert_eq!(state.status(StageId::Contract), StageStatus::Completed);
        assert_eq!(status.status, VisitStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_rerun_produces_same_categories() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        let orch = orchestrator(&fx, PipelineConfig::default());

        orch.run(&fx.visit_id).await.unwrap();
        let mut first: Vec<String> = fx
            .store
            .billable_items(&fx.visit_id)
            .unwrap()
            .into_iter()
            .map(|i| i.category)
            .collect();

        orch.run(&fx.visit_id).await.unwrap();
        let mut second: Vec<String> = fx
            .store
            .billable_items(&fx.visit_id)
            .unwrap()
            .into_iter()
            .map(|i| i.category)
            .collect();

        first.sort();
        second.sort();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rerun_refused_when_items_were_adjusted() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        let orch = orchestrator(&fx, PipelineConfig::default());
        orch.run(&fx.visit_id).await.unwrap();

        // Reviewer adjusts one item
        let mut items = fx.store.billable_items(&fx.visit_id).unwrap();
        items[0].adjusted_minutes = Some(1);
        fx.store
            .replace_billable_items(&fx.visit_id, items)
            .unwrap();

        let err = orch.run(&fx.visit_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::AdjustedItemsPresent(_)));

        // Forcing discards the adjustment and runs
        let forced = orchestrator(
            &fx,
            PipelineConfig {
                force_rerun: true,
                ..Default::default()
            },
        );
        forced.run(&fx.visit_id).await.unwrap();
        let items = fx.store.billable_items(&fx.visit_id).unwrap();
        assert!(items.iter().all(|i| i.adjusted_minutes.is_none()));
    }

    #[tokio::test]
    async fn test_fingerprint_labels_never_reach_the_model() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        // The model tries to rename the fingerprint-locked label too
        fx.llm.requests.lock().unwrap().clear();
        let orch = orchestrator(&fx, PipelineConfig::default());
        orch.run(&fx.visit_id).await.unwrap();

        let requests = fx.llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        // SPEAKER_00 was resolved by voiceprint; the exclusion list holds
        assert_eq!(requests[0].labels_to_resolve, vec!["SPEAKER_01".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_transcript_yields_no_billable_items() {
        let fx = fixture(vec![], vec![], false, false, true);
        let orch = orchestrator(&fx, PipelineConfig::default());

        let status = orch.run(&fx.visit_id).await.unwrap();

        assert_eq!(
            status.pipeline_state.status(StageId::Billing),
            StageStatus::Completed
        );
        assert!(fx.store.billable_items(&fx.visit_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_visit_is_an_error() {
        let fx = fixture(default_segments(), default_turns(), false, false, true);
        let orch = orchestrator(&fx, PipelineConfig::default());

        let err = orch.run("no-such-visit").await.unwrap_err();
        assert!(matches!(err, PipelineError::VisitNotFound(_)));
    }

    /// Store wrapper whose reset fails a configured number of times
    struct FlakyStore {
        inner: MemoryStore,
        clear_failures: AtomicU32,
    }

    impl VisitStore for FlakyStore {
        fn put_visit(&self, visit: Visit) -> Result<()> {
            self.inner.put_visit(visit)
        }
        fn visit(&self, visit_id: &str) -> Result<Option<Visit>> {
            self.inner.visit(visit_id)
        }
        fn set_visit_status(&self, visit_id: &str, s: VisitStatus) -> Result<()> {
            self.inner.set_visit_status(visit_id, s)
        }
        fn put_audio_asset(&self, asset: AudioAsset) -> Result<()> {
            self.inner.put_audio_asset(asset)
        }
        fn latest_audio(&self, visit_id: &str) -> Result<Option<AudioAsset>> {
            self.inner.latest_audio(visit_id)
        }
        fn set_audio_status(&self, asset_id: &str, s: AudioStatus) -> Result<()> {
            self.inner.set_audio_status(asset_id, s)
        }
        fn replace_segments(&self, visit_id: &str, s: Vec<TranscriptSegment>) -> Result<()> {
            self.inner.replace_segments(visit_id, s)
        }
        fn segments(&self, visit_id: &str) -> Result<Vec<TranscriptSegment>> {
            self.inner.segments(visit_id)
        }
        fn replace_turns(&self, visit_id: &str, t: Vec<DiarizationTurn>) -> Result<()> {
            self.inner.replace_turns(visit_id, t)
        }
        fn turns(&self, visit_id: &str) -> Result<Vec<DiarizationTurn>> {
            self.inner.turns(visit_id)
        }
        fn apply_speaker_names(
            &self,
            visit_id: &str,
            names: &HashMap<String, String>,
        ) -> Result<usize> {
            self.inner.apply_speaker_names(visit_id, names)
        }
        fn replace_billable_items(&self, visit_id: &str, i: Vec<BillableItem>) -> Result<()> {
            self.inner.replace_billable_items(visit_id, i)
        }
        fn billable_items(&self, visit_id: &str) -> Result<Vec<BillableItem>> {
            self.inner.billable_items(visit_id)
        }
        fn put_note(&self, visit_id: &str, note: VisitNote) -> Result<()> {
            self.inner.put_note(visit_id, note)
        }
        fn note(&self, visit_id: &str) -> Result<Option<VisitNote>> {
            self.inner.note(visit_id)
        }
        fn put_contract(&self, visit_id: &str, c: ServiceContract) -> Result<()> {
            self.inner.put_contract(visit_id, c)
        }
        fn contract(&self, visit_id: &str) -> Result<Option<ServiceContract>> {
            self.inner.contract(visit_id)
        }
        fn pipeline_state(&self, visit_id: &str) -> Result<PipelineState> {
            self.inner.pipeline_state(visit_id)
        }
        fn put_pipeline_state(&self, visit_id: &str, s: PipelineState) -> Result<()> {
            self.inner.put_pipeline_state(visit_id, s)
        }
        fn update_stage(&self, visit_id: &str, id: StageId, s: StageState) -> Result<()> {
            self.inner.update_stage(visit_id, id, s)
        }
        fn clear_generated(&self, visit_id: &str) -> Result<()> {
            if self.clear_failures.load(Ordering::SeqCst) > 0 {
                self.clear_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(anyhow!("transient storage outage"));
            }
            self.inner.clear_generated(visit_id)
        }
    }

    fn flaky_fixture(clear_failures: u32) -> (Arc<FlakyStore>, StageCtx, String) {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            clear_failures: AtomicU32::new(clear_failures),
        });
        let visit = Visit::new("Rosa Alvarez", "Maria Gomez");
        let visit_id = visit.visit_id.clone();
        store.put_visit(visit).unwrap();
        store
            .put_audio_asset(AudioAsset::new(&visit_id, "visit.wav"))
            .unwrap();

        let ctx = StageCtx {
            store: store.clone(),
            stt: Arc::new(FakeStt {
                segments: default_segments(),
                fail: false,
            }),
            diarizer: Arc::new(FakeDiarizer {
                turns: default_turns(),
                fail: false,
                calls: AtomicUsize::new(0),
            }),
            voiceprint: Arc::new(FakeVoiceprint {
                names: HashMap::new(),
            }),
            llm: Arc::new(FakeLlm {
                names: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }),
            roster: vec![],
        };

        (store, ctx, visit_id)
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_bookkeeping_failures_are_retried_with_backoff() {
        let (_, ctx, visit_id) = flaky_fixture(2);
        let orch = Orchestrator::new(
            ctx,
            PipelineConfig {
                retry: fast_retry(3),
                ..Default::default()
            },
        );

        // Two transient reset failures, third attempt succeeds
        let status = orch.run(&visit_id).await.unwrap();
        assert_eq!(status.status, VisitStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (_, ctx, visit_id) = flaky_fixture(5);
        let orch = Orchestrator::new(
            ctx,
            PipelineConfig {
                retry: fast_retry(2),
                ..Default::default()
            },
        );

        let err = orch.run(&visit_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }
}
