use bytes::Bytes;
use thiserror::Error;
use tracing::{info, instrument};

use crate::analysis::{with_retry, AnalysisResult, AnalyzeError, NutritionModel, DEFAULT_MAX_ATTEMPTS};
use crate::history::{HistoryStore, MealRecord, MealType};
use crate::imaging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Analysis,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Capturing,
    Captured,
    Analyzing,
    Analyzed,
    Saving,
    Saved,
    Failed(FailureKind),
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("operation not valid in state {state:?}")]
    InvalidTransition { state: FlowState },

    #[error(transparent)]
    Analyze(#[from] AnalyzeError),

    #[error("failed to persist meal record: {0}")]
    Persist(anyhow::Error),
}

/// One capture→analyze→save flow, sequenced by an explicit state machine
/// rather than ad hoc flags. A failed analysis keeps the captured image so
/// the user can retry without recapturing; `reset` is the only way to drop
/// held resources early.
///
/// A single flow runs at a time; there is no internal locking and reentrant
/// calls are rejected as invalid transitions.
pub struct MealFlow {
    state: FlowState,
    image: Option<Bytes>,
    result: Option<AnalysisResult>,
}

impl Default for MealFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl MealFlow {
    pub fn new() -> Self {
        Self {
            state: FlowState::Idle,
            image: None,
            result: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn captured_image(&self) -> Option<&Bytes> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn begin_capture(&mut self) -> Result<(), FlowError> {
        match self.state {
            FlowState::Idle => {
                self.state = FlowState::Capturing;
                Ok(())
            }
            state => Err(FlowError::InvalidTransition { state }),
        }
    }

    pub fn captured(&mut self, image: Bytes) -> Result<(), FlowError> {
        match self.state {
            FlowState::Capturing => {
                self.image = Some(image);
                self.state = FlowState::Captured;
                Ok(())
            }
            state => Err(FlowError::InvalidTransition { state }),
        }
    }

    /// Compresses the upload variant and asks the model for nutrition,
    /// retrying transient failures with backoff. Valid from `Captured`,
    /// after a previous analysis (`Analyzed`), or to retry a failed one.
    #[instrument(skip_all)]
    pub async fn analyze(
        &mut self,
        model: &dyn NutritionModel,
    ) -> Result<AnalysisResult, FlowError> {
        match self.state {
            FlowState::Captured
            | FlowState::Analyzed
            | FlowState::Failed(FailureKind::Analysis) => {}
            state => return Err(FlowError::InvalidTransition { state }),
        }
        let image = match self.image.as_ref() {
            Some(image) => image.clone(),
            None => return Err(FlowError::InvalidTransition { state: self.state }),
        };

        self.state = FlowState::Analyzing;
        let upload = imaging::resize(
            &image,
            imaging::UPLOAD_MAX_DIMENSION,
            imaging::UPLOAD_QUALITY,
        );
        info!(
            original_bytes = image.len(),
            upload_bytes = upload.len(),
            "analyzing meal photo"
        );

        match with_retry(|| model.analyze(upload.clone()), DEFAULT_MAX_ATTEMPTS).await {
            Ok(result) => {
                info!(food = %result.food_name, calories = result.calories, "analysis complete");
                self.result = Some(result.clone());
                self.state = FlowState::Analyzed;
                Ok(result)
            }
            Err(e) => {
                // Keep the captured image in place for a retry.
                self.state = FlowState::Failed(FailureKind::Analysis);
                Err(e.into())
            }
        }
    }

    /// Compresses the storage variant, builds the immutable record and
    /// persists it. Valid from `Analyzed` or to retry a failed save.
    #[instrument(skip_all)]
    pub async fn save(
        &mut self,
        store: &HistoryStore,
        meal_type: Option<MealType>,
    ) -> Result<MealRecord, FlowError> {
        match self.state {
            FlowState::Analyzed | FlowState::Failed(FailureKind::Save) => {}
            state => return Err(FlowError::InvalidTransition { state }),
        }
        let (image, result) = match (self.image.as_ref(), self.result.as_ref()) {
            (Some(image), Some(result)) => (image.clone(), result.clone()),
            _ => return Err(FlowError::InvalidTransition { state: self.state }),
        };

        self.state = FlowState::Saving;
        let stored = imaging::resize(
            &image,
            imaging::STORAGE_MAX_DIMENSION,
            imaging::STORAGE_QUALITY,
        );
        let record = MealRecord::new(stored, result, meal_type);

        match store.save(record.clone()).await {
            Ok(outcome) => {
                info!(id = %record.id, kept = outcome.kept, degraded = outcome.degraded, "meal saved");
                self.state = FlowState::Saved;
                Ok(record)
            }
            Err(e) => {
                self.state = FlowState::Failed(FailureKind::Save);
                Err(FlowError::Persist(e))
            }
        }
    }

    /// Returns to `Idle`, releasing the captured image and any result on
    /// every exit path, abandonment included.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Macros;
    use crate::history::MemorySlot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn salad() -> AnalysisResult {
        AnalysisResult {
            food_name: "Grilled Chicken Salad".into(),
            calories: 420,
            serving_size: "1 large bowl".into(),
            macros: Macros {
                protein: 38,
                carbs: 12,
                fat: 18,
                fiber: 5,
            },
            health_analysis: "High protein, low carb.".into(),
            rating: 8,
        }
    }

    struct FixedModel(AnalysisResult);

    #[async_trait]
    impl NutritionModel for FixedModel {
        async fn analyze(&self, _image: Bytes) -> Result<AnalysisResult, AnalyzeError> {
            Ok(self.0.clone())
        }
    }

    /// Fails `failures` times with the given transient error, then succeeds.
    struct FlakyModel {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NutritionModel for FlakyModel {
        async fn analyze(&self, _image: Bytes) -> Result<AnalysisResult, AnalyzeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(AnalyzeError::QuotaExceeded("later".into()))
            } else {
                Ok(salad())
            }
        }
    }

    fn memory_store() -> HistoryStore {
        HistoryStore::new(Arc::new(MemorySlot::new()))
    }

    fn photo() -> Bytes {
        Bytes::from_static(b"not-really-a-jpeg-but-passes-through")
    }

    #[tokio::test]
    async fn end_to_end_capture_analyze_save() {
        let model = FixedModel(salad());
        let store = memory_store();

        let mut flow = MealFlow::new();
        flow.begin_capture().unwrap();
        flow.captured(photo()).unwrap();
        let result = flow.analyze(&model).await.unwrap();
        assert_eq!(result, salad());
        assert_eq!(flow.state(), FlowState::Analyzed);

        let record = flow.save(&store, Some(MealType::Lunch)).await.unwrap();
        assert_eq!(flow.state(), FlowState::Saved);

        let all = store.load_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], record);
        assert_eq!(all[0].result, salad());
        assert_eq!(all[0].result.macros.protein, 38);
        assert_eq!(all[0].meal_type, Some(MealType::Lunch));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_recovered_inside_analyze() {
        let model = FlakyModel {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let mut flow = MealFlow::new();
        flow.begin_capture().unwrap();
        flow.captured(photo()).unwrap();
        let result = flow.analyze(&model).await.unwrap();
        assert_eq!(result.calories, 420);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_analysis_keeps_image_and_allows_retry() {
        let persistent = FlakyModel {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let mut flow = MealFlow::new();
        flow.begin_capture().unwrap();
        flow.captured(photo()).unwrap();

        let err = flow.analyze(&persistent).await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Analyze(AnalyzeError::RetriesExhausted { .. })
        ));
        assert_eq!(flow.state(), FlowState::Failed(FailureKind::Analysis));
        assert!(flow.captured_image().is_some());

        // A retry against a healthy model succeeds without recapturing.
        let result = flow.analyze(&FixedModel(salad())).await.unwrap();
        assert_eq!(result.rating, 8);
        assert_eq!(flow.state(), FlowState::Analyzed);
    }

    #[tokio::test]
    async fn invalid_transitions_rejected() {
        let mut flow = MealFlow::new();
        assert!(matches!(
            flow.captured(photo()),
            Err(FlowError::InvalidTransition {
                state: FlowState::Idle
            })
        ));
        assert!(matches!(
            flow.analyze(&FixedModel(salad())).await,
            Err(FlowError::InvalidTransition { .. })
        ));
        assert!(matches!(
            flow.save(&memory_store(), None).await,
            Err(FlowError::InvalidTransition { .. })
        ));

        flow.begin_capture().unwrap();
        assert!(matches!(
            flow.begin_capture(),
            Err(FlowError::InvalidTransition {
                state: FlowState::Capturing
            })
        ));
    }

    #[tokio::test]
    async fn reset_releases_everything_from_any_state() {
        let mut flow = MealFlow::new();
        flow.begin_capture().unwrap();
        flow.captured(photo()).unwrap();
        flow.analyze(&FixedModel(salad())).await.unwrap();

        flow.reset();
        assert_eq!(flow.state(), FlowState::Idle);
        assert!(flow.captured_image().is_none());
        assert!(flow.result().is_none());
        flow.begin_capture().unwrap();
    }

    #[tokio::test]
    async fn bad_request_surfaces_without_retry() {
        struct RejectingModel(AtomicU32);

        #[async_trait]
        impl NutritionModel for RejectingModel {
            async fn analyze(&self, _image: Bytes) -> Result<AnalysisResult, AnalyzeError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(AnalyzeError::BadRequest("unreadable image".into()))
            }
        }

        let model = RejectingModel(AtomicU32::new(0));
        let mut flow = MealFlow::new();
        flow.begin_capture().unwrap();
        flow.captured(photo()).unwrap();
        let err = flow.analyze(&model).await.unwrap_err();
        assert!(matches!(err, FlowError::Analyze(AnalyzeError::BadRequest(_))));
        assert_eq!(model.0.load(Ordering::SeqCst), 1);
    }
}
