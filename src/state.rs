use std::sync::Arc;

use crate::analysis::{GeminiClient, NutritionModel};
use crate::config::AppConfig;
use crate::history::{FileSlot, HistoryStore, MemorySlot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub model: Arc<dyn NutritionModel>,
    pub history: HistoryStore,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let model = Arc::new(GeminiClient::new(&config)?) as Arc<dyn NutritionModel>;
        let history = HistoryStore::new(Arc::new(FileSlot::new(config.history_path.clone())));
        Ok(Self {
            config,
            model,
            history,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        model: Arc<dyn NutritionModel>,
        history: HistoryStore,
    ) -> Self {
        Self {
            config,
            model,
            history,
        }
    }

    /// Test state: canned model verdict and an in-memory history slot.
    pub fn fake() -> Self {
        use crate::analysis::{AnalysisResult, AnalyzeError, Macros};
        use async_trait::async_trait;
        use bytes::Bytes;

        struct CannedModel;

        #[async_trait]
        impl NutritionModel for CannedModel {
            async fn analyze(&self, _image: Bytes) -> Result<AnalysisResult, AnalyzeError> {
                Ok(AnalysisResult {
                    food_name: "Grilled Chicken Salad".into(),
                    calories: 420,
                    serving_size: "1 large bowl".into(),
                    macros: Macros {
                        protein: 38,
                        carbs: 12,
                        fat: 18,
                        fiber: 5,
                    },
                    health_analysis: "High protein, plenty of greens.".into(),
                    rating: 8,
                })
            }
        }

        let config = Arc::new(AppConfig {
            api_key: "test".into(),
            model: "test-model".into(),
            base_url: "http://localhost:0".into(),
            history_path: "unused".into(),
        });
        let model = Arc::new(CannedModel) as Arc<dyn NutritionModel>;
        let history = HistoryStore::new(Arc::new(MemorySlot::new()));
        Self {
            config,
            model,
            history,
        }
    }
}
