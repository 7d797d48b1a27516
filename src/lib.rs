//! Core layer of a photograph-a-meal nutrition estimator: image
//! recompression, a schema-constrained inference client with bounded retry,
//! a capacity-bounded local history store, and the state machine sequencing
//! one capture→analyze→save flow.

pub mod analysis;
pub mod config;
pub mod flow;
pub mod history;
pub mod imaging;
pub mod state;

pub use analysis::{AnalysisResult, AnalyzeError, Macros, NutritionModel};
pub use config::AppConfig;
pub use flow::{FlowError, FlowState, MealFlow};
pub use history::{HistoryStore, MealRecord, MealType, SaveOutcome};
pub use state::AppState;
