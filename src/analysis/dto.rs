use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AnalyzeError;

/// Per-meal macronutrients in grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macros {
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
    pub fiber: u32,
}

/// The structured verdict the model must return. Every field is required:
/// serde has no defaults here, so a missing field is a parse error rather
/// than a silently zero-filled estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub food_name: String,
    pub calories: u32,
    pub serving_size: String,
    pub macros: Macros,
    pub health_analysis: String,
    pub rating: u8,
}

impl AnalysisResult {
    /// Parses the model's textual payload and validates value ranges.
    pub fn parse(text: &str) -> Result<Self, AnalyzeError> {
        let result: AnalysisResult =
            serde_json::from_str(text).map_err(|e| AnalyzeError::MalformedResult(e.to_string()))?;
        if !(1..=10).contains(&result.rating) {
            return Err(AnalyzeError::MalformedResult(format!(
                "rating {} outside 1..=10",
                result.rating
            )));
        }
        Ok(result)
    }
}

/// Response schema sent in `generationConfig.responseSchema` so the model is
/// constrained to the exact AnalysisResult shape.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "foodName": { "type": "STRING" },
            "calories": { "type": "INTEGER" },
            "servingSize": { "type": "STRING" },
            "macros": {
                "type": "OBJECT",
                "properties": {
                    "protein": { "type": "INTEGER" },
                    "carbs": { "type": "INTEGER" },
                    "fat": { "type": "INTEGER" },
                    "fiber": { "type": "INTEGER" }
                },
                "required": ["protein", "carbs", "fat", "fiber"]
            },
            "healthAnalysis": { "type": "STRING" },
            "rating": { "type": "INTEGER" }
        },
        "required": ["foodName", "calories", "servingSize", "macros", "healthAnalysis", "rating"]
    })
}

// Response envelope of the generateContent endpoint. Only the fields we
// read are modeled; everything else is ignored.

#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub text: Option<String>,
}

impl GenerateContentResponse {
    /// First textual part of the first candidate, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.text.as_deref())
    }
}
