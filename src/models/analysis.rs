use serde::{Deserialize, Serialize};

/// Feedback report for one submission. Derived from local grading plus the
/// model's explanations; correctness flags always come from local grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub score: i32,
    pub per_question: Vec<PerQuestionAnalysis>,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub study_plan: Vec<StudyPlanItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerQuestionAnalysis {
    pub question_id: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub objective_refs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlanItem {
    pub topic: String,
    pub why: String,
    pub resources: Vec<ResourceLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub title: String,
    pub url: String,
}
