use crate::error::Result;
use crate::middleware::telemetry::TokenUsage;
use crate::models::analysis::{AnalysisResult, PerQuestionAnalysis, ResourceLink, StudyPlanItem};
use crate::models::exam::{Exam, Question};
use crate::models::submission::Submission;
use crate::services::ai_client::{ModelClient, ResponseFormat};
use crate::services::prompt_service::PromptBuilder;
use crate::utils::tokens::estimate_tokens;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::error;

/// Wrong-item caps per analysis mode. Light keeps the prompt cheap, deep is
/// still bounded.
const LIGHT_WRONG_CAP: usize = 6;
const DEEP_WRONG_CAP: usize = 10;

/// Score at or above which a non-deep request skips the model entirely.
const SHORT_CIRCUIT_SCORE: i32 = 90;

const STUDY_RESOURCE_TITLE: &str = "Microsoft Learn";
const STUDY_RESOURCE_URL: &str = "https://learn.microsoft.com/pt-br/training/";

/// Locally graded outcome for one exam question.
#[derive(Clone, Debug)]
struct GradedQuestion {
    question_id: String,
    is_correct: bool,
    answered: bool,
    objective_refs: Vec<String>,
}

/// Grades a submission, decides whether the model is worth calling, and
/// reconciles the model's reply against local ground truth. The model is
/// trusted for explanation text only, never for correctness.
#[derive(Clone)]
pub struct FeedbackService<C> {
    model: Arc<C>,
    prompts: PromptBuilder,
    token_budget: usize,
}

impl<C: ModelClient> FeedbackService<C> {
    pub fn new(model: Arc<C>, token_budget: usize) -> Self {
        Self {
            model,
            prompts: PromptBuilder::new(),
            token_budget,
        }
    }

    pub async fn generate_feedback(
        &self,
        exam: &Exam,
        submission: &Submission,
        analysis_mode: &str,
        language: &str,
        usage: &TokenUsage,
    ) -> Result<AnalysisResult> {
        let questions_by_id: HashMap<&str, &Question> = exam
            .questions
            .iter()
            .map(|q| (q.id.as_str(), q))
            .collect();

        let mut answered_by_id: HashMap<&str, &str> = HashMap::new();
        for answer in &submission.answers {
            answered_by_id
                .entry(answer.question_id.as_str())
                .or_insert(answer.selected.as_str());
        }

        // Local correction first: every exam question is graded, answered or
        // not.
        let graded: Vec<GradedQuestion> = exam
            .questions
            .iter()
            .map(|q| {
                let selected = answered_by_id.get(q.id.as_str());
                let is_correct = selected
                    .map(|s| s.eq_ignore_ascii_case(&q.correct_option))
                    .unwrap_or(false);
                GradedQuestion {
                    question_id: q.id.clone(),
                    is_correct,
                    answered: selected.is_some(),
                    objective_refs: q.objective_refs.clone(),
                }
            })
            .collect();

        let total = graded.len();
        let correct = graded.iter().filter(|g| g.is_correct).count();
        let score = (100.0 * correct as f64 / total.max(1) as f64).round() as i32;

        // Economic mode: skip the model only on high score and no explicit
        // deep request.
        if analysis_mode != "deep" && score >= SHORT_CIRCUIT_SCORE {
            return Ok(light_result(
                score,
                &graded,
                "Excelente desempenho geral.",
            ));
        }

        let cap = if analysis_mode == "deep" {
            DEEP_WRONG_CAP
        } else {
            LIGHT_WRONG_CAP
        };
        let mut worklist: Vec<&GradedQuestion> =
            graded.iter().filter(|g| !g.is_correct).take(cap).collect();

        if worklist.is_empty() {
            return Ok(light_result(score, &graded, "Sem itens críticos a revisar."));
        }

        let system = self.prompts.analysis_system_prompt(analysis_mode);
        let user = loop {
            let wrong_questions: Vec<&Question> = worklist
                .iter()
                .filter_map(|g| questions_by_id.get(g.question_id.as_str()).copied())
                .collect();
            let wrong_pairs: Vec<(String, String)> = worklist
                .iter()
                .map(|g| {
                    let selected = answered_by_id
                        .get(g.question_id.as_str())
                        .map(|s| s.to_string())
                        .unwrap_or_default();
                    (g.question_id.clone(), selected)
                })
                .collect();

            let user = self.prompts.analysis_user_prompt(
                &wrong_questions,
                &wrong_pairs,
                language,
                analysis_mode,
            );
            if estimate_tokens(&system) + estimate_tokens(&user) <= self.token_budget
                || worklist.len() <= 1
            {
                break user;
            }
            worklist.pop();
        };

        // Transport failures propagate; only a parse failure falls back
        // locally.
        let reply = self
            .model
            .chat_json(&system, &user, ResponseFormat::JsonObject, None)
            .await?;
        usage.add(reply.tokens_in, reply.tokens_out);

        match serde_json::from_str::<AnalysisResult>(&reply.content) {
            Ok(result) => Ok(reconcile(result, score, &graded, &questions_by_id)),
            Err(e) => {
                error!(error = %e, content = %reply.content, "Falha ao desserializar resposta do modelo.");
                Ok(fallback_result(score, correct, total, &graded, &worklist))
            }
        }
    }
}

fn joined_refs(refs: &[String]) -> String {
    refs.join("; ")
}

/// Model-free result shape shared by the short-circuit and nothing-to-review
/// paths.
fn light_result(score: i32, graded: &[GradedQuestion], strength: &str) -> AnalysisResult {
    AnalysisResult {
        score,
        per_question: graded
            .iter()
            .map(|g| PerQuestionAnalysis {
                question_id: g.question_id.clone(),
                is_correct: g.is_correct,
                explanation: Some(if g.is_correct {
                    "Resposta correta.".to_string()
                } else {
                    "Revise o conceito envolvido.".to_string()
                }),
                objective_refs: Some(g.objective_refs.clone()),
            })
            .collect(),
        strengths: vec![strength.to_string()],
        gaps: Vec::new(),
        study_plan: Vec::new(),
    }
}

/// Full local synthesis for when the model's reply does not decode.
fn fallback_result(
    score: i32,
    correct: usize,
    total: usize,
    graded: &[GradedQuestion],
    worklist: &[&GradedQuestion],
) -> AnalysisResult {
    let mut gaps: Vec<String> = Vec::new();
    for g in worklist {
        let gap = joined_refs(&g.objective_refs);
        if !gaps.contains(&gap) {
            gaps.push(gap);
        }
    }

    AnalysisResult {
        score,
        per_question: graded
            .iter()
            .map(|g| PerQuestionAnalysis {
                question_id: g.question_id.clone(),
                is_correct: g.is_correct,
                explanation: Some(if g.is_correct {
                    "Resposta correta.".to_string()
                } else if g.answered {
                    "Sua resposta está incorreta; revise atentamente o objetivo associado e compare cada alternativa."
                        .to_string()
                } else {
                    "Questão não respondida; revise atentamente o objetivo associado."
                        .to_string()
                }),
                objective_refs: Some(g.objective_refs.clone()),
            })
            .collect(),
        strengths: if correct >= total / 2 {
            vec!["Conhecimento básico estabelecido.".to_string()]
        } else {
            Vec::new()
        },
        gaps,
        study_plan: worklist
            .iter()
            .map(|g| StudyPlanItem {
                topic: joined_refs(&g.objective_refs),
                why: format!("Erro na questão {}", g.question_id),
                resources: vec![ResourceLink {
                    title: STUDY_RESOURCE_TITLE.to_string(),
                    url: STUDY_RESOURCE_URL.to_string(),
                }],
            })
            .collect(),
    }
}

/// Reconciles the model's reply against ground truth: local correctness and
/// score always win, blank explanations get templated text, and the final
/// list covers every graded question exactly once.
fn reconcile(
    mut result: AnalysisResult,
    score: i32,
    graded: &[GradedQuestion],
    questions_by_id: &HashMap<&str, &Question>,
) -> AnalysisResult {
    let baseline: HashMap<&str, &GradedQuestion> = graded
        .iter()
        .map(|g| (g.question_id.as_str(), g))
        .collect();

    result.score = score;

    let mut seen: HashSet<String> = HashSet::new();
    let mut per_question: Vec<PerQuestionAnalysis> = Vec::new();
    for mut item in result.per_question {
        let Some(base) = baseline.get(item.question_id.as_str()) else {
            // The model invented a question; drop it.
            continue;
        };
        if !seen.insert(item.question_id.clone()) {
            continue;
        }

        item.is_correct = base.is_correct;
        if item.objective_refs.is_none() {
            item.objective_refs = Some(base.objective_refs.clone());
        }
        let blank = item
            .explanation
            .as_deref()
            .map(|e| e.trim().is_empty())
            .unwrap_or(true);
        if blank {
            item.explanation = Some(if item.is_correct {
                "Boa! Continue consolidando este conceito.".to_string()
            } else {
                let correct_option = questions_by_id
                    .get(item.question_id.as_str())
                    .map(|q| q.correct_option.as_str())
                    .unwrap_or("?");
                format!(
                    "Sua resposta estava incorreta. A alternativa correta é {}. Revise: {}.",
                    correct_option,
                    base.objective_refs.join(", ")
                )
            });
        }
        per_question.push(item);
    }

    // Cover anything the model left out.
    for g in graded {
        if seen.contains(&g.question_id) {
            continue;
        }
        let explanation = if g.is_correct {
            "Correto.".to_string()
        } else {
            let correct_option = questions_by_id
                .get(g.question_id.as_str())
                .map(|q| q.correct_option.as_str())
                .unwrap_or("?");
            format!(
                "Não informado pelo modelo. Correta: {}. Revise objetivos: {}.",
                correct_option,
                g.objective_refs.join(", ")
            )
        };
        per_question.push(PerQuestionAnalysis {
            question_id: g.question_id.clone(),
            is_correct: g.is_correct,
            explanation: Some(explanation),
            objective_refs: Some(g.objective_refs.clone()),
        });
    }

    result.per_question = per_question;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::submission::SubmissionAnswer;
    use crate::services::ai_client::ModelReply;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubModel {
        reply: std::result::Result<String, String>,
        calls: AtomicUsize,
        last_user_prompt: Mutex<Option<String>>,
    }

    impl StubModel {
        fn replying(content: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(content.into()),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("LLM API error 500: boom".to_string()),
                calls: AtomicUsize::new(0),
                last_user_prompt: Mutex::new(None),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_user_prompt(&self) -> String {
            self.last_user_prompt.lock().unwrap().clone().unwrap_or_default()
        }
    }

    impl ModelClient for StubModel {
        async fn chat_json(
            &self,
            _system: &str,
            user: &str,
            _format: ResponseFormat,
            _max_tokens: Option<u32>,
        ) -> Result<ModelReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_user_prompt.lock().unwrap() = Some(user.to_string());
            match &self.reply {
                Ok(content) => Ok(ModelReply {
                    content: content.clone(),
                    tokens_in: 100,
                    tokens_out: 250,
                }),
                Err(msg) => Err(Error::Model(msg.clone())),
            }
        }
    }

    fn exam_with(count: usize, stem_len: usize) -> Exam {
        let questions = (0..count)
            .map(|i| Question {
                id: format!("Q{}", i + 1),
                stem: if stem_len == 0 {
                    format!("Pergunta {}", i + 1)
                } else {
                    "x".repeat(stem_len)
                },
                options: BTreeMap::from([
                    ("A".to_string(), "um".to_string()),
                    ("B".to_string(), "dois".to_string()),
                    ("C".to_string(), "três".to_string()),
                    ("D".to_string(), "quatro".to_string()),
                ]),
                correct_option: "A".to_string(),
                difficulty: "medium".to_string(),
                objective_refs: vec![format!("AZ-900: Objetivo {}", i + 1)],
            })
            .collect();
        Exam::new("AZ-900".to_string(), "pt-BR".to_string(), questions)
    }

    /// Answers every question "A" (correct) except the listed ids, which get
    /// "B".
    fn submission_missing(exam: &Exam, wrong_ids: &[&str]) -> Submission {
        let answers = exam
            .questions
            .iter()
            .map(|q| SubmissionAnswer {
                question_id: q.id.clone(),
                selected: if wrong_ids.contains(&q.id.as_str()) {
                    "B".to_string()
                } else {
                    "a".to_string()
                },
            })
            .collect();
        Submission::new(exam.exam_id, answers)
    }

    fn service(model: Arc<StubModel>) -> FeedbackService<StubModel> {
        FeedbackService::new(model, 8_000)
    }

    #[tokio::test]
    async fn nine_of_ten_short_circuits_in_light_mode() {
        let exam = exam_with(10, 0);
        let submission = submission_missing(&exam, &["Q1"]);
        let model = StubModel::failing();
        let usage = TokenUsage::default();

        let result = service(model.clone())
            .generate_feedback(&exam, &submission, "light", "pt-BR", &usage)
            .await
            .unwrap();

        assert_eq!(result.score, 90);
        assert_eq!(model.call_count(), 0);
        assert_eq!(usage.totals(), (0, 0));

        let q1 = result
            .per_question
            .iter()
            .find(|p| p.question_id == "Q1")
            .unwrap();
        assert!(!q1.is_correct);
        assert_eq!(q1.explanation.as_deref(), Some("Revise o conceito envolvido."));
        assert_eq!(result.strengths, vec!["Excelente desempenho geral."]);
        assert!(result.gaps.is_empty());
        assert!(result.study_plan.is_empty());
    }

    #[tokio::test]
    async fn perfect_deep_run_returns_empty_gaps_without_model_call() {
        let exam = exam_with(5, 0);
        let submission = submission_missing(&exam, &[]);
        let model = StubModel::failing();

        let result = service(model.clone())
            .generate_feedback(&exam, &submission, "deep", "pt-BR", &TokenUsage::default())
            .await
            .unwrap();

        assert_eq!(result.score, 100);
        assert_eq!(model.call_count(), 0);
        assert!(result.gaps.is_empty());
        assert!(result
            .per_question
            .iter()
            .all(|p| p.explanation.as_deref() == Some("Resposta correta.")));
        assert_eq!(result.strengths, vec!["Sem itens críticos a revisar."]);
    }

    #[tokio::test]
    async fn deep_mode_ignores_the_short_circuit_and_overrides_model_claims() {
        let exam = exam_with(10, 0);
        let submission = submission_missing(&exam, &["Q1"]);

        // The model lies about score and correctness, leaves Q1's explanation
        // blank, invents Q99, repeats Q2 and omits the rest.
        let reply = serde_json::json!({
            "score": 55,
            "perQuestion": [
                { "questionId": "Q1", "isCorrect": true, "explanation": "  " },
                { "questionId": "Q2", "isCorrect": false, "explanation": "Comentário do modelo." },
                { "questionId": "Q2", "isCorrect": false, "explanation": "Duplicado." },
                { "questionId": "Q99", "isCorrect": false, "explanation": "Inventada." }
            ],
            "strengths": ["Bom domínio geral."],
            "gaps": ["AZ-900: Objetivo 1"],
            "studyPlan": []
        })
        .to_string();
        let model = StubModel::replying(reply);
        let usage = TokenUsage::default();

        let result = service(model.clone())
            .generate_feedback(&exam, &submission, "deep", "pt-BR", &usage)
            .await
            .unwrap();

        assert_eq!(model.call_count(), 1);
        assert_eq!(usage.totals(), (100, 250));
        assert_eq!(result.score, 90);

        // Every graded question exactly once, none invented.
        assert_eq!(result.per_question.len(), 10);
        let mut ids: Vec<&str> = result.per_question.iter().map(|p| p.question_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert!(!result.per_question.iter().any(|p| p.question_id == "Q99"));

        let q1 = result.per_question.iter().find(|p| p.question_id == "Q1").unwrap();
        assert!(!q1.is_correct);
        assert!(q1
            .explanation
            .as_deref()
            .unwrap()
            .starts_with("Sua resposta estava incorreta. A alternativa correta é A."));

        let q2 = result.per_question.iter().find(|p| p.question_id == "Q2").unwrap();
        assert!(q2.is_correct);
        assert_eq!(q2.explanation.as_deref(), Some("Comentário do modelo."));

        let q3 = result.per_question.iter().find(|p| p.question_id == "Q3").unwrap();
        assert_eq!(q3.explanation.as_deref(), Some("Correto."));
    }

    #[tokio::test]
    async fn unparseable_reply_synthesizes_a_local_fallback() {
        let exam = exam_with(4, 0);
        let mut submission = submission_missing(&exam, &["Q1", "Q2"]);
        // Q4 left unanswered.
        submission.answers.retain(|a| a.question_id != "Q4");

        let model = StubModel::replying("isto não é JSON");
        let result = service(model.clone())
            .generate_feedback(&exam, &submission, "light", "pt-BR", &TokenUsage::default())
            .await
            .unwrap();

        assert_eq!(result.score, 25);
        assert_eq!(result.per_question.len(), 4);

        let q1 = result.per_question.iter().find(|p| p.question_id == "Q1").unwrap();
        assert!(q1.explanation.as_deref().unwrap().contains("incorreta"));
        let q4 = result.per_question.iter().find(|p| p.question_id == "Q4").unwrap();
        assert!(!q4.is_correct);
        assert!(q4.explanation.as_deref().unwrap().contains("não respondida"));

        assert_eq!(
            result.gaps,
            vec![
                "AZ-900: Objetivo 1".to_string(),
                "AZ-900: Objetivo 2".to_string(),
                "AZ-900: Objetivo 4".to_string(),
            ]
        );
        assert_eq!(result.study_plan.len(), 3);
        assert_eq!(result.study_plan[0].why, "Erro na questão Q1");
        assert_eq!(result.study_plan[0].resources[0].title, "Microsoft Learn");
        assert!(result.strengths.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let exam = exam_with(4, 0);
        let submission = submission_missing(&exam, &["Q1", "Q2"]);
        let model = StubModel::failing();

        let err = service(model)
            .generate_feedback(&exam, &submission, "light", "pt-BR", &TokenUsage::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[tokio::test]
    async fn worklist_is_capped_per_mode() {
        let exam = exam_with(14, 0);
        let wrong: Vec<String> = (1..=12).map(|i| format!("Q{}", i)).collect();
        let wrong_refs: Vec<&str> = wrong.iter().map(|s| s.as_str()).collect();
        let submission = submission_missing(&exam, &wrong_refs);

        let model = StubModel::replying("{}");
        let _ = service(model.clone())
            .generate_feedback(&exam, &submission, "light", "pt-BR", &TokenUsage::default())
            .await
            .unwrap();
        assert_eq!(model.last_user_prompt().matches("\"id\":\"Q").count(), 6);

        let model = StubModel::replying("{}");
        let _ = service(model.clone())
            .generate_feedback(&exam, &submission, "deep", "pt-BR", &TokenUsage::default())
            .await
            .unwrap();
        assert_eq!(model.last_user_prompt().matches("\"id\":\"Q").count(), 10);
    }

    #[tokio::test]
    async fn oversized_prompts_are_trimmed_to_the_token_budget() {
        // 10 wrong questions with 5000-char stems blow well past the budget.
        let exam = exam_with(10, 5_000);
        let wrong: Vec<String> = (1..=10).map(|i| format!("Q{}", i)).collect();
        let wrong_refs: Vec<&str> = wrong.iter().map(|s| s.as_str()).collect();
        let submission = submission_missing(&exam, &wrong_refs);

        let model = StubModel::replying("{}");
        let _ = service(model.clone())
            .generate_feedback(&exam, &submission, "deep", "pt-BR", &TokenUsage::default())
            .await
            .unwrap();

        let user = model.last_user_prompt();
        let items = user.matches("\"id\":\"Q").count();
        assert!(items >= 1 && items < 10);
        assert!(estimate_tokens(&user) <= 8_000);
    }
}
