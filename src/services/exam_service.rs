use crate::error::Result;
use crate::middleware::telemetry::TokenUsage;
use crate::models::exam::{Exam, Question};
use crate::repository::exam_repo::ExamRepository;
use crate::services::ai_client::{ModelClient, ResponseFormat};
use crate::services::bank_service::{ensure_unique, BankStore, EXPECTED_OPTIONS};
use crate::services::prompt_service::PromptBuilder;
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;

fn default_mix() -> IndexMap<String, usize> {
    IndexMap::from([
        ("easy".to_string(), 4),
        ("medium".to_string(), 4),
        ("hard".to_string(), 2),
    ])
}

/// Assembles exams from the question bank, topping the bank up through the
/// model when sampling comes up short. The bank doubles as cache and corpus:
/// once a track has enough questions, exam creation is pure-local.
#[derive(Clone)]
pub struct ExamService<C> {
    bank: BankStore,
    repo: ExamRepository,
    model: Arc<C>,
    prompts: PromptBuilder,
}

impl<C: ModelClient> ExamService<C> {
    pub fn new(bank: BankStore, repo: ExamRepository, model: Arc<C>) -> Self {
        Self {
            bank,
            repo,
            model,
            prompts: PromptBuilder::new(),
        }
    }

    pub async fn create_exam(
        &self,
        track: &str,
        language: &str,
        count: usize,
        mix: Option<&IndexMap<String, usize>>,
        usage: &TokenUsage,
    ) -> Result<Arc<Exam>> {
        // Defensive dedupe: the cached bank is normally already unique.
        let mut bank = ensure_unique(self.bank.get(track, language).await);
        let mut selected = sample_balanced(&bank, count, mix);

        if selected.len() < count {
            let missing = count - selected.len();
            let system = self.prompts.exam_system_prompt();
            let user = self.prompts.exam_user_prompt(track, missing);

            match self
                .model
                .chat_json(&system, &user, ResponseFormat::CompactQuestions, None)
                .await
            {
                Ok(reply) => {
                    usage.add(reply.tokens_in, reply.tokens_out);
                    let generated: Vec<Question> =
                        serde_json::from_str(&reply.content).unwrap_or_default();
                    for q in generated {
                        if !has_expected_options(&q.options) {
                            continue;
                        }
                        bank.push(q);
                    }
                    bank = ensure_unique(bank);
                    selected = sample_balanced(&bank, count, mix);
                    self.bank.replace(track, language, bank).await;
                }
                Err(e) => {
                    warn!(error = ?e, "Falha ao gerar questões via LLM; usando fallback do banco.");
                    // Pad by cyclically repeating what was sampled, index
                    // modulo the sampled size.
                    let base = selected.len();
                    while selected.len() < count && base > 0 {
                        let next = selected[selected.len() % base].clone();
                        selected.push(next);
                    }
                    if selected.is_empty() {
                        warn!("Nenhuma questão disponível após tentar gerar com IA. Adicionando questão placeholder.");
                        selected.push(placeholder_question());
                    }
                }
            }
        }

        let questions = renumber(selected);
        let exam = Exam::new(track.to_string(), language.to_string(), questions);
        Ok(self.repo.save_exam(exam).await)
    }
}

fn has_expected_options(options: &BTreeMap<String, String>) -> bool {
    options.len() == 4 && EXPECTED_OPTIONS.iter().all(|k| options.contains_key(*k))
}

/// Draws up to `count` questions honoring the difficulty mix, bucket by
/// bucket in the mix's own key order, then tops up from the unchosen
/// remainder. Returns short only when the bank itself is short.
pub fn sample_balanced(
    bank: &[Question],
    count: usize,
    mix: Option<&IndexMap<String, usize>>,
) -> Vec<Question> {
    if bank.is_empty() {
        return Vec::new();
    }
    let default = default_mix();
    let mix = mix.unwrap_or(&default);

    let mut rng = rand::thread_rng();
    let mut chosen: HashSet<usize> = HashSet::new();
    let mut order: Vec<usize> = Vec::new();

    for (difficulty, want) in mix {
        let mut pool: Vec<usize> = bank
            .iter()
            .enumerate()
            .filter(|(idx, q)| {
                !chosen.contains(idx) && q.difficulty.eq_ignore_ascii_case(difficulty)
            })
            .map(|(idx, _)| idx)
            .collect();
        pool.shuffle(&mut rng);
        for idx in pool.into_iter().take(*want) {
            chosen.insert(idx);
            order.push(idx);
        }
    }

    if order.len() < count {
        let mut remaining: Vec<usize> = (0..bank.len()).filter(|i| !chosen.contains(i)).collect();
        remaining.shuffle(&mut rng);
        for idx in remaining.into_iter().take(count - order.len()) {
            chosen.insert(idx);
            order.push(idx);
        }
    }

    order.truncate(count);
    order.into_iter().map(|idx| bank[idx].clone()).collect()
}

/// Sequential Q1..Qn ids, regardless of what the questions carried before.
pub fn renumber(questions: Vec<Question>) -> Vec<Question> {
    questions
        .into_iter()
        .enumerate()
        .map(|(i, mut q)| {
            q.id = format!("Q{}", i + 1);
            q
        })
        .collect()
}

fn placeholder_question() -> Question {
    Question {
        id: "Q1".to_string(),
        stem: "Placeholder: nenhuma questão disponível (verifique seeds ou configuração da IA)."
            .to_string(),
        options: BTreeMap::from([
            ("A".to_string(), "Opção A".to_string()),
            ("B".to_string(), "Opção B".to_string()),
            ("C".to_string(), "Opção C".to_string()),
            ("D".to_string(), "Opção D".to_string()),
        ]),
        correct_option: "A".to_string(),
        difficulty: "easy".to_string(),
        objective_refs: vec!["Placeholder".to_string()],
    }
}
