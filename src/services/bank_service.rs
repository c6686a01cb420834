use crate::models::exam::Question;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const EXPECTED_OPTIONS: [&str; 4] = ["A", "B", "C", "D"];

/// Cache key for one question bank.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BankKey {
    pub track: String,
    pub language: String,
}

impl BankKey {
    pub fn new(track: &str, language: &str) -> Self {
        Self {
            track: track.to_string(),
            language: language.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BankStatus {
    pub track: String,
    pub language: String,
    pub total: usize,
    pub by_difficulty: BTreeMap<String, usize>,
}

/// Question bank cache keyed by (track, language). Reads hand out clones so
/// callers never alias cached data; writes replace the whole entry
/// (last writer wins).
#[derive(Clone, Default)]
pub struct BankStore {
    entries: Arc<RwLock<HashMap<BankKey, Arc<Vec<Question>>>>>,
}

impl BankStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank for the given key; an unknown key is an empty bank.
    pub async fn get(&self, track: &str, language: &str) -> Vec<Question> {
        self.entries
            .read()
            .await
            .get(&BankKey::new(track, language))
            .map(|bank| bank.as_ref().clone())
            .unwrap_or_default()
    }

    pub async fn replace(&self, track: &str, language: &str, questions: Vec<Question>) {
        self.entries
            .write()
            .await
            .insert(BankKey::new(track, language), Arc::new(questions));
    }

    /// Per-bank totals and difficulty histogram, for diagnostics.
    pub async fn status(&self) -> Vec<BankStatus> {
        let entries = self.entries.read().await;
        let mut statuses: Vec<BankStatus> = entries
            .iter()
            .map(|(key, bank)| {
                let mut by_difficulty: BTreeMap<String, usize> = BTreeMap::new();
                for q in bank.iter() {
                    *by_difficulty.entry(q.difficulty.clone()).or_default() += 1;
                }
                BankStatus {
                    track: key.track.clone(),
                    language: key.language.clone(),
                    total: bank.len(),
                    by_difficulty,
                }
            })
            .collect();
        statuses.sort_by(|a, b| (&a.track, &a.language).cmp(&(&b.track, &b.language)));
        statuses
    }
}

/// Canonical form of a question stem: lowercased, accents stripped, only
/// letters/digits kept, whitespace collapsed.
pub fn normalize_stem(stem: &str) -> String {
    let mut folded = String::with_capacity(stem.len());
    for ch in stem.to_lowercase().nfd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            folded.push(ch);
        } else if ch.is_whitespace() {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Duplicate-detection key: primary objective (uppercased) plus the
/// normalized stem.
pub fn dedup_key(question: &Question) -> String {
    let objective = question
        .objective_refs
        .first()
        .map(|o| o.to_uppercase())
        .unwrap_or_default();
    format!("{}::{}", objective, normalize_stem(&question.stem))
}

/// Drops later duplicates, keeping the first occurrence per key. Callers
/// feed questions in preference order (seed bank before AI additions).
pub fn ensure_unique(questions: Vec<Question>) -> Vec<Question> {
    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(questions.len());
    for q in questions {
        if seen.insert(dedup_key(&q)) {
            result.push(q);
        }
    }
    result
}

fn has_expected_options(options: &BTreeMap<String, String>) -> bool {
    options.len() == 4 && EXPECTED_OPTIONS.iter().all(|k| options.contains_key(*k))
}

/// Validates raw (seed or model) questions for one track: well-formed A-D
/// option set, a correct letter that exists, non-blank stem, defaulted
/// difficulty and objectives. Rejections are logged and skipped; duplicates
/// within the batch are dropped.
pub fn sanitize(track: &str, raw: Vec<Question>) -> Vec<Question> {
    let mut result: Vec<Question> = Vec::new();
    let mut seen = HashSet::new();

    for q in raw {
        let normalized_stem = normalize_stem(&q.stem);
        if normalized_stem.is_empty() {
            warn!("Questão ignorada em {}: enunciado vazio ou inválido.", track);
            continue;
        }

        let options: BTreeMap<String, String> = q
            .options
            .iter()
            .map(|(k, v)| (k.trim().to_uppercase(), v.trim().to_string()))
            .collect();
        if !has_expected_options(&options) {
            warn!("Questão ignorada em {}: opções devem conter A, B, C e D.", track);
            continue;
        }

        let correct = q.correct_option.trim().to_uppercase();
        if !EXPECTED_OPTIONS.contains(&correct.as_str()) {
            warn!(
                "Questão ignorada em {}: alternativa correta ausente ou inválida.",
                track
            );
            continue;
        }

        let mut objectives: Vec<String> = q
            .objective_refs
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if objectives.is_empty() {
            objectives.push(format!("{}: Objetivo não informado", track));
        }

        let key = format!(
            "{}::{}",
            objectives[0].to_uppercase(),
            normalized_stem
        );
        if !seen.insert(key) {
            warn!(
                "Questão duplicada removida em {} (objetivo {}).",
                track, objectives[0]
            );
            continue;
        }

        let difficulty = q.difficulty.trim().to_lowercase();
        result.push(Question {
            id: if q.id.trim().is_empty() {
                format!("S{}", result.len() + 1)
            } else {
                q.id.trim().to_string()
            },
            stem: q.stem.trim().to_string(),
            options,
            correct_option: correct,
            difficulty: if difficulty.is_empty() {
                "medium".to_string()
            } else {
                difficulty
            },
            objective_refs: objectives,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn question(id: &str, stem: &str, objective: &str) -> Question {
        Question {
            id: id.to_string(),
            stem: stem.to_string(),
            options: BTreeMap::from([
                ("A".to_string(), "Opção A".to_string()),
                ("B".to_string(), "Opção B".to_string()),
                ("C".to_string(), "Opção C".to_string()),
                ("D".to_string(), "Opção D".to_string()),
            ]),
            correct_option: "A".to_string(),
            difficulty: "medium".to_string(),
            objective_refs: vec![objective.to_string()],
        }
    }

    #[test]
    fn normalize_folds_case_accents_and_whitespace() {
        assert_eq!(
            normalize_stem("  O que é   ALTA disponibilidade?\n"),
            "o que e alta disponibilidade"
        );
        assert_eq!(normalize_stem("Região, zona; par!"), "regiao zona par");
        assert_eq!(normalize_stem("???"), "");
    }

    #[test]
    fn dedup_key_uses_primary_objective_and_folded_stem() {
        let q = question("Q1", "O que é Azure?", "az-900: Cloud concepts");
        assert_eq!(dedup_key(&q), "AZ-900: CLOUD CONCEPTS::o que e azure");
    }

    #[test]
    fn ensure_unique_keeps_first_occurrence_in_order() {
        let questions = vec![
            question("Q1", "O que é Azure?", "AZ-900: Conceitos"),
            question("Q2", "o que e AZURE??", "az-900: conceitos"),
            question("Q3", "Outra pergunta", "AZ-900: Conceitos"),
        ];
        let unique = ensure_unique(questions);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "Q1");
        assert_eq!(unique[1].id, "Q3");
    }

    #[test]
    fn ensure_unique_is_idempotent() {
        let questions = vec![
            question("Q1", "Pergunta um", "Obj A"),
            question("Q2", "Pergunta um", "Obj A"),
            question("Q3", "Pergunta dois", "Obj B"),
        ];
        let once = ensure_unique(questions);
        let twice = ensure_unique(once.clone());
        assert_eq!(once.len(), twice.len());
        assert!(once
            .iter()
            .zip(twice.iter())
            .all(|(a, b)| a.id == b.id && a.stem == b.stem));
    }

    #[test]
    fn sanitize_rejects_malformed_questions() {
        let mut missing_option = question("", "Pergunta válida", "Obj");
        missing_option.options.remove("D");
        let mut bad_correct = question("", "Outra pergunta válida", "Obj");
        bad_correct.correct_option = "E".to_string();
        let blank_stem = question("", "  ?! ", "Obj");

        let sanitized = sanitize(
            "AZ-900",
            vec![missing_option, bad_correct, blank_stem, question("", "Pergunta boa", "")],
        );
        assert_eq!(sanitized.len(), 1);
        assert_eq!(sanitized[0].id, "S1");
        assert_eq!(sanitized[0].objective_refs, vec!["AZ-900: Objetivo não informado"]);
    }

    #[test]
    fn sanitize_normalizes_option_keys_and_correct_letter() {
        let mut q = question("x1", "Pergunta com chaves minúsculas", "Obj");
        q.options = BTreeMap::from([
            ("a".to_string(), " um ".to_string()),
            ("b".to_string(), "dois".to_string()),
            ("c".to_string(), "três".to_string()),
            ("d".to_string(), "quatro".to_string()),
        ]);
        q.correct_option = " b ".to_string();
        q.difficulty = " HARD ".to_string();

        let sanitized = sanitize("AI-900", vec![q]);
        assert_eq!(sanitized.len(), 1);
        assert!(has_expected_options(&sanitized[0].options));
        assert_eq!(sanitized[0].options["A"], "um");
        assert_eq!(sanitized[0].correct_option, "B");
        assert_eq!(sanitized[0].difficulty, "hard");
    }

    #[test]
    fn store_get_is_empty_for_unknown_key_and_replace_overwrites() {
        tokio_test::block_on(async {
            let store = BankStore::new();
            assert!(store.get("AZ-900", "pt-BR").await.is_empty());

            store
                .replace("AZ-900", "pt-BR", vec![question("Q1", "Pergunta", "Obj")])
                .await;
            assert_eq!(store.get("AZ-900", "pt-BR").await.len(), 1);

            store.replace("AZ-900", "pt-BR", vec![]).await;
            assert!(store.get("AZ-900", "pt-BR").await.is_empty());

            let status = store.status().await;
            assert_eq!(status.len(), 1);
            assert_eq!(status[0].total, 0);
        });
    }
}
