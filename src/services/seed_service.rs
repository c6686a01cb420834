use crate::models::exam::Question;
use crate::services::bank_service::{sanitize, BankStore};
use std::path::Path;
use tracing::{info, warn};

const SEED_LANGUAGE: &str = "pt-BR";

const SEED_TRACKS: [(&str, &str); 3] = [
    ("AZ-900", "questions.az900.json"),
    ("AI-900", "questions.ai900.json"),
    ("DP-900", "questions.dp900.json"),
];

/// Loads the per-track seed files into the bank store. Missing or malformed
/// files degrade that track to an empty bank; startup never fails here.
pub async fn load_seeds(store: &BankStore, seed_dir: &str) {
    let mut loaded = 0usize;

    for (track, file_name) in SEED_TRACKS {
        let path = Path::new(seed_dir).join(file_name);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) => {
                warn!("{} seed file not found at {:?}: {}", track, path, e);
                continue;
            }
        };

        let raw: Vec<Question> = match serde_json::from_str(&json) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{} seed file {:?} is not valid JSON: {}", track, path, e);
                continue;
            }
        };

        let sanitized = sanitize(track, raw);
        info!(
            "Loaded {} seed from {:?}: {} questions after validation.",
            track,
            path,
            sanitized.len()
        );
        store.replace(track, SEED_LANGUAGE, sanitized).await;
        loaded += 1;
    }

    if loaded == 0 {
        warn!("No seed files found for AZ-900, AI-900 or DP-900.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_and_malformed_seed_files_are_not_fatal() {
        let dir = std::env::temp_dir().join(format!("trainer-seeds-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("questions.az900.json"), "{ not json")
            .await
            .unwrap();

        let valid = serde_json::json!([
            {
                "stem": "O que é elasticidade?",
                "options": {"A": "Ajustar recursos", "B": "Custo", "C": "Backup", "D": "DNS"},
                "correctOption": "A",
                "difficulty": "easy",
                "objectiveRefs": ["AI-900: Conceitos"]
            }
        ]);
        tokio::fs::write(
            dir.join("questions.ai900.json"),
            serde_json::to_string(&valid).unwrap(),
        )
        .await
        .unwrap();

        let store = BankStore::new();
        load_seeds(&store, dir.to_str().unwrap()).await;

        assert!(store.get("AZ-900", "pt-BR").await.is_empty());
        assert!(store.get("DP-900", "pt-BR").await.is_empty());
        assert_eq!(store.get("AI-900", "pt-BR").await.len(), 1);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
