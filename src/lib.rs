pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod utils;

use crate::repository::exam_repo::ExamRepository;
use crate::services::ai_client::AiClient;
use crate::services::bank_service::BankStore;
use crate::services::exam_service::ExamService;
use crate::services::feedback_service::FeedbackService;
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub bank: BankStore,
    pub repo: ExamRepository,
    pub model: Arc<AiClient>,
    pub exam_service: ExamService<AiClient>,
    pub feedback_service: FeedbackService<AiClient>,
}

impl AppState {
    pub fn new() -> Self {
        let config = crate::config::get_config();
        let http_client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap();

        let model = Arc::new(AiClient::new(
            http_client,
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            config.openai_max_tokens,
            config.openai_max_prompt_chars,
        ));
        let bank = BankStore::new();
        let repo = ExamRepository::new();
        let exam_service = ExamService::new(bank.clone(), repo.clone(), model.clone());
        let feedback_service = FeedbackService::new(model.clone(), config.prompt_token_budget);

        Self {
            bank,
            repo,
            model,
            exam_service,
            feedback_service,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
