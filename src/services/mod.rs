pub mod ai_client;
pub mod bank_service;
pub mod exam_service;
pub mod feedback_service;
pub mod prompt_service;
pub mod seed_service;
