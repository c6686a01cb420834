use crate::models::exam::Exam;
use crate::models::submission::Submission;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory exam/submission store. Entries are created once and never
/// updated; the process lifetime is the retention window.
#[derive(Clone, Default)]
pub struct ExamRepository {
    exams: Arc<RwLock<HashMap<Uuid, Arc<Exam>>>>,
    submissions: Arc<RwLock<HashMap<Uuid, Arc<Submission>>>>,
    latest_submission_by_exam: Arc<RwLock<HashMap<Uuid, Uuid>>>,
}

impl ExamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_exam(&self, exam: Exam) -> Arc<Exam> {
        let exam = Arc::new(exam);
        self.exams.write().await.insert(exam.exam_id, exam.clone());
        exam
    }

    pub async fn get_exam(&self, exam_id: Uuid) -> Option<Arc<Exam>> {
        self.exams.read().await.get(&exam_id).cloned()
    }

    pub async fn save_submission(&self, submission: Submission) -> Arc<Submission> {
        let submission = Arc::new(submission);
        self.submissions
            .write()
            .await
            .insert(submission.submission_id, submission.clone());
        self.latest_submission_by_exam
            .write()
            .await
            .insert(submission.exam_id, submission.submission_id);
        submission
    }

    pub async fn get_submission(&self, submission_id: Uuid) -> Option<Arc<Submission>> {
        self.submissions.read().await.get(&submission_id).cloned()
    }

    pub async fn latest_submission(&self, exam_id: Uuid) -> Option<Arc<Submission>> {
        let submission_id = *self
            .latest_submission_by_exam
            .read()
            .await
            .get(&exam_id)?;
        self.submissions.read().await.get(&submission_id).cloned()
    }
}
