use crate::models::exam::Question;
use serde_json::json;

/// Builds the pt-BR prompts sent to the model for question generation and
/// submission analysis.
#[derive(Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn exam_system_prompt(&self) -> String {
        "Você é um especialista Microsoft certificado (AZ-900, AI-900 e DP-900). \
         Gere questões originais em português-BR com 4 alternativas e 1 correta, \
         balanceando dificuldade. Retorne somente JSON válido."
            .to_string()
    }

    pub fn exam_user_prompt(&self, track: &str, count: usize) -> String {
        format!(
            "Gere {count} questões para a certificação {track}.\n\
             Formato JSON:\n\
             [{{\n\
               \"stem\": \"...\",\n\
               \"options\": {{ \"A\": \"...\", \"B\": \"...\", \"C\": \"...\", \"D\": \"...\" }},\n\
               \"correctOption\": \"A|B|C|D\",\n\
               \"difficulty\": \"easy|medium|hard\",\n\
               \"objectiveRefs\": [\"{track}: ...\"]\n\
             }}]\n\
             Responda apenas JSON válido.\n"
        )
    }

    pub fn analysis_system_prompt(&self, analysis_mode: &str) -> String {
        if analysis_mode == "deep" {
            "Você é um instrutor Microsoft especializado. Produza análise pedagógica \
             profunda em português-BR. Sempre responda JSON."
                .to_string()
        } else {
            "Você é um instrutor Microsoft. Gere análise concisa em português-BR. \
             Sempre responda JSON."
                .to_string()
        }
    }

    pub fn analysis_user_prompt(
        &self,
        questions: &[&Question],
        wrong: &[(String, String)],
        language: &str,
        analysis_mode: &str,
    ) -> String {
        let payload = json!({
            "analysisMode": analysis_mode,
            "language": language,
            "questions": questions.iter().map(|q| json!({
                "id": q.id,
                "stem": q.stem,
                "options": q.options,
                "correctOption": q.correct_option,
                "difficulty": q.difficulty,
                "objectiveRefs": q.objective_refs,
            })).collect::<Vec<_>>(),
            "wrongAnswers": wrong.iter().map(|(question_id, selected)| json!({
                "questionId": question_id,
                "selected": selected,
            })).collect::<Vec<_>>(),
        });

        let explanation_rule = if analysis_mode == "deep" {
            "\"explanation\": 5-8 frases: resposta do aluno <selected>, correta \
             <correctOption>, conceito central, motivo do erro, dica acionável, exemplo curto."
        } else {
            "\"explanation\": 1-3 frases: motivo do erro e dica curta."
        };

        format!(
            "Analise o desempenho do aluno.\n\
             Entrada: {payload}\n\
             Formato JSON obrigatório:\n\
             {{\n\
               \"score\": 0-100,\n\
               \"perQuestion\": [\n\
                 {{ \"questionId\": \"Qn\", \"isCorrect\": true/false, {explanation_rule} }}\n\
               ],\n\
               \"strengths\": [\"...\"],\n\
               \"gaps\": [\"...\"],\n\
               \"studyPlan\": [\n\
                 {{ \"topic\": \"...\", \"why\": \"...\", \"resources\": [ {{ \"title\": \"...\", \"url\": \"...\" }} ] }}\n\
               ]\n\
             }}\n\
             Regras: somente questões fornecidas; inclua todas as incorretas; \
             explanation sempre presente; retornar somente JSON válido.\n"
        )
    }
}
