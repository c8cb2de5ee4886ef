//! Prompt rendering for content and image requests
//!
//! Rendering is pure: the same record, stage and date always give the same text.

use std::path::Path;

use chrono::NaiveDate;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::KeywordRecord;

pub const KEYWORDS_PLACEHOLDER: &str = "{keywords}";
pub const NEAR_ME_PLACEHOLDER: &str = "{NearMe}";
pub const DATE_PLACEHOLDER: &str = "{current_date}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional SEO content writer. Create high-quality, \
SEO-optimized blog content based on the provided instructions and keywords. \
The output must be in valid JSON format following the structure specified in the prompt. \
current date is {current_date}";

pub const DEFAULT_CONTENT_TEMPLATE: &str = r#"Génère un article SEO optimisé au format JSON.

DONNÉES DE MOTS-CLÉS :
{keywords}

LOCALISATION : {NearMe}

INSTRUCTIONS :
1. Structure HTML sémantique pour "Contenu article" (article, section, figure, H2 > H3).
2. Paragraphes courts, au moins deux listes à puces, 1500 mots maximum.
3. Chaque image est une balise <img src="{{nom-image}}" alt="description précise de l'image">.
4. Intègre le mot-clé principal dans le titre, l'introduction et la conclusion.

FORMAT DE SORTIE (un seul objet JSON, caractères spéciaux échappés) :
{
  "Titre": "",
  "Table des matières": "",
  "Contenu article": "",
  "Type d'article": "",
  "Type d'article 2-8": "",
  "Résumé de l'article": "",
  "Balise title": "",
  "META DESCRIPTION": ""
}"#;

/// Which request a prompt is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStage<'a> {
    Content,
    Image { alt_text: &'a str },
}

#[derive(Debug, Clone)]
pub struct PromptHandler {
    template: String,
    system_prompt: String,
    near_me: Option<String>,
}

impl Default for PromptHandler {
    fn default() -> Self {
        Self {
            template: DEFAULT_CONTENT_TEMPLATE.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            near_me: None,
        }
    }
}

impl PromptHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content template; it must reference `{keywords}`
    pub fn with_template(mut self, template: impl Into<String>) -> OrchestratorResult<Self> {
        let template = template.into();
        if !template.contains(KEYWORDS_PLACEHOLDER) {
            return Err(OrchestratorError::TemplateError {
                message: format!("template does not contain {KEYWORDS_PLACEHOLDER}"),
            });
        }
        self.template = template;
        Ok(self)
    }

    /// Load the content template from a file
    pub fn with_template_file(self, path: &Path) -> OrchestratorResult<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| OrchestratorError::TemplateError {
            message: format!("{}: {e}", path.display()),
        })?;
        self.with_template(template)
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_near_me(mut self, near_me: Option<String>) -> Self {
        self.near_me = near_me.filter(|n| !n.trim().is_empty());
        self
    }

    /// Request payload for a record at a stage
    pub fn render(&self, record: &KeywordRecord, stage: PromptStage<'_>) -> String {
        match stage {
            PromptStage::Content => {
                let context = serde_json::json!({
                    "cluster_name": record.topic.as_deref().unwrap_or(&record.keyword),
                    "keywords": [record.prompt_context()],
                });
                self.template
                    .replace(KEYWORDS_PLACEHOLDER, &context.to_string())
                    .replace(NEAR_ME_PLACEHOLDER, self.near_me.as_deref().unwrap_or("Not specified"))
            }
            PromptStage::Image { alt_text } => format!("Generate an image for: {alt_text}"),
        }
    }

    /// System prompt before the date is filled in
    pub fn system_template(&self) -> &str {
        &self.system_prompt
    }

    pub fn render_system(&self, today: NaiveDate) -> String {
        self.system_prompt
            .replace(DATE_PLACEHOLDER, &today.format("%Y-%m-%d").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> KeywordRecord {
        KeywordRecord {
            topic: Some("Chiens".to_string()),
            intent: Some("commercial".to_string()),
            ..KeywordRecord::new("éducateur canin")
        }
    }

    #[test]
    fn test_render_content_fills_placeholders() {
        let handler = PromptHandler::new().with_near_me(Some("Lyon".to_string()));
        let prompt = handler.render(&record(), PromptStage::Content);

        assert!(prompt.contains("\"primary_keyword\":\"éducateur canin\""));
        assert!(prompt.contains("\"cluster_name\":\"Chiens\""));
        assert!(prompt.contains("LOCALISATION : Lyon"));
        assert!(!prompt.contains(KEYWORDS_PLACEHOLDER));
        assert!(!prompt.contains(NEAR_ME_PLACEHOLDER));
    }

    #[test]
    fn test_near_me_defaults_to_not_specified() {
        let handler = PromptHandler::new()
            .with_template("{keywords} near {NearMe}")
            .unwrap()
            .with_near_me(Some("   ".to_string()));
        let prompt = handler.render(&record(), PromptStage::Content);
        assert!(prompt.ends_with("near Not specified"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let handler = PromptHandler::new();
        assert_eq!(
            handler.render(&record(), PromptStage::Content),
            handler.render(&record(), PromptStage::Content)
        );
    }

    #[test]
    fn test_render_image() {
        let handler = PromptHandler::new();
        let prompt = handler.render(&record(), PromptStage::Image { alt_text: "Un chien assis" });
        assert_eq!(prompt, "Generate an image for: Un chien assis");
    }

    #[test]
    fn test_template_without_keywords_is_rejected() {
        let err = PromptHandler::new().with_template("no placeholder here").unwrap_err();
        assert!(matches!(err, OrchestratorError::TemplateError { .. }));
    }

    #[test]
    fn test_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Write about {keywords}").unwrap();

        let handler = PromptHandler::new().with_template_file(&path).unwrap();
        assert!(handler.render(&record(), PromptStage::Content).starts_with("Write about {"));

        assert!(PromptHandler::new().with_template_file(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_render_system_inserts_date() {
        let handler = PromptHandler::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert!(handler.render_system(date).ends_with("current date is 2025-03-14"));
    }
}
