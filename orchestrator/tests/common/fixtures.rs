//! Test fixtures and data for orchestrator tests

use orchestrator::KeywordRecord;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Tokens the scripted content backend reports per call
    pub const CONTENT_UNITS: u64 = 5_000;

    /// Token ceiling admitting one content call but not a second
    pub const ONE_CALL_TOKEN_BUDGET: u64 = 8_000;

    pub const IMAGES_PER_ARTICLE: usize = 2;

    pub fn records(keywords: &[&str]) -> Vec<KeywordRecord> {
        keywords.iter().map(|k| KeywordRecord::new(*k)).collect()
    }

    /// Content reply in the shape the prompt asks for, with two image slots
    pub fn content_reply(keyword: &str) -> String {
        let body = format!(
            "<h2>{keyword}</h2><p>Tout savoir sur {keyword}.</p>\
             <img src=\"{{{{hero}}}}\" alt=\"Illustration {keyword}\">\
             <p>Conseils pratiques.</p><img alt=\"Schéma {keyword}\">"
        );
        serde_json::json!({
            "Titre": format!("Guide {keyword}"),
            "Contenu article": body,
            "Table des matières": "<ul><li>Intro</li></ul>",
            "Type d'article": "Guide",
            "Résumé de l'article": format!("Résumé {keyword}"),
            "Balise title": format!("{keyword} | Guide"),
            "META DESCRIPTION": format!("Tout sur {keyword}"),
        })
        .to_string()
    }

    /// Primary keyword of a rendered content prompt
    pub fn primary_keyword(prompt: &str) -> Option<String> {
        let marker = "\"primary_keyword\":\"";
        let start = prompt.find(marker)? + marker.len();
        let end = prompt[start..].find('"')? + start;
        Some(prompt[start..end].to_string())
    }

    /// Minimal CSV in the keyword export layout
    pub fn keyword_csv(keywords: &[&str]) -> String {
        let mut csv = String::from("Database,Keyword,Topic,Volume\n");
        for keyword in keywords {
            csv.push_str(&format!("fr,{keyword},Chiens,100\n"));
        }
        csv
    }
}
