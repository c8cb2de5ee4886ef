//! Article parsing and assembly
//!
//! Turns the content service's reply into an `ArticleDraft`, finds the image
//! slots it asks for, and combines draft, images and record into an `Article`.

use chrono::{Duration, NaiveDate};
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Value};

use shared::GenerationResult;
use crate::types::{Article, ArticleDraft, ImageOutcome, ImageSlot, KeywordRecord};

const WORDS_PER_MINUTE: usize = 150;

/// Regex-backed parser for generated article text
#[derive(Debug, Clone)]
pub struct ArticleParser {
    img_tag: Regex,
    src_placeholder: Regex,
    html_tag: Regex,
}

impl Default for ArticleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleParser {
    pub fn new() -> Self {
        Self {
            img_tag: Regex::new(r#"<img[^>]+alt="([^"]+)"[^>]*>"#).expect("valid img pattern"),
            src_placeholder: Regex::new(r#"src="(?:\{\{)?([^{}"]+?)(?:\}\})?(?:\.(?:jpe?g|png|webp))?(?:\?[^"]*)?""#)
                .expect("valid src pattern"),
            html_tag: Regex::new(r"<[^>]*>").expect("valid tag pattern"),
        }
    }

    /// Recover article fields from the reply.
    ///
    /// A JSON object is looked for in the whole text first, then between the
    /// outermost braces. Without one, the raw text is the body and the keyword
    /// is the title.
    pub fn parse(&self, response: &str, keyword: &str) -> ArticleDraft {
        let Some(fields) = extract_json_object(response) else {
            return ArticleDraft {
                title: keyword.to_string(),
                content_html: response.trim().to_string(),
                ..ArticleDraft::default()
            };
        };

        let title = text_field(&fields, "Titre");
        ArticleDraft {
            title: if title.is_empty() { keyword.to_string() } else { title },
            content_html: text_field(&fields, "Contenu article"),
            table_of_contents: text_field(&fields, "Table des matières"),
            article_type: text_field(&fields, "Type d'article"),
            article_types_secondary: list_field(&fields, "Type d'article 2-8"),
            summary: text_field(&fields, "Résumé de l'article"),
            title_tag: text_field(&fields, "Balise title"),
            meta_description: text_field(&fields, "META DESCRIPTION"),
        }
    }

    /// Distinct `<img alt>` slots in first-seen order
    pub fn image_slots(&self, html: &str) -> Vec<ImageSlot> {
        let mut slots: Vec<ImageSlot> = Vec::new();
        for captures in self.img_tag.captures_iter(html) {
            let alt_text = captures[1].trim().to_string();
            if alt_text.is_empty() || slots.iter().any(|s| s.alt_text == alt_text) {
                continue;
            }
            let placeholder = self
                .src_placeholder
                .captures(&captures[0])
                .map(|c| c[1].trim().to_string())
                .filter(|p| !p.is_empty());
            slots.push(ImageSlot { alt_text, placeholder });
        }
        slots
    }

    /// Text with tags removed and whitespace collapsed
    pub fn strip_html(&self, html: &str) -> String {
        self.html_tag
            .replace_all(html, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whole minutes at 150 words per minute, rounded up
    pub fn reading_time_minutes(&self, html: &str) -> usize {
        self.strip_html(html).split_whitespace().count().div_ceil(WORDS_PER_MINUTE)
    }

    /// Combine a draft and its image outcomes into the output article
    pub fn assemble(
        &self,
        record: &KeywordRecord,
        draft: ArticleDraft,
        images: Vec<ImageOutcome>,
        content: &GenerationResult,
        publication_date: NaiveDate,
    ) -> Article {
        let reading_time = format!("{} minutes", self.reading_time_minutes(&draft.content_html));
        Article {
            keyword: record.keyword.clone(),
            slug: slugify(&draft.title),
            title: draft.title,
            publication_date: publication_date.format("%d/%m/%Y").to_string(),
            reading_time,
            table_of_contents: draft.table_of_contents,
            content: draft.content_html,
            article_type: draft.article_type,
            article_types_secondary: draft.article_types_secondary,
            summary: draft.summary,
            title_tag: draft.title_tag,
            meta_description: draft.meta_description,
            images,
            content_units: content.units,
            content_cache_hit: content.cache_hit,
            record: record.clone(),
        }
    }
}

/// Find a JSON object in free text
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn text_field(fields: &Map<String, Value>, key: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => text_field(fields, key)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'œ' => "oe",
        'æ' => "ae",
        'ß' => "ss",
        _ => return None,
    };
    Some(folded)
}

/// URL-safe slug: lowercase ASCII words joined by `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.to_lowercase().chars() {
        let piece = match fold_char(c) {
            Some(folded) => folded.to_string(),
            None if c.is_ascii_alphanumeric() => c.to_string(),
            None => {
                pending_dash = true;
                continue;
            }
        };
        if pending_dash && !slug.is_empty() {
            slug.push('-');
        }
        pending_dash = false;
        slug.push_str(&piece);
    }

    if slug.is_empty() {
        "article".to_string()
    } else {
        slug
    }
}

/// A date between 1 and 90 days before `today`
pub fn random_publication_date(today: NaiveDate) -> NaiveDate {
    let days_back = rand::thread_rng().gen_range(1..=90);
    today - Duration::days(days_back)
}
