//! Structured content artifacts and quality scores.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ContentType;

/// Maximum number of sections in a generated article.
pub const ARTICLE_MAX_SECTIONS: usize = 8;

/// Highest value on the quality scale.
pub const SCORE_MAX: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleArtifact {
    pub title: String,
    pub subtitle: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPostArtifact {
    pub content: String,
    pub hashtags: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionalPostArtifact {
    pub hook: String,
    pub content: String,
    pub call_to_action: String,
}

/// The artifact produced for a run, one variant per content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    ShortPost(ShortPostArtifact),
    Article(ArticleArtifact),
    ProfessionalPost(ProfessionalPostArtifact),
}

impl Artifact {
    pub fn content_type(&self) -> ContentType {
        match self {
            Artifact::ShortPost(_) => ContentType::ShortPost,
            Artifact::Article(_) => ContentType::Article,
            Artifact::ProfessionalPost(_) => ContentType::ProfessionalPost,
        }
    }

    /// Serialize the variant body (without the type tag) as pretty JSON.
    ///
    /// This is the form fed back to the model when revising.
    pub fn to_prompt_json(&self) -> serde_json::Result<String> {
        match self {
            Artifact::ShortPost(a) => serde_json::to_string_pretty(a),
            Artifact::Article(a) => serde_json::to_string_pretty(a),
            Artifact::ProfessionalPost(a) => serde_json::to_string_pretty(a),
        }
    }

    /// Plain-text rendering for terminal output.
    pub fn render(&self) -> String {
        match self {
            Artifact::ShortPost(a) => format!("{}\n\n{}", a.content, a.hashtags),
            Artifact::Article(a) => {
                let mut out = format!("# {}\n\n_{}_\n", a.title, a.subtitle);
                for section in &a.sections {
                    out.push('\n');
                    out.push_str(section);
                    out.push('\n');
                }
                out
            }
            Artifact::ProfessionalPost(a) => {
                format!("{}\n\n{}\n\n{}", a.hook, a.content, a.call_to_action)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ArtifactKind: per-type capabilities used by the generic generator stage
// ---------------------------------------------------------------------------

/// A concrete artifact type the generator stage can produce or revise.
pub trait ArtifactKind: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const CONTENT_TYPE: ContentType;

    /// JSON schema of the structured response expected from the model.
    fn schema() -> serde_json::Value;

    /// Check the shape constraints derived from `max_length`.
    fn check_shape(&self, max_length: usize) -> Result<(), String>;

    fn into_artifact(self) -> Artifact;

    fn from_artifact(artifact: &Artifact) -> Option<&Self>;
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("field '{field}' is empty"));
    }
    Ok(())
}

fn require_within(field: &str, value: &str, max_words: usize) -> Result<(), String> {
    let words = word_count(value);
    if words > max_words {
        return Err(format!(
            "field '{field}' has {words} words, limit is {max_words}"
        ));
    }
    Ok(())
}

impl ArtifactKind for ShortPostArtifact {
    const CONTENT_TYPE: ContentType = ContentType::ShortPost;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string" },
                "hashtags": { "type": "string" }
            },
            "required": ["content", "hashtags"],
            "additionalProperties": false
        })
    }

    fn check_shape(&self, max_length: usize) -> Result<(), String> {
        require_text("content", &self.content)?;
        require_text("hashtags", &self.hashtags)?;
        require_within("content", &self.content, max_length)
    }

    fn into_artifact(self) -> Artifact {
        Artifact::ShortPost(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Self> {
        match artifact {
            Artifact::ShortPost(a) => Some(a),
            _ => None,
        }
    }
}

impl ArtifactKind for ArticleArtifact {
    const CONTENT_TYPE: ContentType = ContentType::Article;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "subtitle": { "type": "string" },
                "sections": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "subtitle", "sections"],
            "additionalProperties": false
        })
    }

    fn check_shape(&self, max_length: usize) -> Result<(), String> {
        require_text("title", &self.title)?;
        require_text("subtitle", &self.subtitle)?;
        if self.sections.is_empty() || self.sections.len() > ARTICLE_MAX_SECTIONS {
            return Err(format!(
                "article has {} sections, expected 1 to {}",
                self.sections.len(),
                ARTICLE_MAX_SECTIONS
            ));
        }
        for (i, section) in self.sections.iter().enumerate() {
            let field = format!("sections[{i}]");
            require_text(&field, section)?;
            require_within(&field, section, max_length)?;
        }
        Ok(())
    }

    fn into_artifact(self) -> Artifact {
        Artifact::Article(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Self> {
        match artifact {
            Artifact::Article(a) => Some(a),
            _ => None,
        }
    }
}

impl ArtifactKind for ProfessionalPostArtifact {
    const CONTENT_TYPE: ContentType = ContentType::ProfessionalPost;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "hook": { "type": "string" },
                "content": { "type": "string" },
                "call_to_action": { "type": "string" }
            },
            "required": ["hook", "content", "call_to_action"],
            "additionalProperties": false
        })
    }

    fn check_shape(&self, max_length: usize) -> Result<(), String> {
        require_text("hook", &self.hook)?;
        require_text("content", &self.content)?;
        require_text("call_to_action", &self.call_to_action)?;
        require_within("content", &self.content, max_length)
    }

    fn into_artifact(self) -> Artifact {
        Artifact::ProfessionalPost(self)
    }

    fn from_artifact(artifact: &Artifact) -> Option<&Self> {
        match artifact {
            Artifact::ProfessionalPost(a) => Some(a),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Quality score of the current artifact on a 0-10 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    #[serde(alias = "score")]
    pub value: u8,
    pub reason: String,
}

impl Score {
    pub fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "value": { "type": "integer" },
                "reason": { "type": "string" }
            },
            "required": ["value", "reason"],
            "additionalProperties": false
        })
    }

    pub fn check_range(&self) -> Result<(), String> {
        if self.value > SCORE_MAX {
            return Err(format!(
                "score {} is outside the 0-{} scale",
                self.value, SCORE_MAX
            ));
        }
        Ok(())
    }
}
