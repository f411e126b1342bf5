//! Prompt text for the research, generation and scoring stages.

use contentflow_types::{Artifact, ContentType};

use crate::handlers::quality::GateKind;

/// Persona for the writer stages, per content type.
pub fn writer_system(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::ShortPost => {
            "You are a social media copywriter. You write short, punchy posts \
             that make people stop scrolling. Respond with JSON only."
        }
        ContentType::Article => {
            "You are a seasoned blog writer. You turn research into clear, \
             well-structured articles that rank well and read easily. Respond with JSON only."
        }
        ContentType::ProfessionalPost => {
            "You are a LinkedIn ghostwriter for industry leaders. You write \
             professional posts with a strong hook and a clear call to action. \
             Respond with JSON only."
        }
    }
}

/// Persona for the quality gate.
pub fn scorer_system(kind: GateKind) -> &'static str {
    match kind {
        GateKind::Seo => {
            "You are an experienced SEO specialist. You analyze blog posts for keyword \
             usage, content structure, readability and search intent alignment. \
             Respond with JSON only."
        }
        GateKind::Virality => {
            "You are a social media strategist who has analyzed thousands of viral posts \
             on Twitter and LinkedIn. You know what drives engagement and sharing on each \
             platform, from hook writing to emotional triggers. Respond with JSON only."
        }
    }
}

fn format_hint(content_type: ContentType, max_length: usize) -> String {
    match content_type {
        ContentType::ShortPost => format!(
            "Return an object with \"content\" (at most {max_length} words) and \
             \"hashtags\" (a single space-separated string)."
        ),
        ContentType::Article => format!(
            "Return an object with \"title\", \"subtitle\" and \"sections\" \
             (1 to 8 strings, each at most {max_length} words)."
        ),
        ContentType::ProfessionalPost => format!(
            "Return an object with \"hook\", \"content\" (at most {max_length} words) \
             and \"call_to_action\"."
        ),
    }
}

fn label(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::ShortPost => "tweet",
        ContentType::Article => "blog post",
        ContentType::ProfessionalPost => "LinkedIn post",
    }
}

/// First-draft prompt.
pub fn create(content_type: ContentType, topic: &str, research: &str, max_length: usize) -> String {
    format!(
        "Make a {} on the topic {topic} using the following research:\n\n\
         <research>\n===============\n{research}\n===============\n</research>\n\n{}",
        label(content_type),
        format_hint(content_type, max_length),
    )
}

/// Revision prompt: the previous draft plus the reviewer's reason.
pub fn revise(
    content_type: ContentType,
    topic: &str,
    research: &str,
    max_length: usize,
    previous_json: &str,
    feedback: Option<&str>,
) -> String {
    let feedback = feedback.unwrap_or("No feedback was recorded. Improve it anyway.");
    format!(
        "You wrote this {} on the topic {topic}, but it did not score high enough:\n\n\
         <draft>\n{previous_json}\n</draft>\n\n\
         Reviewer feedback:\n<feedback>\n{feedback}\n</feedback>\n\n\
         Improve it, addressing the feedback. You may use this research:\n\n\
         <research>\n===============\n{research}\n===============\n</research>\n\n{}",
        label(content_type),
        format_hint(content_type, max_length),
    )
}

/// Scoring prompt for the current artifact.
pub fn score(kind: GateKind, artifact: &Artifact, artifact_json: &str) -> String {
    let focus = match kind {
        GateKind::Seo => {
            "Rate its SEO quality: keyword usage, title and subtitle, structure, \
             readability and match with search intent."
        }
        GateKind::Virality => {
            "Rate its viral potential: strength of the hook, emotional pull, \
             shareability and fit with the platform."
        }
    };
    format!(
        "Analyze this {}:\n\n<content>\n{artifact_json}\n</content>\n\n{focus}\n\n\
         Return an object with \"value\" (an integer from 0 to {}) and \"reason\" \
         (a short explanation with concrete suggestions).",
        label(artifact.content_type()),
        contentflow_types::artifact::SCORE_MAX,
    )
}

/// Query sent to the search tool.
pub fn research_query(topic: &str) -> String {
    topic.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentflow_types::ShortPostArtifact;

    #[test]
    fn create_prompt_embeds_research_and_limit() {
        let p = create(ContentType::ShortPost, "rust", "notes here", 150);
        assert!(p.contains("Make a tweet on the topic rust"));
        assert!(p.contains("notes here"));
        assert!(p.contains("at most 150 words"));
    }

    #[test]
    fn revise_prompt_carries_draft_and_feedback() {
        let p = revise(ContentType::Article, "rust", "r", 800, "{\"title\":\"x\"}", Some("too long"));
        assert!(p.contains("<draft>\n{\"title\":\"x\"}"));
        assert!(p.contains("too long"));
        assert!(p.contains("blog post"));
    }

    #[test]
    fn score_prompt_names_scale() {
        let artifact = Artifact::ShortPost(ShortPostArtifact {
            content: "hi".into(),
            hashtags: "#a".into(),
        });
        let p = score(GateKind::Virality, &artifact, "{}");
        assert!(p.contains("from 0 to 10"));
        assert!(p.contains("viral potential"));
    }
}
