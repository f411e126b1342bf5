//! Generic generator stage, one instance per content type.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use contentflow_llm::{parse_structured, GenerationRequest, GenerationService, ResponseShape};
use contentflow_types::{ArtifactKind, ContentflowError, PipelineState, Result};

use crate::handler::{StageContext, StageHandler, StageResult};
use crate::handlers::{excerpt, generate_with_retry, CallSettings};
use crate::pipeline::ContentEvent;
use crate::prompts;

/// Writes the first draft, or revises the current one after a low score.
pub struct GenerateStage<T> {
    service: Arc<dyn GenerationService>,
    settings: CallSettings,
    _kind: PhantomData<fn() -> T>,
}

impl<T: ArtifactKind> GenerateStage<T> {
    pub fn new(service: Arc<dyn GenerationService>, settings: CallSettings) -> Self {
        Self {
            service,
            settings,
            _kind: PhantomData,
        }
    }

    fn build_request(&self, state: &PipelineState) -> Result<GenerationRequest> {
        let content_type = T::CONTENT_TYPE;
        let research = state.research().unwrap_or_default();

        let prompt = match state.artifact() {
            None => prompts::create(content_type, state.topic(), research, state.max_length()),
            Some(previous) => {
                let previous = T::from_artifact(previous).ok_or_else(|| {
                    ContentflowError::ConfigurationError(format!(
                        "{} generator cannot revise a {} artifact",
                        content_type,
                        previous.content_type()
                    ))
                })?;
                prompts::revise(
                    content_type,
                    state.topic(),
                    research,
                    state.max_length(),
                    &serde_json::to_string_pretty(previous)?,
                    state.score().map(|s| s.reason.as_str()),
                )
            }
        };

        Ok(GenerationRequest::new(prompt)
            .with_system(prompts::writer_system(content_type))
            .with_shape(ResponseShape::new(content_type.as_str(), T::schema())))
    }
}

#[async_trait]
impl<T: ArtifactKind> StageHandler<PipelineState, ContentEvent> for GenerateStage<T> {
    async fn execute(
        &self,
        state: &mut PipelineState,
        ctx: &mut StageContext,
    ) -> Result<StageResult<ContentEvent>> {
        let target = T::CONTENT_TYPE.as_str();
        let revising = state.artifact().is_some();
        tracing::info!(
            stage = %ctx.stage(),
            content_type = target,
            revising,
            retry_count = state.retry_count(),
            "Generating content"
        );

        let request = self.build_request(state)?;
        let generated = generate_with_retry(&self.service, request, &self.settings, ctx).await?;

        let parse_error = |message: String| ContentflowError::GenerationParseError {
            target: target.to_string(),
            message: format!("{message}; raw output: {}", excerpt(&generated)),
        };
        let artifact: T = parse_structured(&generated).map_err(parse_error)?;
        artifact.check_shape(state.max_length()).map_err(parse_error)?;

        state.replace_artifact(artifact.into_artifact())?;
        Ok(StageResult::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventEmitter;
    use crate::retry::BackoffPolicy;
    use contentflow_llm::Generated;
    use contentflow_types::{
        validate_and_initialize, ArticleArtifact, Artifact, Score, ShortPostArtifact,
    };
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Replays canned outputs and keeps the prompts it was sent.
    struct Scripted {
        outputs: Mutex<Vec<Result<Generated>>>,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn new(outputs: Vec<Result<Generated>>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationService for Scripted {
        async fn generate(&self, request: GenerationRequest) -> Result<Generated> {
            self.prompts.lock().unwrap().push(request);
            self.outputs.lock().unwrap().remove(0)
        }
    }

    fn settings() -> CallSettings {
        CallSettings {
            retries: 2,
            backoff: BackoffPolicy::None,
            max_tokens: Some(512),
            temperature: None,
        }
    }

    fn ctx() -> StageContext {
        StageContext::new(Uuid::new_v4(), 3, "make_short_post", EventEmitter::default())
    }

    fn tweet_json(content: &str) -> Generated {
        Generated::Structured(serde_json::json!({ "content": content, "hashtags": "#rust" }))
    }

    fn stage(service: Arc<Scripted>) -> GenerateStage<ShortPostArtifact> {
        GenerateStage::new(service, settings())
    }

    #[tokio::test]
    async fn create_mode_stores_artifact() {
        let service = Scripted::new(vec![Ok(tweet_json("Rust is fast"))]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        state.set_research("memory safety".into()).unwrap();

        stage(service.clone()).execute(&mut state, &mut ctx()).await.unwrap();

        match state.artifact() {
            Some(Artifact::ShortPost(a)) => assert_eq!(a.content, "Rust is fast"),
            other => panic!("unexpected artifact: {other:?}"),
        }
        let sent = service.prompts.lock().unwrap();
        assert!(sent[0].prompt.contains("memory safety"));
        assert_eq!(sent[0].max_tokens, Some(512));
        assert_eq!(sent[0].response_shape.as_ref().map(|s| s.name.as_str()), Some("tweet"));
    }

    #[tokio::test]
    async fn revise_mode_includes_previous_draft_and_reason() {
        let service = Scripted::new(vec![Ok(tweet_json("Better take"))]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        state
            .replace_artifact(Artifact::ShortPost(ShortPostArtifact {
                content: "First take".into(),
                hashtags: "#rust".into(),
            }))
            .unwrap();
        state
            .set_score(Score {
                value: 4,
                reason: "needs a hook".into(),
            })
            .unwrap();

        stage(service.clone()).execute(&mut state, &mut ctx()).await.unwrap();

        let sent = service.prompts.lock().unwrap();
        assert!(sent[0].prompt.contains("First take"));
        assert!(sent[0].prompt.contains("needs a hook"));
        // New artifact invalidates the old score
        assert!(state.score().is_none());
    }

    #[tokio::test]
    async fn revising_another_content_type_is_refused() {
        let service = Scripted::new(vec![Ok(tweet_json("never sent"))]);
        let mut state = validate_and_initialize("blog", "rust").unwrap();
        state
            .replace_artifact(Artifact::Article(ArticleArtifact {
                title: "Rust".into(),
                subtitle: "Why it matters".into(),
                sections: vec!["Because.".into()],
            }))
            .unwrap();

        let err = stage(service.clone()).execute(&mut state, &mut ctx()).await.unwrap_err();
        match err {
            ContentflowError::ConfigurationError(msg) => assert!(msg.contains("cannot revise"), "got: {msg}"),
            other => panic!("Expected ConfigurationError, got: {other:?}"),
        }
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fenced_text_output_is_accepted() {
        let text = "Sure!\n```json\n{\"content\": \"Fenced\", \"hashtags\": \"#a\"}\n```";
        let service = Scripted::new(vec![Ok(Generated::Text(text.into()))]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        stage(service).execute(&mut state, &mut ctx()).await.unwrap();
        assert!(state.artifact().is_some());
    }

    #[tokio::test]
    async fn unparseable_output_is_not_retried() {
        let service = Scripted::new(vec![
            Ok(Generated::Text("I cannot do that".into())),
            Ok(tweet_json("never reached")),
        ]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        let err = stage(service.clone())
            .execute(&mut state, &mut ctx())
            .await
            .unwrap_err();
        match err {
            ContentflowError::GenerationParseError { target, message } => {
                assert_eq!(target, "tweet");
                assert!(message.contains("I cannot do that"));
            }
            other => panic!("Expected GenerationParseError, got: {other:?}"),
        }
        assert_eq!(service.prompts.lock().unwrap().len(), 1);
        assert!(state.artifact().is_none());
    }

    #[tokio::test]
    async fn oversized_artifact_is_a_parse_error() {
        let long = vec!["word"; 151].join(" ");
        let service = Scripted::new(vec![Ok(tweet_json(&long))]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        let err = stage(service).execute(&mut state, &mut ctx()).await.unwrap_err();
        assert!(matches!(err, ContentflowError::GenerationParseError { .. }));
    }

    #[tokio::test]
    async fn transient_service_failure_is_retried() {
        let service = Scripted::new(vec![
            Err(ContentflowError::RequestTimeout {
                provider: "test".into(),
                timeout_ms: 10,
            }),
            Ok(tweet_json("second time")),
        ]);
        let mut state = validate_and_initialize("tweet", "rust").unwrap();
        stage(service.clone()).execute(&mut state, &mut ctx()).await.unwrap();
        assert_eq!(service.prompts.lock().unwrap().len(), 2);
    }
}
