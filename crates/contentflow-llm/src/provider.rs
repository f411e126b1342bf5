use async_trait::async_trait;

use crate::{Request, Response};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> Result<Response, contentflow_types::ContentflowError>;
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    fn supports_structured_output(&self) -> bool;
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(provider: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(provider))
    }

    pub async fn complete(
        &self,
        request: &Request,
    ) -> Result<Response, contentflow_types::ContentflowError> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_structured_output(&self) -> bool {
        self.0.supports_structured_output()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
