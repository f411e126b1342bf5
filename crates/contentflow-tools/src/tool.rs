use async_trait::async_trait;

/// A research collaborator: takes a free-text query, returns free text.
#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> contentflow_types::Result<String>;
}

/// Type-erased `SearchTool`, so callers can hold any tool behind one type.
pub struct DynSearchTool(Box<dyn SearchTool>);

impl DynSearchTool {
    pub fn new(tool: impl SearchTool + 'static) -> Self {
        Self(Box::new(tool))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub async fn search(&self, query: &str) -> contentflow_types::Result<String> {
        self.0.search(query).await
    }
}

#[async_trait]
impl SearchTool for DynSearchTool {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn search(&self, query: &str) -> contentflow_types::Result<String> {
        self.0.search(query).await
    }
}

/// Returns the same text for every query. Used for offline runs.
#[derive(Debug, Clone)]
pub struct StaticSearchTool {
    text: String,
}

impl StaticSearchTool {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl SearchTool for StaticSearchTool {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str) -> contentflow_types::Result<String> {
        Ok(self.text.clone())
    }
}
