use crate::CatalogError;

/// A catalog that can be searched by title within a region.
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    fn name(&self) -> &str;

    /// One outbound call. Returns the raw upstream payload.
    async fn search(&self, title: &str, region: &str) -> Result<serde_json::Value, CatalogError>;
}
