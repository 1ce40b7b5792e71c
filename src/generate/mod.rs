mod http;

pub use http::HttpGenerator;

use crate::config::Config;
use crate::error::GeneratorError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Seam over the opaque text-generation capability. `scope` is a
/// conversation identity: calls sharing a scope may share conversational
/// state on the service side, so concurrent perspectives must each use their
/// own.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn invoke(&self, scope: &str, prompt: &str) -> Result<Value, GeneratorError>;
}

/// Create a generator from the service configuration.
pub fn create_generator(config: &Config) -> Arc<dyn Generator> {
    Arc::new(HttpGenerator::new(&config.generation))
}
