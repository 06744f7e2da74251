//! retrieve_building：生成只读脚本并以取值模式执行，观察为 `result` 的字符串形式

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::sandbox::Sandbox;
use crate::tools::script_writer::{ScriptPurpose, ScriptWriter};
use crate::tools::{Tool, ToolDescriptor, ToolOutput};

pub struct RetrieveBuildingTool {
    descriptor: ToolDescriptor,
    writer: ScriptWriter,
    sandbox: Sandbox,
}

impl RetrieveBuildingTool {
    pub fn new(llm: Arc<dyn LlmClient>, sandbox: Sandbox) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "retrieve_building",
                "Building Retrieval API",
                "The Building Retrieval API is used to retrieve specific building element ID(s) from the \
                 sandbox environment based on spatial or descriptive queries. Use this when you need to \
                 identify elements before querying their properties.",
                "'Get the ID of the window in front of me', 'Find the closest door', \
                 'Get the height of the stairs in sight'",
            ),
            writer: ScriptWriter::new(llm),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for RetrieveBuildingTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn announcement(&self) -> Option<&str> {
        Some("Using the retrieve tool")
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput, String> {
        let loaded = self.sandbox.loaded_model().await;
        let script = self
            .writer
            .write(ScriptPurpose::Retrieve, input.trim(), loaded.as_deref())
            .await?;
        tracing::info!(script = %script, "Retrieval script");
        let outcome = self.sandbox.run_for_value(&script).await;
        tracing::info!(result = %outcome, "Retrieval result");
        Ok(ToolOutput::text(outcome).with_artifact(script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorSection;
    use crate::core::BuildingSession;
    use crate::llm::MockLlmClient;
    use crate::model::ModelLoader;
    use crate::sandbox::{FAILURE_SENTINEL, NO_RESULT_SENTINEL};
    use crate::sim::SimulatorClient;

    fn idle_sandbox() -> Sandbox {
        let (client_end, _server) = tokio::io::duplex(1024);
        let session = Arc::new(BuildingSession::new(
            SimulatorClient::from_stream(client_end, "idle"),
            ModelLoader::default(),
            SimulatorSection::default(),
        ));
        Sandbox::new(session, 50)
    }

    #[tokio::test]
    async fn test_result_binding_becomes_observation() {
        let script = r#"{"steps": [{"op": "let", "name": "result", "value": ["a", "b"]}]}"#;
        let tool = RetrieveBuildingTool::new(Arc::new(MockLlmClient::with_replies([script])), idle_sandbox());
        let out = tool.execute("Find all window IDs").await.unwrap();
        assert_eq!(out.observation, r#"["a","b"]"#);
        assert_eq!(out.artifact.as_deref(), Some(script));
    }

    #[tokio::test]
    async fn test_unset_result_is_reported() {
        let script = r#"{"steps": [{"op": "let", "name": "doors", "value": []}]}"#;
        let tool = RetrieveBuildingTool::new(Arc::new(MockLlmClient::with_replies([script])), idle_sandbox());
        let out = tool.execute("Find the closest door").await.unwrap();
        assert_eq!(out.observation, NO_RESULT_SENTINEL);
    }

    #[tokio::test]
    async fn test_scene_changing_script_is_refused() {
        let script = r#"{"steps": [
            {"op": "call", "name": "destroy_object", "args": {"id": "1TAGlQkKXEnQ4lBJfHnOcM"}},
            {"op": "let", "name": "result", "value": "done"}
        ]}"#;
        let tool = RetrieveBuildingTool::new(Arc::new(MockLlmClient::with_replies([script])), idle_sandbox());
        let out = tool.execute("Get rid of the door and tell me its ID").await.unwrap();
        assert_eq!(out.observation, FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let llm = MockLlmClient::new();
        llm.push_reply(Err("rate limited".into()));
        let tool = RetrieveBuildingTool::new(Arc::new(llm), idle_sandbox());
        assert_eq!(tool.execute("x").await.unwrap_err(), "rate limited");
    }
}
