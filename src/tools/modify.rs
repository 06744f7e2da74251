//! modify_building：生成脚本并以副作用模式执行，观察为成功/失败哨兵

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::sandbox::Sandbox;
use crate::tools::script_writer::{ScriptPurpose, ScriptWriter};
use crate::tools::{Tool, ToolDescriptor, ToolOutput};

pub struct ModifyBuildingTool {
    descriptor: ToolDescriptor,
    writer: ScriptWriter,
    sandbox: Sandbox,
}

impl ModifyBuildingTool {
    pub fn new(llm: Arc<dyn LlmClient>, sandbox: Sandbox) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "modify_building",
                "Building Modification API",
                "The Building Modification API is used to modify building elements in the environment. \
                 Input should be a modification request. Can also be used to get spatial information like \
                 'what is in front of me' or 'the objects in sight'.",
                "'Change the window color to red', 'Hide all stairs', \
                 'Rotate the visible door 90 degrees counter clockwise', \
                 'Move to the other side of the window and look back at it'",
            ),
            writer: ScriptWriter::new(llm),
            sandbox,
        }
    }
}

#[async_trait]
impl Tool for ModifyBuildingTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn announcement(&self) -> Option<&str> {
        Some("Using the modification tool")
    }

    async fn execute(&self, input: &str) -> Result<ToolOutput, String> {
        let loaded = self.sandbox.loaded_model().await;
        let script = self
            .writer
            .write(ScriptPurpose::Modify, input.trim(), loaded.as_deref())
            .await?;
        tracing::info!(script = %script, "Modification script");
        let outcome = self.sandbox.run_side_effect(&script).await;
        Ok(ToolOutput::text(outcome).with_artifact(script))
    }
}
