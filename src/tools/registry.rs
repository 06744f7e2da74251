//! 工具注册表
//!
//! 所有工具实现 Tool trait（descriptor / execute），由 ToolRegistry 按规范化名称（去空白、小写）
//! 注册与查找；注册顺序即提示词中工具目录的顺序。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

/// 工具的静态描述（运行期只读），渲染进提示词
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub human_name: String,
    pub description: String,
    pub examples: String,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        human_name: impl Into<String>,
        description: impl Into<String>,
        examples: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            human_name: human_name.into(),
            description: description.into(),
            examples: examples.into(),
        }
    }
}

/// 一次工具调用的结果：观察文本 + 可选的生成产物（脚本、查询语句）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    pub observation: String,
    pub artifact: Option<String>,
}

impl ToolOutput {
    pub fn text(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// 开始执行时的语音播报，如 "Using the query tool"
    fn announcement(&self) -> Option<&str> {
        None
    }

    /// 执行工具；Err 由分发器转为带错误标记的观察
    async fn execute(&self, input: &str) -> Result<ToolOutput, String>;
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = normalize_name(tool.name());
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(&normalize_name(name)).cloned()
    }

    /// 注册顺序的工具名
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.descriptor().clone())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// 测试用工具：固定回复 / 固定失败 / 睡眠
    pub(crate) struct StubTool {
        pub descriptor: ToolDescriptor,
        pub reply: Result<String, String>,
        pub delay: Option<Duration>,
    }

    impl StubTool {
        pub fn ok(name: &str, reply: &str) -> Self {
            Self {
                descriptor: ToolDescriptor::new(name, name, "stub", "'x'"),
                reply: Ok(reply.to_string()),
                delay: None,
            }
        }

        pub fn failing(name: &str, error: &str) -> Self {
            Self {
                reply: Err(error.to_string()),
                ..Self::ok(name, "")
            }
        }

        pub fn slow(name: &str, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::ok(name, "late")
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, input: &str) -> Result<ToolOutput, String> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.reply
                .clone()
                .map(|r| ToolOutput::text(r).with_artifact(format!("input={}", input)))
        }
    }

    #[test]
    fn test_lookup_is_normalized_and_ordered() {
        let mut reg = ToolRegistry::new();
        reg.register(StubTool::ok("Query_Building", "a"));
        reg.register(StubTool::ok("modify_building", "b"));
        assert!(reg.get("  QUERY_building ").is_some());
        assert!(reg.get("teleport_building").is_none());
        assert_eq!(reg.tool_names(), vec!["query_building", "modify_building"]);
        assert_eq!(reg.descriptors()[1].name, "modify_building");
    }
}
