//! 工具分发器
//!
//! 把动作名映射到已注册的工具：保留动作 finish 不经分发直接结束循环；未注册的名称、
//! 工具失败与超时都转为普通观察文本，循环照常继续。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::speech::{speak_or_log, SpeechSink};
use crate::tools::{normalize_name, ToolOutput, ToolRegistry};

/// 终止动作名
pub const FINISH_ACTION: &str = "finish";

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// finish：输入原样作为最终回答
    Finish(String),
    Observation(ToolOutput),
    /// 执行期间收到取消
    Cancelled,
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
    announcer: Option<Arc<dyn SpeechSink>>,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            announcer: None,
        }
    }

    /// 工具开始执行前播报其 announcement
    pub fn with_announcer(mut self, announcer: Arc<dyn SpeechSink>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub async fn dispatch(&self, action: &str, input: &str, cancel: &CancellationToken) -> Dispatch {
        if normalize_name(action) == FINISH_ACTION {
            return Dispatch::Finish(input.to_string());
        }
        let Some(tool) = self.registry.get(action) else {
            let names: Vec<String> = self.tool_names().iter().map(|n| format!("'{}'", n)).collect();
            tracing::warn!(tool = action, "Unknown tool requested");
            return Dispatch::Observation(ToolOutput::text(format!(
                "Error: Tool '{}' not found. Available tools: [{}]",
                action,
                names.join(", ")
            )));
        };

        if let (Some(announcer), Some(text)) = (&self.announcer, tool.announcement()) {
            speak_or_log(announcer.as_ref(), text).await;
        }

        let start = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            r = timeout(self.timeout, tool.execute(input)) => Some(r),
        };

        let outcome = match &result {
            None => "cancelled",
            Some(Ok(Ok(_))) => "ok",
            Some(Ok(Err(_))) => "error",
            Some(Err(_)) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool.name(),
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": input_preview(input),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            None => Dispatch::Cancelled,
            Some(Ok(Ok(output))) => Dispatch::Observation(output),
            Some(Ok(Err(e))) => {
                Dispatch::Observation(ToolOutput::text(format!("Error executing {}: {}", action, e)))
            }
            Some(Err(_)) => Dispatch::Observation(ToolOutput::text(format!(
                "Error: Tool '{}' timed out after {}s",
                action,
                self.timeout.as_secs()
            ))),
        }
    }
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}
