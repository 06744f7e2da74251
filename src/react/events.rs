//! ReAct 过程事件：verbose 模式下实时展示思考、工具调用与观察

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第几轮（从 1 开始）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用推理后端
    Thinking,
    /// 后端输出（截断预览）
    ThinkingContent { text: String },
    ToolCall { tool: String, input: String },
    /// 工具返回（截断预览）
    Observation { tool: String, preview: String },
    /// 运行结束
    Finished { answer: String },
    Error { text: String },
}
