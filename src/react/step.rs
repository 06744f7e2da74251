//! 运行状态：步骤历史、终止状态与轨迹格式化

use std::fmt;

use serde::Serialize;

/// 已执行的一步（追加后不再修改）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStep {
    pub thought: String,
    pub action: String,
    pub action_input: String,
    pub observation: String,
    /// 工具生成的脚本或查询语句
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    ParseFailure,
    MaxIterations,
    /// 推理后端调用失败
    Backend,
    /// 推理后端超时
    Timeout,
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::ParseFailure => "parse failure",
            AbortReason::MaxIterations => "max iterations",
            AbortReason::Backend => "backend error",
            AbortReason::Timeout => "timeout",
            AbortReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Aborted(AbortReason),
}

/// 单次查询的运行状态，由循环独占
#[derive(Debug, Clone)]
pub struct RunState {
    pub query: String,
    pub history: Vec<AgentStep>,
    pub iterations: usize,
    pub status: RunStatus,
}

impl RunState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
            iterations: 0,
            status: RunStatus::Running,
        }
    }

    pub fn push(&mut self, step: AgentStep) {
        self.history.push(step);
    }

    pub fn last_observation(&self) -> &str {
        self.history.last().map(|s| s.observation.as_str()).unwrap_or("")
    }
}

/// run 的返回值：任何失败下都有一个可播报的回答
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub answer: String,
    pub steps: Vec<AgentStep>,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        self.status == RunStatus::Finished
    }
}

/// 便于日志展示的轨迹文本
pub fn format_trajectory(steps: &[AgentStep]) -> String {
    let mut out = format!("Agent Trajectory:\n{}\n", "=".repeat(50));
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("\n--- Step {} ---\n", i + 1));
        out.push_str(&format!("Thought: {}\n", step.thought));
        out.push_str(&format!("Action: {}\n", step.action));
        out.push_str(&format!("Action Input: {}\n", step.action_input));
        out.push_str(&format!("Observation: {}\n", step.observation));
    }
    out
}
