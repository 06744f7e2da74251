//! ReAct 主循环
//!
//! 渲染提示词 -> 推理后端 -> 解析动作 -> 分发工具 -> 追加观察，直到 finish 或达到最大轮数。
//! 任何失败（解析、后端、超时、取消）都以降级回答结束，run 总是返回一个可播报的字符串。
//! 可选 event_tx：向 verbose 输出推送 StepUpdate / Thinking / ToolCall / Observation。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::react::parser::parse_action;
use crate::react::prompt::render_prompt;
use crate::react::{AbortReason, AgentStep, ReactEvent, RunOutcome, RunState, RunStatus};
use crate::tools::{Dispatch, ToolDispatcher};

/// finish 步骤的固定观察
pub const FINISH_OBSERVATION: &str = "Task completed";
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;
/// 后端自行续写的观察从这些标签处截断
const STOP_LABELS: &[&str] = &["Observation:", "Observation :"];

fn send_event(tx: Option<&UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 丢弃后端自己编造的 Observation 及其后内容
fn cut_at_observation(output: &str) -> &str {
    let end = STOP_LABELS
        .iter()
        .filter_map(|label| output.find(label))
        .min()
        .unwrap_or(output.len());
    &output[..end]
}

pub struct ReactAgent {
    llm: Arc<dyn LlmClient>,
    max_iterations: usize,
    llm_timeout: Duration,
}

impl ReactAgent {
    pub fn new(llm: Arc<dyn LlmClient>, max_iterations: usize, llm_timeout_secs: u64) -> Self {
        Self {
            llm,
            max_iterations,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub async fn run(
        &self,
        query: &str,
        dispatcher: &ToolDispatcher,
        cancel: CancellationToken,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> RunOutcome {
        let mut state = RunState::new(query);
        let tools = dispatcher.registry().descriptors();

        while state.iterations < self.max_iterations {
            send_event(event_tx, ReactEvent::StepUpdate {
                step: state.iterations + 1,
                max_steps: self.max_iterations,
            });
            if cancel.is_cancelled() {
                return self.abort(state, AbortReason::Cancelled, "The request was cancelled.".to_string(), event_tx);
            }

            let prompt = render_prompt(&tools, &state.query, &state.history);
            send_event(event_tx, ReactEvent::Thinking);
            let generated = tokio::select! {
                _ = cancel.cancelled() => None,
                r = timeout(self.llm_timeout, self.llm.generate(&prompt)) => Some(r),
            };
            let output = match generated {
                None => {
                    return self.abort(state, AbortReason::Cancelled, "The request was cancelled.".to_string(), event_tx);
                }
                Some(Err(_)) => {
                    let answer = format!(
                        "The reasoning backend did not answer within {}s, please try again.",
                        self.llm_timeout.as_secs()
                    );
                    return self.abort(state, AbortReason::Timeout, answer, event_tx);
                }
                Some(Ok(Err(e))) => {
                    let answer = format!("I could not reach the reasoning backend: {}", e);
                    return self.abort(state, AbortReason::Backend, answer, event_tx);
                }
                Some(Ok(Ok(text))) => text,
            };
            state.iterations += 1;

            let output = cut_at_observation(&output);
            send_event(event_tx, ReactEvent::ThinkingContent {
                text: preview(output, THINKING_PREVIEW_CHARS),
            });

            let parsed = match parse_action(output) {
                Ok(p) => p,
                Err(failure) => {
                    warn!(reason = %failure.reason, "Could not parse backend output");
                    let thought = failure.thought.unwrap_or_else(|| output.trim().to_string());
                    let answer = format!(
                        "I encountered an issue processing your request. Here's what I was thinking: {}",
                        thought
                    );
                    return self.abort(state, AbortReason::ParseFailure, answer, event_tx);
                }
            };
            info!(
                iteration = state.iterations,
                action = %parsed.action,
                input = %preview(&parsed.action_input, OBSERVATION_PREVIEW_CHARS),
                "ReAct step"
            );
            send_event(event_tx, ReactEvent::ToolCall {
                tool: parsed.action.clone(),
                input: parsed.action_input.clone(),
            });

            let thought = parsed.thought.unwrap_or_default();
            match dispatcher.dispatch(&parsed.action, &parsed.action_input, &cancel).await {
                Dispatch::Finish(answer) => {
                    state.push(AgentStep {
                        thought,
                        action: parsed.action,
                        action_input: parsed.action_input,
                        observation: FINISH_OBSERVATION.to_string(),
                        artifact: None,
                    });
                    state.status = RunStatus::Finished;
                    send_event(event_tx, ReactEvent::Finished { answer: answer.clone() });
                    return RunOutcome {
                        answer,
                        steps: state.history,
                        status: state.status,
                    };
                }
                Dispatch::Cancelled => {
                    return self.abort(state, AbortReason::Cancelled, "The request was cancelled.".to_string(), event_tx);
                }
                Dispatch::Observation(output) => {
                    send_event(event_tx, ReactEvent::Observation {
                        tool: parsed.action.clone(),
                        preview: preview(&output.observation, OBSERVATION_PREVIEW_CHARS),
                    });
                    state.push(AgentStep {
                        thought,
                        action: parsed.action,
                        action_input: parsed.action_input,
                        observation: output.observation,
                        artifact: output.artifact,
                    });
                }
            }
        }

        let answer = format!(
            "I've reached the maximum number of steps (max iterations: {}). Here's what I found: {}",
            self.max_iterations,
            state.last_observation()
        );
        self.abort(state, AbortReason::MaxIterations, answer, event_tx)
    }

    fn abort(
        &self,
        mut state: RunState,
        reason: AbortReason,
        answer: String,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> RunOutcome {
        warn!(%reason, steps = state.history.len(), "ReAct run aborted");
        state.status = RunStatus::Aborted(reason);
        send_event(event_tx, ReactEvent::Error { text: reason.to_string() });
        RunOutcome {
            answer,
            steps: state.history,
            status: state.status,
        }
    }
}
