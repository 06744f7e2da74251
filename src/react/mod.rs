//! 推理层：动作解析、提示词、运行状态与 ReAct 主循环

pub mod events;
pub mod loop_;
pub mod parser;
pub mod prompt;
pub mod step;

pub use events::ReactEvent;
pub use loop_::{ReactAgent, FINISH_OBSERVATION};
pub use parser::{parse_action, ParseFailure, ParsedAction};
pub use prompt::render_prompt;
pub use step::{format_trajectory, AbortReason, AgentStep, RunOutcome, RunState, RunStatus};
