//! 动作解析：从推理后端的自由文本中提取 Thought / Action / Action Input
//!
//! - Thought：`Thought:` 之后到下一个 `\nAction:` 或文本末尾
//! - Action：`Action:` 之后到行尾
//! - Action Input：`Action Input:` 之后到空行（`\n\n`）或文本末尾
//!
//! 内容中原样出现的标签会截断字段。缺少 Action 或 Action Input 即解析失败。

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub thought: Option<String>,
    pub action: String,
    pub action_input: String,
}

/// 解析失败：原因 + 已识别出的思考
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
    pub thought: Option<String>,
}

fn thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Thought:\s*(.+?)(?:\nAction:|\z)").expect("valid regex"))
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Action:\s*([^\n]+)").expect("valid regex"))
}

fn input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)Action Input:\s*(.+?)(?:\n\n|\z)").expect("valid regex"))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn parse_action(output: &str) -> Result<ParsedAction, ParseFailure> {
    let thought = capture(thought_re(), output);
    let action = capture(action_re(), output);
    let action_input = capture(input_re(), output);
    match (action, action_input) {
        (Some(action), Some(action_input)) => Ok(ParsedAction {
            thought,
            action,
            action_input,
        }),
        (None, _) => Err(ParseFailure {
            reason: "missing Action".to_string(),
            thought,
        }),
        (Some(_), None) => Err(ParseFailure {
            reason: "missing Action Input".to_string(),
            thought,
        }),
    }
}
