//! 脚本格式
//!
//! 一个脚本是若干步骤的序列，步骤由 `op` 字段区分：
//!
//! ```json
//! {"steps": [
//!   {"op": "call", "name": "find_by_type", "args": {"type": "IfcWindow"}, "bind": "windows"},
//!   {"op": "for_each", "in": "$windows", "as": "w", "do": [
//!     {"op": "call", "name": "set_object_color", "args": {"id": "$w.id", "color": [0, 0, 1]}}
//!   ]},
//!   {"op": "let", "name": "result", "value": "$windows.0.id"}
//! ]}
//! ```
//!
//! 参数中以 `$` 开头的字符串是变量引用（`$name`、`$name.key`、`$name.0`），`$$` 表示字面量 `$`。

use std::collections::BTreeMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sandbox::ExecutionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    /// 按顺序执行的步骤
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// 调用一个能力；`bind` 给出时把返回值绑定到该变量
    Call {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bind: Option<String>,
    },
    /// 把（解析引用后的）值绑定到变量；绑定 `result` 即设置输出
    Let { name: String, value: Value },
    /// 遍历数组，每个元素绑定到 `as` 后执行 `do`
    ForEach {
        #[serde(rename = "in")]
        items: Value,
        #[serde(rename = "as")]
        var: String,
        #[serde(rename = "do")]
        body: Vec<Step>,
    },
    /// `cond` 为真（非 null / false / 0 / 空串 / 空数组 / 空对象）时执行 `then`，否则 `else`
    If {
        cond: Value,
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },
}

impl Script {
    /// 解析后端输出：允许 ```json 围栏；接受 `{"steps": [...]}` 或裸步骤数组
    pub fn parse(text: &str) -> Result<Self, ExecutionError> {
        let body = strip_fences(text);
        match serde_json::from_str::<Script>(body) {
            Ok(script) => Ok(script),
            Err(object_err) => serde_json::from_str::<Vec<Step>>(body)
                .map(|steps| Script { steps })
                .map_err(|_| ExecutionError::InvalidScript(object_err.to_string())),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    // 跳过语言标记（json / JSON / 空）
    let after = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match after.find("```") {
        Some(end) => after[..end].trim(),
        None => after.trim(),
    }
}

/// 脚本格式的 JSON Schema，拼入脚本生成提示词
pub fn script_schema_json() -> String {
    let schema = schema_for!(Script);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
