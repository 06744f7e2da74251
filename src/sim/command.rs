//! 请求与响应
//!
//! Command 按次构建、不持久化；Response 的 status 必填，驱动后续全部分支。

use serde_json::{Map, Value};

use crate::sim::SimError;

/// 一次请求：命令名 + 参数
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arguments(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// 线上 JSON：`{"command": name, ...arguments}`；参数里的 `command` 键被忽略
    pub fn to_payload(&self) -> Map<String, Value> {
        let mut payload = Map::with_capacity(self.arguments.len() + 1);
        payload.insert("command".to_string(), Value::String(self.name.clone()));
        for (key, value) in &self.arguments {
            if key != "command" {
                payload.insert(key.clone(), value.clone());
            }
        }
        payload
    }

    /// 从线上 JSON 还原（仿真端 / 测试替身使用）
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self, SimError> {
        let name = match payload.remove("command") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(_) => return Err(SimError::Protocol("'command' must be a non-empty string".into())),
            None => return Err(SimError::Protocol("request without 'command'".into())),
        };
        Ok(Self {
            name,
            arguments: payload,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Error => "error",
        }
    }
}

/// 一次响应：status 必填；error 仅在 status == Error 时存在
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub payload: Map<String, Value>,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(payload: Map<String, Value>) -> Self {
        Self {
            status: Status::Ok,
            payload,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            payload: Map::new(),
            error: Some(message.into()),
        }
    }

    /// 解析响应 JSON；缺少或未知的 status 属于协议违例
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self, SimError> {
        let status = match payload.remove("status") {
            Some(Value::String(s)) if s == "ok" => Status::Ok,
            Some(Value::String(s)) if s == "error" => Status::Error,
            Some(other) => {
                return Err(SimError::Protocol(format!("unknown status: {}", other)));
            }
            None => return Err(SimError::Protocol("response without 'status'".into())),
        };
        let error = match status {
            Status::Ok => {
                payload.remove("error");
                None
            }
            Status::Error => Some(match payload.remove("error") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => "remote reported an error without a message".to_string(),
            }),
        };
        Ok(Self {
            status,
            payload,
            error,
        })
    }

    pub fn to_payload(&self) -> Map<String, Value> {
        let mut out = self.payload.clone();
        out.insert("status".into(), Value::String(self.status.as_str().into()));
        if let Some(e) = &self.error {
            out.insert("error".into(), Value::String(e.clone()));
        }
        out
    }

    /// status == error 转为 RemoteCommandError，否则返回结果键
    pub fn into_result(self, command: &str) -> Result<Map<String, Value>, SimError> {
        match self.status {
            Status::Ok => Ok(self.payload),
            Status::Error => Err(SimError::Remote {
                command: command.to_string(),
                message: self.error.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_command_payload_puts_command_key_first_class() {
        let cmd = Command::new("move_to").arg("location", json!([1.0, 2.0, 3.0]));
        let payload = cmd.to_payload();
        assert_eq!(payload["command"], json!("move_to"));
        assert_eq!(payload["location"], json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_command_argument_cannot_override_name() {
        let cmd = Command::new("reset").arg("command", "destroy_object");
        assert_eq!(cmd.to_payload()["command"], json!("reset"));
    }

    #[test]
    fn test_response_error_carries_message() {
        let resp = Response::from_payload(obj(json!({"status": "error", "error": "no such id"}))).unwrap();
        assert_eq!(resp.status, Status::Error);
        let err = resp.into_result("look_at").unwrap_err();
        match err {
            SimError::Remote { command, message } => {
                assert_eq!(command, "look_at");
                assert_eq!(message, "no such id");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_response_without_status_is_protocol_violation() {
        let err = Response::from_payload(obj(json!({"distance": 1.0}))).unwrap_err();
        assert!(matches!(err, SimError::Protocol(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_response_unknown_status_is_protocol_violation() {
        let err = Response::from_payload(obj(json!({"status": "maybe"}))).unwrap_err();
        assert!(matches!(err, SimError::Protocol(_)));
    }
}
