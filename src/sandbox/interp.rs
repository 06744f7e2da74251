//! 脚本解释器
//!
//! 整个脚本执行期间持有仿真器连接锁（单线程、不可重入）；模型句柄在 load_model 成功后
//! 立即写回 BuildingSession，之后的步骤与后续调用都能看到新模型。

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::core::BuildingSession;
use crate::model::{Entity, ModelIndex, Placement};
use crate::sandbox::capabilities::{lookup, Capability, LocalOp, RemoteCapability, Returns};
use crate::sandbox::script::{Script, Step};
use crate::sandbox::{
    ExecMode, ExecutionError, FAILURE_SENTINEL, NO_RESULT_SENTINEL, RESULT_BINDING, SUCCESS_SENTINEL,
};
use crate::sim::{Command, SimulatorClient};

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecutionError>> + Send + 'a>>;

pub struct Sandbox {
    session: Arc<BuildingSession>,
    max_steps: usize,
}

impl Sandbox {
    pub fn new(session: Arc<BuildingSession>, max_steps: usize) -> Self {
        Self { session, max_steps }
    }

    /// 会话当前模型的来源文件
    pub async fn loaded_model(&self) -> Option<PathBuf> {
        self.session.model().await.map(|m| m.source().to_path_buf())
    }

    /// 副作用模式：成功 / 失败哨兵
    pub async fn run_side_effect(&self, source: &str) -> String {
        self.run(source, ExecMode::SideEffect).await
    }

    /// 取值模式：`result` 的字符串形式，或「无结果」/ 失败哨兵
    pub async fn run_for_value(&self, source: &str) -> String {
        self.run(source, ExecMode::Value).await
    }

    pub async fn run(&self, source: &str, mode: ExecMode) -> String {
        let outcome = match Script::parse(source) {
            Ok(script) => {
                info!(script = %script.to_json(), ?mode, "Executing script");
                self.execute(&script, mode).await
            }
            Err(e) => Err(e),
        };
        match (outcome, mode) {
            (Err(e), _) => {
                error!(error = %e, "Error executing script");
                FAILURE_SENTINEL.to_string()
            }
            (Ok(_), ExecMode::SideEffect) => {
                debug!("Script executed successfully");
                SUCCESS_SENTINEL.to_string()
            }
            (Ok(Some(value)), ExecMode::Value) => {
                debug!(result = %value, "Script produced a result");
                value_to_text(&value)
            }
            (Ok(None), ExecMode::Value) => {
                warn!("Script executed but no 'result' was set");
                NO_RESULT_SENTINEL.to_string()
            }
        }
    }

    /// 执行脚本，返回 `result` 绑定（null 视为未设置）
    pub async fn execute(&self, script: &Script, mode: ExecMode) -> Result<Option<Value>, ExecutionError> {
        let model = self.session.model().await;
        let mut client = self.session.lock_client().await;
        let mut frame = Frame {
            client: &mut *client,
            session: &self.session,
            model,
            vars: HashMap::new(),
            mode,
            steps: 0,
            max_steps: self.max_steps,
        };
        frame.vars.insert(RESULT_BINDING.to_string(), Value::Null);
        frame.exec_block(&script.steps).await?;
        Ok(match frame.vars.remove(RESULT_BINDING) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        })
    }
}

/// 字符串原样返回，其他值用紧凑 JSON
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// 对象 / 实体取 `id`，字符串原样
fn id_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(o) => o.get("id").and_then(Value::as_str),
        _ => None,
    }
}

struct Frame<'a> {
    client: &'a mut SimulatorClient,
    session: &'a BuildingSession,
    model: Option<Arc<ModelIndex>>,
    vars: HashMap<String, Value>,
    mode: ExecMode,
    steps: usize,
    max_steps: usize,
}

impl<'a> Frame<'a> {
    fn exec_block<'s>(&'s mut self, steps: &'s [Step]) -> StepFuture<'s> {
        Box::pin(async move {
            for step in steps {
                self.steps += 1;
                if self.steps > self.max_steps {
                    return Err(ExecutionError::StepLimit(self.max_steps));
                }
                match step {
                    Step::Call { name, args, bind } => {
                        let mut resolved = Map::new();
                        for (key, value) in args {
                            resolved.insert(key.clone(), self.resolve(value)?);
                        }
                        let out = self.call(name, resolved).await?;
                        if let Some(var) = bind {
                            self.vars.insert(var.clone(), out);
                        }
                    }
                    Step::Let { name, value } => {
                        let value = self.resolve(value)?;
                        self.vars.insert(name.clone(), value);
                    }
                    Step::ForEach { items, var, body } => {
                        let items = match self.resolve(items)? {
                            Value::Array(a) => a,
                            Value::Null => Vec::new(),
                            other => {
                                return Err(ExecutionError::InvalidScript(format!(
                                    "for_each expects an array, got {}",
                                    other
                                )))
                            }
                        };
                        for item in items {
                            self.vars.insert(var.clone(), item);
                            self.exec_block(body).await?;
                        }
                    }
                    Step::If {
                        cond,
                        then,
                        otherwise,
                    } => {
                        let branch = if truthy(&self.resolve(cond)?) { then } else { otherwise };
                        self.exec_block(branch).await?;
                    }
                }
            }
            Ok(())
        })
    }

    /// 解析变量引用；数组与对象递归解析
    fn resolve(&self, value: &Value) -> Result<Value, ExecutionError> {
        match value {
            Value::String(s) if s.starts_with("$$") => Ok(Value::String(s[1..].to_string())),
            Value::String(s) if s.starts_with('$') => self.lookup_path(&s[1..]),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn lookup_path(&self, path: &str) -> Result<Value, ExecutionError> {
        let mut parts = path.split('.');
        let name = parts.next().unwrap_or_default();
        let mut current = self
            .vars
            .get(name)
            .ok_or_else(|| ExecutionError::UnboundVariable(name.to_string()))?;
        for part in parts {
            let next = match current {
                Value::Object(o) => o.get(part),
                Value::Array(a) => part.parse::<usize>().ok().and_then(|i| a.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| ExecutionError::BadPath(format!("${}", path)))?;
        }
        Ok(current.clone())
    }

    async fn call(&mut self, name: &str, args: Map<String, Value>) -> Result<Value, ExecutionError> {
        let cap = lookup(name).ok_or_else(|| ExecutionError::UnknownCapability(name.to_string()))?;
        if self.mode == ExecMode::Value && !cap.read_only() {
            return Err(ExecutionError::ReadOnlyViolation(name.to_string()));
        }
        match cap {
            Capability::Remote(cap) => self.call_remote(cap, args).await,
            Capability::Local(cap) => self.call_local(cap.op, name, args).await,
        }
    }

    async fn call_remote(
        &mut self,
        cap: &'static RemoteCapability,
        mut args: Map<String, Value>,
    ) -> Result<Value, ExecutionError> {
        for required in cap.required {
            if !args.contains_key(*required) {
                return Err(missing(cap.name, required));
            }
        }
        for (key, default) in cap.optional {
            if !args.contains_key(*key) {
                args.insert(key.to_string(), serde_json::from_str(default).unwrap_or(Value::Null));
            }
        }
        if let Some(extra) = args
            .keys()
            .find(|k| !cap.required.contains(&k.as_str()) && !cap.optional.iter().any(|(o, _)| *o == k.as_str()))
        {
            return Err(invalid(cap.name, format!("unexpected argument '{}'", extra)));
        }

        // 这两个命令要同步本地隐藏缓存
        match cap.name {
            "set_object_visibility" => {
                let id = str_arg(cap.name, &args, "id")?;
                let visible = args
                    .get("visibility")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| invalid(cap.name, "visibility must be a boolean"))?;
                self.client.set_object_visibility(&id, visible).await?;
                return Ok(Value::Bool(true));
            }
            "reset" => {
                self.client.reset().await?;
                return Ok(Value::Bool(true));
            }
            _ => {}
        }

        let mut payload = self
            .client
            .call(&Command::with_arguments(cap.name, args))
            .await?;
        Ok(match cap.returns {
            Returns::Ack => Value::Bool(true),
            Returns::Key(key) => payload
                .remove(key)
                .ok_or_else(|| ExecutionError::MissingResponseKey {
                    command: cap.name.to_string(),
                    key: key.to_string(),
                })?,
            Returns::OptionalKey(key) => payload.remove(key).unwrap_or(Value::Null),
            Returns::Whole => {
                payload.remove("status");
                Value::Object(payload)
            }
        })
    }

    async fn call_local(
        &mut self,
        op: LocalOp,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<Value, ExecutionError> {
        match op {
            LocalOp::GetHiddenObjects => Ok(Value::from(self.client.hidden_objects().to_vec())),
            LocalOp::LoadModel => {
                let path = PathBuf::from(str_arg(name, &args, "path")?);
                let index = Arc::new(self.session.loader().load(self.client, &path).await?);
                self.session.replace_model(index.clone()).await;
                let summary = serde_json::json!({
                    "source": path.display().to_string(),
                    "entities": index.len(),
                });
                self.model = Some(index);
                Ok(summary)
            }
            LocalOp::LoadProp => {
                let path = PathBuf::from(str_arg(name, &args, "path")?);
                let tags = match args.get("tags") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|t| t.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| invalid(name, "tags must be strings"))?,
                    Some(_) => return Err(invalid(name, "tags must be an array")),
                };
                let variant = args.get("variant").and_then(Value::as_str).unwrap_or("");
                let defaults = Placement::default();
                let placement = Placement {
                    location: vec3_arg(name, &args, "location", defaults.location)?,
                    rotation: vec3_arg(name, &args, "rotation", defaults.rotation)?,
                    scale: vec3_arg(name, &args, "scale", defaults.scale)?,
                };
                let id = self
                    .session
                    .loader()
                    .load_prop(self.client, &path, tags, &placement, variant)
                    .await?;
                Ok(Value::String(id))
            }
            LocalOp::FindByType => {
                let ty = str_arg(name, &args, "type")?;
                let model = self.model()?;
                Ok(Value::Array(model.find_by_type(&ty).map(Entity::to_value).collect()))
            }
            LocalOp::GetByGuid => {
                let id = str_arg(name, &args, "id")?;
                Ok(self
                    .model()?
                    .get_by_guid(&id)
                    .map(Entity::to_value)
                    .unwrap_or(Value::Null))
            }
            LocalOp::Entity => {
                let target = arg(name, &args, "id")?;
                let id = id_of(target).ok_or_else(|| invalid(name, "id must be a string or an object with an id"))?;
                let known = self.model.as_ref().and_then(|m| m.get_by_guid(id));
                Ok(match known {
                    Some(entity) => entity.to_value(),
                    None => serde_json::json!({"id": id, "type": null, "name": null}),
                })
            }
            LocalOp::FilterByType => {
                let ty = str_arg(name, &args, "type")?;
                let model = self.model()?;
                let objects = match arg(name, &args, "objects")? {
                    Value::Array(items) => items,
                    Value::Null => return Ok(Value::Array(Vec::new())),
                    _ => return Err(invalid(name, "objects must be an array")),
                };
                let kept = objects
                    .iter()
                    .filter(|o| {
                        id_of(o)
                            .and_then(|id| model.get_by_guid(id))
                            .is_some_and(|e| e.is_a(&ty))
                    })
                    .cloned()
                    .collect();
                Ok(Value::Array(kept))
            }
            LocalOp::IsType => {
                let ty = str_arg(name, &args, "type")?;
                let model = self.model()?;
                let target = arg(name, &args, "id")?;
                Ok(Value::Bool(
                    id_of(target)
                        .and_then(|id| model.get_by_guid(id))
                        .is_some_and(|e| e.is_a(&ty)),
                ))
            }
            LocalOp::Count => Ok(Value::from(match arg(name, &args, "items")? {
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                Value::String(s) => s.chars().count(),
                Value::Null => 0,
                _ => return Err(invalid(name, "items must be a collection")),
            })),
            LocalOp::First | LocalOp::Last => match arg(name, &args, "items")? {
                Value::Array(a) => {
                    let picked = if op == LocalOp::First { a.first() } else { a.last() };
                    Ok(picked.cloned().unwrap_or(Value::Null))
                }
                Value::Null => Ok(Value::Null),
                _ => Err(invalid(name, "items must be an array")),
            },
            LocalOp::Ids => match arg(name, &args, "items")? {
                Value::Array(a) => Ok(Value::Array(
                    a.iter()
                        .filter_map(id_of)
                        .map(|id| Value::String(id.to_string()))
                        .collect(),
                )),
                Value::Null => Ok(Value::Array(Vec::new())),
                _ => Err(invalid(name, "items must be an array")),
            },
            LocalOp::Contains => {
                let needle = arg(name, &args, "value")?;
                let found = match arg(name, &args, "items")? {
                    Value::Array(a) => a.iter().any(|item| match (id_of(item), id_of(needle)) {
                        (Some(x), Some(y)) => x == y,
                        _ => item == needle,
                    }),
                    Value::Null => false,
                    _ => return Err(invalid(name, "items must be an array")),
                };
                Ok(Value::Bool(found))
            }
            LocalOp::Eq => Ok(Value::Bool(arg(name, &args, "left")? == arg(name, &args, "right")?)),
            LocalOp::Lt | LocalOp::Gt => {
                let left = num_arg(name, &args, "left")?;
                let right = num_arg(name, &args, "right")?;
                Ok(Value::Bool(if op == LocalOp::Lt { left < right } else { left > right }))
            }
            LocalOp::Not => Ok(Value::Bool(!truthy(arg(name, &args, "value")?))),
        }
    }

    fn model(&self) -> Result<Arc<ModelIndex>, ExecutionError> {
        self.model.clone().ok_or(ExecutionError::NoModel)
    }
}

fn missing(capability: &str, argument: &str) -> ExecutionError {
    ExecutionError::MissingArgument {
        capability: capability.to_string(),
        argument: argument.to_string(),
    }
}

fn invalid(capability: &str, reason: impl Into<String>) -> ExecutionError {
    ExecutionError::InvalidArgument {
        capability: capability.to_string(),
        reason: reason.into(),
    }
}

fn arg<'m>(capability: &str, args: &'m Map<String, Value>, key: &str) -> Result<&'m Value, ExecutionError> {
    args.get(key).ok_or_else(|| missing(capability, key))
}

fn str_arg(capability: &str, args: &Map<String, Value>, key: &str) -> Result<String, ExecutionError> {
    let value = arg(capability, args, key)?;
    id_of(value)
        .map(str::to_string)
        .ok_or_else(|| invalid(capability, format!("{} must be a string", key)))
}

fn num_arg(capability: &str, args: &Map<String, Value>, key: &str) -> Result<f64, ExecutionError> {
    arg(capability, args, key)?
        .as_f64()
        .ok_or_else(|| invalid(capability, format!("{} must be a number", key)))
}

fn vec3_arg(
    capability: &str,
    args: &Map<String, Value>,
    key: &str,
    default: [f64; 3],
) -> Result<[f64; 3], ExecutionError> {
    let Some(value) = args.get(key) else {
        return Ok(default);
    };
    let parts: Option<Vec<f64>> = value
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_f64).collect());
    match parts.as_deref() {
        Some([x, y, z]) => Ok([*x, *y, *z]),
        _ => Err(invalid(capability, format!("{} must be [x, y, z]", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorSection;
    use crate::model::ModelLoader;
    use crate::sim::{read_frame, write_frame, Response};
    use std::time::Duration;
    use serde_json::json;
    use tokio::io::duplex;
    use tokio::sync::mpsc;

    const HOUSE: &str = "ISO-10303-21;\nDATA;\n\
#10= IFCDOOR('1TAGlQkKXEnQ4lBJfHnOcM',#2,'Door-1',$);\n\
#11= IFCWINDOW('0LV8Pg$bXDXgDaaGRXNl$H',#2,'Window-1',$);\n\
#12= IFCWALLSTANDARDCASE('2XPyKWY018sA1ygZKgQPtU',#2,'Wall-1',$);\n\
ENDSEC;\nEND-ISO-10303-21;\n";

    /// 仿真端替身：每个请求都送回测试，响应由 responder 决定
    fn sandbox_with(
        responder: impl Fn(&Command) -> Response + Send + 'static,
    ) -> (Sandbox, Arc<BuildingSession>, mpsc::UnboundedReceiver<Command>) {
        let (client_end, mut server) = duplex(1 << 16);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok(req) = read_frame(&mut server, 1 << 24).await {
                let Ok(cmd) = Command::from_payload(req) else { break };
                let reply = responder(&cmd).to_payload();
                let _ = tx.send(cmd);
                if write_frame(&mut server, &reply).await.is_err() {
                    break;
                }
            }
        });
        let session = Arc::new(BuildingSession::new(
            SimulatorClient::from_stream(client_end, "fake"),
            ModelLoader::default(),
            SimulatorSection::default(),
        ));
        (Sandbox::new(session.clone(), 100), session, rx)
    }

    fn ok_with(v: Value) -> Response {
        match v {
            Value::Object(map) => Response::ok(map),
            _ => Response::ok(Map::new()),
        }
    }

    fn ok_everything() -> impl Fn(&Command) -> Response + Send + 'static {
        |req| match req.name.as_str() {
            "in_sight" => ok_with(json!({"objects": [
                {"id": "1TAGlQkKXEnQ4lBJfHnOcM", "location": [0, 0, 0]},
                {"id": "0LV8Pg$bXDXgDaaGRXNl$H", "location": [1, 0, 0]},
                {"id": "prop-x", "location": [2, 0, 0]}
            ]})),
            "distance" => ok_with(json!({"distance": 12.5})),
            "look_at" => Response::error("unknown id"),
            _ => Response::ok(Map::new()),
        }
    }

    async fn with_house(session: &BuildingSession) {
        let index = ModelIndex::parse("house.ifc", HOUSE).unwrap();
        session.replace_model(Arc::new(index)).await;
    }

    #[tokio::test]
    async fn test_side_effect_success_sentinel() {
        let (sandbox, _session, mut rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_side_effect(r#"{"steps": [{"op": "call", "name": "move_forward", "args": {"amount": 100}}]}"#)
            .await;
        assert_eq!(out, SUCCESS_SENTINEL);
        let req = rx.recv().await.unwrap();
        assert_eq!(req.name, "move_forward");
        assert_eq!(req.arguments["amount"], json!(100));
    }

    #[tokio::test]
    async fn test_side_effect_failure_sentinel_on_remote_error() {
        let (sandbox, session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_side_effect(r#"[{"op": "call", "name": "look_at", "args": {"id": "nope"}}]"#)
            .await;
        assert_eq!(out, FAILURE_SENTINEL);
        // 远端错误不破坏连接
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn test_unknown_capability_fails() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_side_effect(r#"[{"op": "call", "name": "exec", "args": {"code": "rm -rf /"}}]"#)
            .await;
        assert_eq!(out, FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_unparseable_script_fails() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        assert_eq!(sandbox.run_for_value("l.reset()").await, FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_value_mode_returns_string_form() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_for_value(r#"[{"op": "let", "name": "result", "value": ["a", "b"]}]"#)
            .await;
        assert_eq!(out, r#"["a","b"]"#);
        let out = sandbox
            .run_for_value(r#"[{"op": "let", "name": "result", "value": "guid-1"}]"#)
            .await;
        assert_eq!(out, "guid-1");
    }

    #[tokio::test]
    async fn test_value_mode_without_result() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_for_value(r#"[{"op": "call", "name": "distance", "args": {"id": "x"}, "bind": "d"}]"#)
            .await;
        assert_eq!(out, NO_RESULT_SENTINEL);
        let out = sandbox
            .run_for_value(r#"[{"op": "let", "name": "result", "value": null}]"#)
            .await;
        assert_eq!(out, NO_RESULT_SENTINEL);
    }

    #[tokio::test]
    async fn test_response_key_is_bound() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_for_value(r#"[{"op": "call", "name": "distance", "args": {"id": "x"}, "bind": "result"}]"#)
            .await;
        assert_eq!(out, "12.5");
    }

    #[tokio::test]
    async fn test_filter_objects_in_sight_by_model_type() {
        let (sandbox, session, _rx) = sandbox_with(ok_everything());
        with_house(&session).await;
        let script = r#"{"steps": [
            {"op": "call", "name": "in_sight", "bind": "seen"},
            {"op": "call", "name": "filter_by_type", "args": {"objects": "$seen", "type": "IfcWindow"}, "bind": "windows"},
            {"op": "call", "name": "ids", "args": {"items": "$windows"}, "bind": "result"}
        ]}"#;
        assert_eq!(sandbox.run_for_value(script).await, r#"["0LV8Pg$bXDXgDaaGRXNl$H"]"#);
    }

    #[tokio::test]
    async fn test_for_each_and_if() {
        let (sandbox, session, mut rx) = sandbox_with(ok_everything());
        with_house(&session).await;
        let script = r#"{"steps": [
            {"op": "call", "name": "in_sight", "bind": "seen"},
            {"op": "for_each", "in": "$seen", "as": "o", "do": [
                {"op": "call", "name": "is_type", "args": {"id": "$o", "type": "door"}, "bind": "is_door"},
                {"op": "if", "cond": "$is_door", "then": [
                    {"op": "call", "name": "set_object_visibility", "args": {"id": "$o.id", "visibility": false}}
                ]}
            ]},
            {"op": "call", "name": "get_hidden_objects", "bind": "hidden"}
        ]}"#;
        assert_eq!(sandbox.run_side_effect(script).await, SUCCESS_SENTINEL);
        let commands: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| r.name)
            .collect();
        assert_eq!(commands, vec!["in_sight", "set_object_visibility"]);
        let hidden = session.lock_client().await.hidden_objects().to_vec();
        assert_eq!(hidden, vec!["1TAGlQkKXEnQ4lBJfHnOcM"]);
        let out = sandbox
            .run_for_value(r#"[{"op": "call", "name": "get_hidden_objects", "bind": "result"}]"#)
            .await;
        assert_eq!(out, r#"["1TAGlQkKXEnQ4lBJfHnOcM"]"#);
    }

    #[tokio::test]
    async fn test_model_queries_without_model_fail() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_for_value(r#"[{"op": "call", "name": "find_by_type", "args": {"type": "IfcDoor"}, "bind": "result"}]"#)
            .await;
        assert_eq!(out, FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_find_by_type_includes_subtypes() {
        let (sandbox, session, _rx) = sandbox_with(ok_everything());
        with_house(&session).await;
        let script = r#"[
            {"op": "call", "name": "find_by_type", "args": {"type": "IfcWall"}, "bind": "walls"},
            {"op": "let", "name": "result", "value": "$walls.0.name"}
        ]"#;
        assert_eq!(sandbox.run_for_value(script).await, "Wall-1");
    }

    #[tokio::test]
    async fn test_missing_argument_and_unexpected_argument() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        assert_eq!(
            sandbox.run_side_effect(r#"[{"op": "call", "name": "distance"}]"#).await,
            FAILURE_SENTINEL
        );
        assert_eq!(
            sandbox
                .run_side_effect(r#"[{"op": "call", "name": "reset", "args": {"hard": true}}]"#)
                .await,
            FAILURE_SENTINEL
        );
    }

    #[tokio::test]
    async fn test_optional_defaults_are_sent() {
        let (sandbox, _session, mut rx) = sandbox_with(ok_everything());
        let out = sandbox
            .run_side_effect(r#"[{"op": "call", "name": "rotate_prop_yaw", "args": {"id": "p1"}}]"#)
            .await;
        assert_eq!(out, SUCCESS_SENTINEL);
        assert_eq!(rx.recv().await.unwrap().arguments["yaw"], json!(90));
    }

    #[tokio::test]
    async fn test_value_mode_rejects_scene_changes() {
        let (sandbox, session, mut rx) = sandbox_with(ok_everything());
        with_house(&session).await;
        for script in [
            r#"[{"op": "call", "name": "destroy_object", "args": {"id": "x"}}, {"op": "let", "name": "result", "value": "done"}]"#,
            r#"[{"op": "call", "name": "set_object_visibility", "args": {"id": "x", "visibility": false}}]"#,
            r#"[{"op": "call", "name": "load_model", "args": {"path": "other.ifc"}}]"#,
            r#"[{"op": "call", "name": "reset"}]"#,
        ] {
            assert_eq!(sandbox.run_for_value(script).await, FAILURE_SENTINEL);
        }
        let err = sandbox
            .execute(
                &Script::parse(r#"[{"op": "call", "name": "destroy_object", "args": {"id": "x"}}]"#).unwrap(),
                ExecMode::Value,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ReadOnlyViolation(ref name) if name == "destroy_object"));
        // 一个请求都没发出
        assert!(rx.try_recv().is_err());
        assert!(session.model().await.is_some_and(|m| m.source().ends_with("house.ifc")));

        let out = sandbox
            .run_for_value(r#"[{"op": "call", "name": "distance", "args": {"id": "x"}, "bind": "result"}]"#)
            .await;
        assert_eq!(out, "12.5");
    }

    #[tokio::test]
    async fn test_dropped_script_never_reads_stale_reply() {
        let (client_end, mut server) = duplex(1 << 16);
        tokio::spawn(async move {
            let mut served = 0u32;
            while read_frame(&mut server, 1 << 24).await.is_ok() {
                served += 1;
                if served == 1 {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
                let reply = ok_with(json!({"distance": served})).to_payload();
                if write_frame(&mut server, &reply).await.is_err() {
                    break;
                }
            }
        });
        let session = Arc::new(BuildingSession::new(
            SimulatorClient::from_stream(client_end, "fake"),
            ModelLoader::default(),
            SimulatorSection::default(),
        ));
        let sandbox = Sandbox::new(session.clone(), 100);

        let first = r#"[{"op": "call", "name": "distance", "args": {"id": "a"}}]"#;
        let dropped = tokio::time::timeout(Duration::from_millis(20), sandbox.run_side_effect(first)).await;
        assert!(dropped.is_err());
        assert!(!session.is_connected().await);

        let second = r#"[{"op": "call", "name": "distance", "args": {"id": "b"}, "bind": "result"}]"#;
        assert_eq!(sandbox.run_for_value(second).await, FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let (client_end, _server) = duplex(64);
        let session = Arc::new(BuildingSession::new(
            SimulatorClient::from_stream(client_end, "fake"),
            ModelLoader::default(),
            SimulatorSection::default(),
        ));
        let sandbox = Sandbox::new(session, 3);
        let script = Script::parse(
            r#"[{"op": "for_each", "in": [1, 2, 3, 4], "as": "i", "do": [{"op": "let", "name": "x", "value": "$i"}]}]"#,
        )
        .unwrap();
        assert!(matches!(
            sandbox.execute(&script, ExecMode::SideEffect).await,
            Err(ExecutionError::StepLimit(3))
        ));
    }

    #[tokio::test]
    async fn test_dollar_escape_and_unbound_variable() {
        let (sandbox, _session, _rx) = sandbox_with(ok_everything());
        assert_eq!(
            sandbox
                .run_for_value(r#"[{"op": "let", "name": "result", "value": "$$5"}]"#)
                .await,
            "$5"
        );
        assert_eq!(
            sandbox
                .run_for_value(r#"[{"op": "let", "name": "result", "value": "$nothing"}]"#)
                .await,
            FAILURE_SENTINEL
        );
    }

    #[tokio::test]
    async fn test_load_model_persists_handle_even_if_later_step_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ifc = dir.path().join("school.ifc");
        std::fs::write(&ifc, HOUSE).unwrap();
        std::fs::write(ModelLoader::gltf_path(&ifc), b"glTF-binary").unwrap();

        let (sandbox, session, mut rx) = sandbox_with(ok_everything());
        let script = json!([
            {"op": "call", "name": "load_model", "args": {"path": ifc.display().to_string()}},
            {"op": "call", "name": "look_at", "args": {"id": "x"}}
        ])
        .to_string();
        assert_eq!(sandbox.run_side_effect(&script).await, FAILURE_SENTINEL);

        let model = session.model().await.unwrap();
        assert_eq!(model.len(), 3);
        assert_eq!(rx.recv().await.unwrap().name, "reset");
        let upload = rx.recv().await.unwrap();
        assert_eq!(upload.name, "load_gltf");
        assert_eq!(upload.arguments["scale"], json!([1.0, 1.0, 1.0]));
    }
}
