//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BIM__*` 覆盖（双下划线表示嵌套，如 `BIM__SIMULATOR__PORT=9000`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::sim::client::DEFAULT_MAX_FRAME_BYTES;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub simulator: SimulatorSection,
    pub model: ModelSection,
    pub sandbox: SandboxSection,
    pub tools: ToolsSection,
    pub speech: SpeechSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：ReAct 循环上限、是否打印轨迹
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            verbose: false,
        }
    }
}

fn default_max_iterations() -> usize {
    5
}

/// [simulator] 段：仿真器地址与帧/超时限制
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorSection {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 单次请求/响应往返超时（秒），0 表示不限
    #[serde(default = "default_sim_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for SimulatorSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_sim_request_timeout_secs(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_sim_request_timeout_secs() -> u64 {
    120
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// [model] 段：启动时加载的 IFC 文件与 IFC→glTF 转换器
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ModelSection {
    pub ifc_path: Option<PathBuf>,
    pub converter: Option<PathBuf>,
}

/// [sandbox] 段
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    /// 单个脚本最多执行的步数（含循环展开）
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    1000
}

/// [tools] 段：工具超时与查询后端
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub query: QuerySection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            query: QuerySection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    180
}

/// [tools.query] 段：图查询服务
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySection {
    /// 未设置时 query_building 返回「未配置」观察
    pub endpoint: Option<String>,
    #[serde(default = "default_query_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_query_timeout_secs() -> u64 {
    60
}

/// [speech] 段：仿真器内语音播报
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// 工具开始执行时播报「Using the ... tool」
    #[serde(default = "default_true")]
    pub announce_tools: bool,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: default_voice(),
            announce_tools: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_voice() -> String {
    String::new()
}

/// 从 config 目录加载配置，环境变量 BIM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BIM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BIM")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
