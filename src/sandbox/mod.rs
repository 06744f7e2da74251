//! 受控脚本执行沙箱
//!
//! 后端生成的脚本是结构化 JSON（见 [`script`]），由解释器逐步执行；脚本能触达的只有
//! [`capabilities`] 表中列出的能力：仿真器命令透传、当前模型索引查询与少量纯本地辅助操作。
//!
//! 两种模式：
//! - 副作用模式：正常结束返回成功哨兵，任何错误返回失败哨兵（细节只写日志）
//! - 取值模式：读取输出绑定 `result`，未绑定时返回「无结果」哨兵；只允许只读能力

pub mod capabilities;
pub mod interp;
pub mod script;

use thiserror::Error;

use crate::model::ModelError;
use crate::sim::SimError;

pub use capabilities::{capability_docs, lookup, Capability, LocalOp, RemoteCapability, Returns};
pub use interp::Sandbox;
pub use script::{script_schema_json, Script, Step};

pub const SUCCESS_SENTINEL: &str = "The query was successfully followed.";
pub const FAILURE_SENTINEL: &str = "There was an error when trying to fulfill the query.";
pub const NO_RESULT_SENTINEL: &str = "No result was returned from the code execution.";

/// 取值模式下读取的输出绑定名
pub const RESULT_BINDING: &str = "result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    SideEffect,
    Value,
}

/// 脚本执行错误：在沙箱边界内被吸收，转为哨兵字符串
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("unknown capability '{0}'")]
    UnknownCapability(String),

    #[error("'{capability}' requires argument '{argument}'")]
    MissingArgument { capability: String, argument: String },

    #[error("'{capability}': {reason}")]
    InvalidArgument { capability: String, reason: String },

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("cannot resolve '{0}'")]
    BadPath(String),

    #[error("'{command}' response has no '{key}'")]
    MissingResponseKey { command: String, key: String },

    #[error("script exceeded {0} steps")]
    StepLimit(usize),

    #[error("no building model is loaded")]
    NoModel,

    #[error("'{0}' changes the scene and is not allowed when retrieving")]
    ReadOnlyViolation(String),

    #[error(transparent)]
    Simulator(#[from] SimError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
