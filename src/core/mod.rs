//! 核心层：错误类型、建筑会话（连接 + 模型句柄）、单次运行的取消管理

pub mod error;
pub mod session;
pub mod session_supervisor;

pub use error::AgentError;
pub use session::BuildingSession;
pub use session_supervisor::SessionSupervisor;
