//! 工具层：注册表、分发器，以及 query / retrieve / modify 三个建筑工具

pub mod dispatcher;
pub mod modify;
pub mod query;
pub mod registry;
pub mod retrieve;
pub mod script_writer;

pub use dispatcher::{Dispatch, ToolDispatcher, FINISH_ACTION};
pub use modify::ModifyBuildingTool;
pub use query::{HttpQueryBackend, QueryAnswer, QueryBackend, QueryBuildingTool, UnconfiguredQueryBackend};
pub use registry::{normalize_name, Tool, ToolDescriptor, ToolOutput, ToolRegistry};
pub use retrieve::RetrieveBuildingTool;
pub use script_writer::{ScriptPurpose, ScriptWriter};
