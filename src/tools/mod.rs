//! 工具箱：Tool trait、注册表、执行器，以及示例工具（邮件 / SQL / 笔记 / 搜索 / echo）

pub mod echo;
pub mod email;
pub mod executor;
pub mod notes;
pub mod registry;
pub mod schema;
pub mod search;
pub mod sql;

pub use echo::EchoTool;
pub use email::{Outbox, ReadEmailTool, SendEmailTool, SentEmail};
pub use executor::ToolExecutor;
pub use notes::{CorrectNoteTool, InspectNotesTool, Note, NoteCache};
pub use registry::{Tool, ToolRegistration, ToolRegistry, ToolSpec};
pub use schema::{parse_args, schema_of};
pub use search::WebSearchTool;
pub use sql::{preview_query_impact, SelectQueryTool, SqlDatabase, WriteQueryTool};
