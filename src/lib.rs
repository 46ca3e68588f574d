//! R2R 文档块检索 MCP 工具核心库
//! 会话守卫负责令牌生命周期，检索流水线负责搜索与正文补全。

pub mod config;
pub mod error;
pub mod model;
pub mod token;
pub mod client;
pub mod session;
pub mod search;
pub mod http;
pub mod mcp;
