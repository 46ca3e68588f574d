use thiserror::Error;

pub type Result<T> = std::result::Result<T, R2rError>;

#[derive(Debug, Error)]
pub enum R2rError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("R2R 服务错误 ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("无效响应: {0}")]
    InvalidResponse(String),

    #[error("令牌解析失败: {0}")]
    Token(String),

    #[error("无效请求: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
