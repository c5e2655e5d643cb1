//! 统一错误类型定义.
//!
//! 所有 nalmux crate 共用的错误类型. 任何错误都会终止当前封装流程,
//! 不存在重试或部分成功的语义.

use thiserror::Error;

/// nalmux 统一错误类型
#[derive(Debug, Error)]
pub enum MuxError {
    /// 无效参数 (帧率为 0、尺寸越界等)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 输入码流无法读取
    #[error("输入不可用: {0}")]
    InputUnavailable(String),

    /// 输出无法打开或初始化
    #[error("输出不可用: {0}")]
    OutputUnavailable(String),

    /// 封装器拒绝了某个 NAL 单元
    #[error("NAL 单元格式错误: {0}")]
    MalformedSegment(String),

    /// 会话 API 调用顺序错误 (如 close 之后继续写入)
    #[error("调用顺序错误: {0}")]
    ContractViolation(String),

    /// 定位写入失败
    #[error("输出写入失败: {0}")]
    SinkWriteFailure(#[from] std::io::Error),
}

impl MuxError {
    /// 是否为调用顺序错误
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::ContractViolation(_))
    }
}

/// nalmux 统一 Result 类型
pub type MuxResult<T> = Result<T, MuxError>;
