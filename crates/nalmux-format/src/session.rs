//! 封装会话 (MuxSession) trait 定义.
//!
//! 编排层只通过此 trait 驱动容器写入, 不关心具体容器格式.

use std::fmt;

use nalmux_codec::CodecKind;
use nalmux_core::MuxResult;

/// 输出布局开关, 两个标志互相独立
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MuxMode {
    /// 只向前写, 从不回写已写出的字节
    pub sequential: bool,
    /// 分片 (fMP4) 布局
    pub fragmented: bool,
}

impl MuxMode {
    /// 普通布局: ftyp, mdat, moov, 关闭时回填 mdat 大小
    pub const MONOLITHIC: Self = Self {
        sequential: false,
        fragmented: false,
    };

    /// 创建模式
    pub fn new(sequential: bool, fragmented: bool) -> Self {
        Self {
            sequential,
            fragmented,
        }
    }

    /// 该布局是否需要回写
    pub fn needs_rewind(&self) -> bool {
        !self.sequential
    }
}

impl fmt::Display for MuxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sequential, self.fragmented) {
            (false, false) => write!(f, "monolithic"),
            (true, false) => write!(f, "sequential"),
            (false, true) => write!(f, "fragmented"),
            (true, true) => write!(f, "fragmented+sequential"),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 已创建, 尚未打开
    Uninitialized,
    /// 已打开, 可以写入
    Open,
    /// 已关闭, 不再接受任何调用
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// 会话统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MuxStats {
    /// 已写出的样本数
    pub samples: u64,
    /// 收到的 NAL 单元数
    pub nal_units: u64,
    /// 被丢弃的 NAL 单元数 (参数集齐备前的图像切片, 空单元)
    pub dropped: u64,
    /// 样本数据字节数 (含长度前缀)
    pub bytes: u64,
    /// 已写出样本的总时长 (ticks)
    pub duration: u64,
}

/// 封装会话 trait
///
/// 使用流程:
/// 1. 调用 `open()` 写入容器头部
/// 2. 调用 `init_track()` 声明视频轨道 (恰好一次)
/// 3. 循环调用 `write_nal()` 写入 NAL 单元
/// 4. 调用 `close()` 完成封装
///
/// 在错误状态下调用任何方法都返回 `ContractViolation`.
pub trait MuxSession {
    /// 打开会话, 写入容器头部
    fn open(&mut self, mode: MuxMode) -> MuxResult<()>;

    /// 声明视频轨道
    fn init_track(&mut self, width: u32, height: u32, codec: CodecKind) -> MuxResult<()>;

    /// 设置文本注释, 需在 moov 写出之前调用
    fn set_comment(&mut self, text: &str) -> MuxResult<()>;

    /// 写入一个 NAL 单元 (含起始码)
    ///
    /// # 参数
    /// - `duration`: 以该单元开始的样本的时长 (ticks)
    fn write_nal(&mut self, nal: &[u8], duration: u32) -> MuxResult<()>;

    /// 完成封装, 之后会话进入 `Closed`
    fn close(&mut self) -> MuxResult<()>;

    /// 当前状态
    fn state(&self) -> SessionState;

    /// 统计信息
    fn stats(&self) -> MuxStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert_eq!(MuxMode::MONOLITHIC.to_string(), "monolithic");
        assert_eq!(MuxMode::new(true, false).to_string(), "sequential");
        assert_eq!(MuxMode::new(true, true).to_string(), "fragmented+sequential");
    }

    #[test]
    fn test_mode_rewind() {
        assert!(MuxMode::MONOLITHIC.needs_rewind());
        assert!(MuxMode::new(false, true).needs_rewind());
        assert!(!MuxMode::new(true, true).needs_rewind());
    }
}
