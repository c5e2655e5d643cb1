//! 输出接口.
//!
//! 封装会话通过 [`OutputSink`] 按绝对偏移写入 box 数据, 写入顺序可能不是线性的
//! (例如回填 mdat 大小). 提供文件、内存缓冲区和只追加管道三种实现.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use nalmux_core::{MuxError, MuxResult};

/// 输出接口 trait
///
/// 会话只持有借用或所有权, 不负责打开/关闭底层资源.
pub trait OutputSink {
    /// 在绝对偏移 `offset` 处写入全部数据
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// 是否支持回写 (偏移小于当前末尾)
    fn is_seekable(&self) -> bool;

    /// 刷新缓冲数据
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, data)
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

// ============================================================
// 文件
// ============================================================

/// 文件输出
pub struct FileSink {
    writer: BufWriter<File>,
    /// 底层写位置
    pos: u64,
}

impl FileSink {
    /// 创建 (截断) 输出文件
    pub fn create(path: impl AsRef<Path>) -> MuxResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            MuxError::OutputUnavailable(format!("无法创建输出文件 {}: {e}", path.display()))
        })?;
        Ok(Self::from_file(file))
    }

    /// 包装已打开的文件, 从偏移 0 开始写
    pub fn from_file(file: File) -> Self {
        Self {
            writer: BufWriter::new(file),
            pos: 0,
        }
    }
}

impl OutputSink for FileSink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if offset != self.pos {
            self.writer.seek(SeekFrom::Start(offset))?;
        }
        self.writer.write_all(data)?;
        self.pos = offset + data.len() as u64;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ============================================================
// 内存
// ============================================================

/// 内存缓冲区输出
///
/// 用于测试和内存中处理.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Vec<u8>,
}

impl MemorySink {
    /// 创建空缓冲区
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取内部数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 消耗自身, 返回内部数据
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl OutputSink for MemorySink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "偏移超出内存范围"))?;
        let end = start + data.len();
        // 跳过的区域补 0
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

// ============================================================
// 管道
// ============================================================

/// 只追加的流输出 (stdout, 管道)
///
/// 偏移必须等于已写入的字节数, 否则返回错误.
pub struct PipeSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> PipeSink<W> {
    /// 包装一个 writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// 已写入的字节数
    pub fn written(&self) -> u64 {
        self.written
    }

    /// 取回内部 writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputSink for PipeSink<W> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        if offset != self.written {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "管道输出不支持定位写入: offset={offset}, 当前末尾={}",
                    self.written
                ),
            ));
        }
        self.writer.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        false
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
