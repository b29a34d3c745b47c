//! 字节源抽象层.
//!
//! 为解封装器提供带缓冲的顺序读取、绝对/相对定位和总大小查询,
//! 底层可以是文件或内存缓冲区. 读到末尾时返回 [`YingError::Eof`].

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use ying_core::{YingError, YingResult};

/// 字节源后端 trait
///
/// 实现此 trait 以支持不同的数据来源.
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示已到末尾
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// I/O 上下文
///
/// 封装底层后端, 为解封装器提供统一的读取接口.
pub struct IoContext {
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

impl IoContext {
    /// 从后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 以只读方式打开文件
    pub fn open_read(path: impl AsRef<Path>) -> YingResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从内存数据创建
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 读取指定字节数, 数据不足时返回 `Eof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> YingResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    return Err(YingError::Eof);
                }
            }
        }
        Ok(())
    }

    /// 读取 u16 小端
    pub fn read_u16_le(&mut self) -> YingResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// 读取 u32 小端
    pub fn read_u32_le(&mut self) -> YingResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// 读取 4 字节标签 (FourCC)
    pub fn read_tag(&mut self) -> YingResult<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> YingResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> YingResult<()> {
        if count <= self.buf_len - self.buf_pos {
            self.buf_pos += count;
            return Ok(());
        }
        self.seek(SeekFrom::Current(count as i64))?;
        Ok(())
    }

    /// 定位 (seek), 会清空读缓冲区
    pub fn seek(&mut self, pos: SeekFrom) -> YingResult<u64> {
        // 相对定位要扣除缓冲区中尚未消耗的数据
        let pos = match pos {
            SeekFrom::Current(off) => SeekFrom::Current(off - (self.buf_len - self.buf_pos) as i64),
            other => other,
        };
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前位置 (已扣除缓冲区中未消耗的数据)
    pub fn position(&mut self) -> YingResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件后端
pub struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    pub fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// 内存缓冲区后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_内存读取与末尾() {
        let mut io = IoContext::from_memory(vec![0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xAA]);
        assert_eq!(io.size(), Some(7));
        assert_eq!(io.read_u16_le().unwrap(), 0x1234);
        assert_eq!(io.read_u32_le().unwrap(), 0x1234_5678);
        assert_eq!(io.position().unwrap(), 6);
        assert!(matches!(io.read_u16_le(), Err(YingError::Eof)));
    }

    #[test]
    fn test_跳过与相对定位() {
        let data: Vec<u8> = (0..64).collect();
        let mut io = IoContext::from_memory(data);
        assert_eq!(io.read_tag().unwrap(), [0, 1, 2, 3]);
        io.skip(4).unwrap();
        assert_eq!(io.read_bytes(2).unwrap(), vec![8, 9]);
        // 缓冲区已预读全部数据, 相对定位仍按逻辑位置计算
        io.seek(SeekFrom::Current(10)).unwrap();
        assert_eq!(io.position().unwrap(), 20);
        assert_eq!(io.read_bytes(1).unwrap(), vec![20]);
        io.seek(SeekFrom::Start(60)).unwrap();
        assert_eq!(io.read_bytes(4).unwrap(), vec![60, 61, 62, 63]);
        io.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(io.read_bytes(2).unwrap(), vec![62, 63]);
    }

    #[test]
    fn test_负位置定位失败() {
        let mut io = IoContext::from_memory(vec![0; 4]);
        assert!(matches!(io.seek(SeekFrom::End(-8)), Err(YingError::Io(_))));
    }

    #[test]
    fn test_文件后端() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"BIKi\x10\x00\x00\x00").unwrap();
        file.flush().unwrap();

        let mut io = IoContext::open_read(file.path()).unwrap();
        assert_eq!(io.size(), Some(8));
        assert_eq!(&io.read_tag().unwrap(), b"BIKi");
        assert_eq!(io.read_u32_le().unwrap(), 16);
        assert!(matches!(io.read_exact(&mut [0u8; 1]), Err(YingError::Eof)));
    }
}
