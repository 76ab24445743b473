//! 编码名称与转换会话描述符。
//!
//! # 模块定位（Why）
//! - 描述符记录一次转换会话的源编码与目标编码，打开后不可变；
//! - 名称在打开时复制进分配器授予的独立缓冲，不借用调用方内存，调用方字符串随后释放也不会悬垂。
//!
//! # 契约说明（What）
//! - 打开操作不校验编码是否受支持，组合是否可用推迟到转换时由引擎判定；
//! - 第二个名称复制失败时，第一个名称的缓冲随 `?` 提前返回而析构并归还分配器，
//!   不会有半构造的描述符逃逸。

use std::fmt;

use tracing::debug;

use crate::{
    error::{CharConvError, Result},
    memory::{Allocator, GlobalHeap, ZeroedBuffer},
};

/// `UTF-8` 编码名。
pub const UTF_8: &str = "UTF-8";
/// `UTF-16` 编码名（16 位单元按小端存放）。
pub const UTF_16: &str = "UTF-16";
/// `ISO-8859-1` 编码名。
pub const ISO_8859_1: &str = "ISO-8859-1";

/// 以 NUL 结尾的编码名副本。
///
/// 存储长度为 `名称字节数 + 1`，末尾字节恒为 0。比较按字节进行，区分大小写。
pub struct EncodingName {
    storage: ZeroedBuffer,
    len: usize,
}

impl EncodingName {
    /// 把 `name` 复制进 `allocator` 授予的新缓冲。
    fn copy_in(allocator: &dyn Allocator, name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(CharConvError::invalid("encoding name is empty"));
        }
        if name.as_bytes().contains(&0) {
            return Err(CharConvError::invalid(format!(
                "encoding name {name:?} contains an interior NUL"
            )));
        }

        let len = name.len();
        let size = terminated_size(name);
        let mut storage = allocator
            .allocate_zeroed(size)
            .filter(|storage| storage.len() >= size)
            .ok_or(CharConvError::out_of_memory("copying encoding name"))?;
        storage[..len].copy_from_slice(name.as_bytes());
        storage[len] = 0;
        Ok(Self { storage, len })
    }

    /// 名称字节，不含结尾 NUL。
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// 名称字节，含结尾 NUL。
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.storage[..=self.len]
    }

    /// 与 `other` 逐字节比较。
    pub fn matches(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq for EncodingName {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for EncodingName {}

impl fmt::Display for EncodingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for EncodingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodingName({self})")
    }
}

/// 一次转换会话的编码组合。
///
/// # 教案式说明
/// - **意图 (Why)**：以值对象固定 `(from, to)`，引擎按精确匹配分派；
/// - **契约 (What)**：创建后不可变，由创建它的会话独占，最后一次转换完成后随所有权释放；
///   同一组名称打开两次得到两个互不共享存储的描述符；
/// - **风险 (Trade-offs)**：宿主若在多线程环境共享同一描述符，需要自行保证并发纪律，核心不做内部同步。
#[derive(Debug, PartialEq, Eq)]
pub struct EncodingDescriptor {
    from: EncodingName,
    to: EncodingName,
}

impl EncodingDescriptor {
    /// 使用进程全局堆打开描述符。
    pub fn open(from: &str, to: &str) -> Result<Self> {
        Self::open_in(&GlobalHeap, from, to)
    }

    /// 使用指定分配器打开描述符。
    ///
    /// # 契约定义（What）
    /// - **输入**：`from`/`to` 为非空、不含 NUL 的编码名；
    /// - **后置条件**：成功时两个名称各占一块独立缓冲；
    /// - **失败**：任一复制失败返回 `OutOfMemory`，已完成的复制在返回前归还分配器。
    pub fn open_in(allocator: &dyn Allocator, from: &str, to: &str) -> Result<Self> {
        let from = EncodingName::copy_in(allocator, from)?;
        let to = EncodingName::copy_in(allocator, to)?;
        debug!(from = %from, to = %to, "encoding descriptor opened");
        Ok(Self { from, to })
    }

    /// 源编码。
    pub fn from(&self) -> &EncodingName {
        &self.from
    }

    /// 目标编码。
    pub fn to(&self) -> &EncodingName {
        &self.to
    }
}

/// 含结尾 NUL 的字节长度。
fn terminated_size(name: &str) -> usize {
    name.len() + 1
}
