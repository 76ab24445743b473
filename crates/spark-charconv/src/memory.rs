//! 内存协作者契约：零初始化分配器、尺寸档位堆管理器与档位选择策略。
//!
//! # 模块定位（Why）
//! - 转换引擎本身不关心内存从哪里来，只依赖本模块定义的 [`Allocator`] 与 [`HeapManager`] 两个接缝；
//! - 宿主可以接入任意分配策略（全局堆、预算池、固定 slab），引擎行为保持一致。
//!
//! # 设计概要（How）
//! - [`ZeroedBuffer`] 是所有分配结果的统一载体，借鉴池化缓冲的租约思路：
//!   若分配方注入了 [`ReleaseHook`]，缓冲在 `Drop` 时把底层 `BytesMut` 交还给分配方；
//! - [`SizeClassTable`] 把“选择不小于需求的最小档位”这一策略与具体常量解耦，
//!   默认表由 [`ChunkSizeClass`] 的三个固定档位构成。

use std::{
    borrow::Cow,
    fmt, mem,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use bytes::BytesMut;

use crate::error::{CharConvError, Result};

/// 分配方在缓冲生命周期结束时的回收入口。
///
/// # 契约定义（What）
/// - `release` 在 [`ZeroedBuffer`] 析构时调用且仅调用一次；
/// - 实现必须线程安全且不得 panic，否则 `Drop` 路径上的 panic 会直接终止进程。
pub trait ReleaseHook: Send + Sync + 'static {
    /// 通知分配方归还一块缓冲。
    fn release(&self, released: ReleasedBuffer);
}

/// 一次归还动作携带的上下文。
#[derive(Debug)]
pub struct ReleasedBuffer {
    capacity: usize,
    buffer: Option<BytesMut>,
}

impl ReleasedBuffer {
    /// 创建归还上下文。
    pub fn new(capacity: usize, buffer: Option<BytesMut>) -> Self {
        Self { capacity, buffer }
    }

    /// 当初授予的容量（字节）。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 取回底层 `BytesMut`，便于放回自由链表复用。
    pub fn into_buffer(self) -> Option<BytesMut> {
        self.buffer
    }
}

/// 零初始化的可写缓冲，长度即授予容量。
///
/// # 契约说明（What）
/// - 构造时内容全部为 0；
/// - `len()` 恒等于分配方授予的容量，引擎据此推导可写区间；
/// - 若带有 [`ReleaseHook`]，析构时归还底层内存。
pub struct ZeroedBuffer {
    data: BytesMut,
    hook: Option<Arc<dyn ReleaseHook>>,
}

impl ZeroedBuffer {
    /// 直接从全局堆分配，不挂接回收钩子。
    pub fn unmanaged(len: usize) -> Self {
        Self {
            data: BytesMut::zeroed(len),
            hook: None,
        }
    }

    /// 包装分配方提供的内存，并在析构时回调 `hook`。
    ///
    /// `data` 会被清零，调用方无需预先处理复用块中的残留字节。
    pub fn managed(mut data: BytesMut, hook: Arc<dyn ReleaseHook>) -> Self {
        data.fill(0);
        Self {
            data,
            hook: Some(hook),
        }
    }

    /// 拷贝出全部内容。
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl Deref for ZeroedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for ZeroedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for ZeroedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZeroedBuffer")
            .field("len", &self.data.len())
            .field("managed", &self.hook.is_some())
            .finish()
    }
}

impl Drop for ZeroedBuffer {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            let data = mem::take(&mut self.data);
            hook.release(ReleasedBuffer::new(data.len(), Some(data)));
        }
    }
}

/// 零初始化分配器接缝。
///
/// # 契约说明（What）
/// - 成功时返回长度恰为 `size` 的全零缓冲；
/// - 返回 `None` 表示资源耗尽，调用方将其映射为 [`CharConvError::OutOfMemory`]。
pub trait Allocator: Send + Sync {
    /// 分配 `size` 字节的全零缓冲。
    fn allocate_zeroed(&self, size: usize) -> Option<ZeroedBuffer>;
}

/// 直接使用进程全局堆的分配器。
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalHeap;

impl Allocator for GlobalHeap {
    fn allocate_zeroed(&self, size: usize) -> Option<ZeroedBuffer> {
        // 超过 isize::MAX 的请求无法构造切片。
        if size > isize::MAX as usize {
            return None;
        }
        Some(ZeroedBuffer::unmanaged(size))
    }
}

/// 按尺寸档位授予固定容量块的堆管理器接缝。
///
/// # 契约说明（What）
/// - 成功时返回的缓冲长度恰为 `class.capacity()`；
/// - 任何失败在包装器边界都被折叠为 [`CharConvError::OutOfMemory`]。
pub trait HeapManager: Send + Sync {
    /// 租借一块属于 `class` 档位的缓冲。
    fn allocate_chunk(&self, class: &SizeClass) -> Result<ZeroedBuffer>;
}

/// 内置的三个固定容量档位。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum ChunkSizeClass {
    /// 0x80 字节。
    Small = 0x80,
    /// 0x100 字节。
    Medium = 0x100,
    /// 0x200 字节。
    Large = 0x200,
}

impl ChunkSizeClass {
    /// 按容量升序排列的全部档位。
    pub const ALL: [ChunkSizeClass; 3] = [Self::Small, Self::Medium, Self::Large];

    /// 档位的固定容量。
    pub const fn capacity(self) -> usize {
        self as usize
    }

    /// 档位标签。
    pub const fn label(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

/// 一个可配置的尺寸档位：标签 + 固定容量。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SizeClass {
    label: Cow<'static, str>,
    capacity: usize,
}

impl SizeClass {
    /// 创建档位。
    pub fn new(label: impl Into<Cow<'static, str>>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            capacity,
        }
    }

    /// 档位标签。
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 档位固定容量（字节）。
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl From<ChunkSizeClass> for SizeClass {
    fn from(class: ChunkSizeClass) -> Self {
        Self::new(class.label(), class.capacity())
    }
}

/// 有序的尺寸档位表。
///
/// # 契约说明（What）
/// - **不变量**：至少包含一个档位，容量非零且严格递增；
/// - [`select`](Self::select) 返回容量不小于需求的最小档位，超出最大档位时返回 `None`，
///   此时调用方必须在任何分配发生之前拒绝请求。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeClassTable {
    classes: Vec<SizeClass>,
}

impl SizeClassTable {
    /// 由 [`ChunkSizeClass::ALL`] 构成的标准档位表。
    pub fn standard() -> Self {
        Self {
            classes: ChunkSizeClass::ALL.into_iter().map(SizeClass::from).collect(),
        }
    }

    /// 校验并构建档位表。
    pub fn new(classes: Vec<SizeClass>) -> Result<Self> {
        if classes.is_empty() {
            return Err(CharConvError::invalid("size class table is empty"));
        }
        if let Some(zero) = classes.iter().find(|class| class.capacity == 0) {
            return Err(CharConvError::invalid(format!(
                "size class `{}` has zero capacity",
                zero.label
            )));
        }
        if let Some(pair) = classes
            .windows(2)
            .find(|pair| pair[0].capacity >= pair[1].capacity)
        {
            return Err(CharConvError::invalid(format!(
                "size classes must be strictly ascending: `{}` ({:#x}) is not below `{}` ({:#x})",
                pair[0].label, pair[0].capacity, pair[1].label, pair[1].capacity
            )));
        }
        Ok(Self { classes })
    }

    /// 选择容量 ≥ `required` 的最小档位。
    pub fn select(&self, required: usize) -> Option<&SizeClass> {
        self.classes.iter().find(|class| class.capacity >= required)
    }

    /// 最大档位的容量。
    pub fn largest_capacity(&self) -> usize {
        self.classes.last().map_or(0, SizeClass::capacity)
    }

    /// 全部档位，容量升序。
    pub fn classes(&self) -> &[SizeClass] {
        &self.classes
    }
}

impl Default for SizeClassTable {
    fn default() -> Self {
        Self::standard()
    }
}
