//! 尺寸档位感知的转换包装器。
//!
//! # 模块定位（Why）
//! - 三个包装器各自用不同公式估算输出容量，挑选最小可容纳档位，再把租借到的块交给引擎；
//! - 估算公式只负责“挑档位”，真正的写入上界始终是档位块的实际容量，由引擎逐次校验。
//!
//! # 执行流程（How）
//! 1. 按 [`SizingPolicy`] 计算所需容量，选不到档位立即以 `InvalidParameter` 拒绝，
//!    此时既不分配也不打开描述符；
//! 2. 打开会话描述符（缺省 `ISO-8859-1 → UTF-8`）；
//! 3. 向 [`HeapManager`] 租借所选档位的块，失败折叠为 `OutOfMemory`；
//! 4. 以档位固定容量作为 `output_capacity` 调用引擎，引擎错误统一折叠为 `Aborted`。
//!
//! 每次调用无状态、同步完成，不重试，也不保留中间状态。

use std::sync::Arc;

use tracing::{debug, error};

use crate::{
    config::{CharConverterConfig, ConfigError, SessionPair},
    encoding::EncodingDescriptor,
    engine::{self, ConversionRequest, Converted},
    error::{CharConvError, Result},
    memory::{Allocator, GlobalHeap, HeapManager, SizeClassTable},
};

/// 为结尾终止符预留的字节数。
pub const NUL_TERMINATOR_LENGTH: usize = 1;

/// 包装器的容量估算策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizingPolicy {
    /// 所需容量 = `size`。
    Standard,
    /// 所需容量 = `size * 2`。
    Libxml2,
    /// 所需容量 = `size + 1`。
    Pkexec,
}

impl SizingPolicy {
    /// 计算所需容量；溢出时返回 `None`。
    pub fn required_capacity(self, size: usize) -> Option<usize> {
        match self {
            Self::Standard => Some(size),
            Self::Libxml2 => size.checked_mul(2),
            Self::Pkexec => size.checked_add(NUL_TERMINATOR_LENGTH),
        }
    }

    /// 策略名，用于日志。
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Libxml2 => "libxml2",
            Self::Pkexec => "pkexec",
        }
    }
}

/// 字符转换器：持有档位表、会话组合与描述符分配器。
///
/// # 教案式说明
/// - **意图 (Why)**：三个包装器只在容量公式上不同，收敛为一个按策略参数化的实现；
/// - **契约 (What)**：实例不可变，可在线程间共享；每次调用互不影响；
/// - **设计权衡 (Trade-offs)**：描述符名称复制走注入的 [`Allocator`]，缺省使用全局堆，
///   宿主可换成带预算的分配器以观测资源占用。
#[derive(Clone)]
pub struct CharConverter {
    size_classes: SizeClassTable,
    session: SessionPair,
    allocator: Arc<dyn Allocator>,
}

impl Default for CharConverter {
    fn default() -> Self {
        Self {
            size_classes: SizeClassTable::standard(),
            session: SessionPair::default(),
            allocator: Arc::new(GlobalHeap),
        }
    }
}

impl std::fmt::Debug for CharConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharConverter")
            .field("size_classes", &self.size_classes)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl CharConverter {
    /// 使用缺省配置创建转换器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置创建转换器。
    pub fn from_config(config: &CharConverterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            size_classes: config.size_class_table()?,
            session: config.session().clone(),
            allocator: Arc::new(GlobalHeap),
        })
    }

    /// 替换描述符名称使用的分配器。
    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// 档位表。
    pub fn size_classes(&self) -> &SizeClassTable {
        &self.size_classes
    }

    /// 会话组合。
    pub fn session(&self) -> &SessionPair {
        &self.session
    }

    /// 用注入的分配器打开描述符。
    pub fn open(&self, from: &str, to: &str) -> Result<EncodingDescriptor> {
        EncodingDescriptor::open_in(self.allocator.as_ref(), from, to)
    }

    /// 引擎自带分配的转换入口，输出缓冲由注入的分配器提供。
    pub fn convert(
        &self,
        descriptor: &EncodingDescriptor,
        request: &ConversionRequest<'_>,
    ) -> Result<Converted> {
        engine::convert(descriptor, request, self.allocator.as_ref())
    }

    /// 所需容量 = `size`。
    pub fn standard_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        self.convert_sized(SizingPolicy::Standard, input, size, heap)
    }

    /// 所需容量 = `size * 2`。
    pub fn libxml2_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        self.convert_sized(SizingPolicy::Libxml2, input, size, heap)
    }

    /// 所需容量 = `size + 1`。
    pub fn pkexec_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        self.convert_sized(SizingPolicy::Pkexec, input, size, heap)
    }

    /// 包装器公共流程。
    ///
    /// # 契约定义（What）
    /// - **输入**：`input` 至少包含 `size` 字节；`heap` 按档位授予固定容量块；
    /// - **失败**：
    ///   - 所需容量超过最大档位或 `size > input.len()`：`InvalidParameter`，不分配、不打开描述符；
    ///   - 描述符或档位块分配失败：`OutOfMemory`；
    ///   - 引擎任何失败：`Aborted`，原始错误保留在 `source` 中；
    /// - **后置条件**：成功时返回档位块本身，有效长度由引擎给出。
    pub fn convert_sized(
        &self,
        policy: SizingPolicy,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        let required = policy.required_capacity(size).ok_or_else(|| {
            CharConvError::invalid(format!("{} sizing for {size} bytes overflows", policy.name()))
        })?;
        let Some(class) = self.size_classes.select(required) else {
            error!(
                policy = policy.name(),
                size,
                required,
                largest = self.size_classes.largest_capacity(),
                "input is too large, giving up"
            );
            return Err(CharConvError::invalid(format!(
                "required capacity {required:#x} exceeds largest size class {:#x}",
                self.size_classes.largest_capacity()
            )));
        };
        debug!(policy = policy.name(), size, required, class = class.label(), "size class selected");
        let request = ConversionRequest::new(input, size, class.capacity())?;

        let descriptor = self.open(&self.session.from, &self.session.to)?;
        let mut chunk = heap.allocate_chunk(class).map_err(|err| {
            debug!(class = class.label(), error = %err, "size class chunk refused");
            CharConvError::out_of_memory("acquiring size class chunk")
        })?;
        debug!(
            policy = policy.name(),
            class = class.label(),
            capacity = class.capacity(),
            granted = chunk.len(),
            "size class chunk granted"
        );

        let len = engine::convert_into(&descriptor, &request, &mut chunk)
            .map_err(CharConvError::aborted)?;
        Ok(Converted::new(chunk, len))
    }
}
