//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义转换引擎、尺寸档位包装器与协议注册表共享的错误语义；
//! - 每个错误都有稳定的点分错误码，宿主可以直接据此映射到自身的状态码体系。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - 不区分“可恢复/不可恢复”：核心内部没有任何重试逻辑，失败只上报一次，由调用方决定下一步。

use std::borrow::Cow;

use thiserror::Error;

/// 稳定错误码常量，遵循 `<领域>.<语义>` 命名约定。
pub mod codes {
    /// 任一分配步骤失败。
    pub const OUT_OF_MEMORY: &str = "charconv.out_of_memory";
    /// 描述符的 `(from, to)` 组合不在支持列表中。
    pub const UNSUPPORTED_PAIR: &str = "charconv.unsupported_pair";
    /// 参数非法，或所需容量超出全部尺寸档位。
    pub const INVALID_PARAMETER: &str = "charconv.invalid_parameter";
    /// 写入位置越过输出缓冲的有界容量。
    pub const OUTPUT_OVERFLOW: &str = "charconv.output_overflow";
    /// 包装器已完成分配承诺后，底层转换失败。
    pub const ABORTED: &str = "charconv.aborted";
}

/// 扁平化的错误类别，便于调用方在不关心上下文字段时做分支判断。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 分配失败。
    OutOfMemory,
    /// 不支持的编码组合。
    UnsupportedEncodingPair,
    /// 参数非法。
    InvalidParameter,
    /// 写入越界被拒绝。
    OutputOverflow,
    /// 包装器边界上的转换中止。
    Aborted,
}

/// 字符转换核心错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“分配失败 / 组合不支持 / 参数非法 / 写越界 / 中止”五类结果显式化，
///   让每个操作都以 `Result` 返回，不存在被静默吞掉的失败。
/// - **契约 (What)**：
///   - `UnsupportedEncodingPair` 不携带任何堆分配的上下文，保证拒绝路径零分配；
///   - `OutputOverflow` 由引擎产生，`offset` 为本应写入的最高字节偏移，`capacity` 为有界容量；
///   - `Aborted` 只出现在包装器边界，`source` 保留引擎原始错误以便排障。
/// - **设计权衡 (Trade-offs)**：`InvalidParameter` 使用 `Cow<'static, str>`，静态描述零分配，
///   动态描述才拼接字符串。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CharConvError {
    /// 分配器或堆管理器无法满足请求。
    #[error("out of memory while {context}")]
    OutOfMemory {
        /// 失败的分配步骤。
        context: &'static str,
    },

    /// 描述符的编码组合没有对应的转换规则。
    #[error("unsupported encoding pair")]
    UnsupportedEncodingPair,

    /// 参数非法，或所需容量超过最大尺寸档位。
    #[error("invalid parameter: {detail}")]
    InvalidParameter {
        /// 人类可读说明。
        detail: Cow<'static, str>,
    },

    /// 引擎拒绝越过有界容量的写入。
    #[error("write at offset {offset} exceeds output capacity {capacity}")]
    OutputOverflow {
        /// 被拒绝写入的最高字节偏移。
        offset: usize,
        /// 有界容量。
        capacity: usize,
    },

    /// 包装器在提交分配之后遇到底层转换失败。
    #[error("conversion aborted: {source}")]
    Aborted {
        /// 引擎原始错误。
        #[source]
        source: Box<CharConvError>,
    },
}

impl CharConvError {
    /// 构造 `OutOfMemory`，`context` 描述失败的分配步骤。
    pub fn out_of_memory(context: &'static str) -> Self {
        Self::OutOfMemory { context }
    }

    /// 构造 `InvalidParameter`。
    pub fn invalid(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidParameter {
            detail: detail.into(),
        }
    }

    /// 将任意错误包装为 `Aborted`。
    ///
    /// 已经是 `Aborted` 的错误原样返回，避免多层嵌套。
    pub fn aborted(self) -> Self {
        match self {
            aborted @ Self::Aborted { .. } => aborted,
            other => Self::Aborted {
                source: Box::new(other),
            },
        }
    }

    /// 返回扁平错误类别。
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::UnsupportedEncodingPair => ErrorKind::UnsupportedEncodingPair,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::OutputOverflow { .. } => ErrorKind::OutputOverflow,
            Self::Aborted { .. } => ErrorKind::Aborted,
        }
    }

    /// 返回稳定错误码，见 [`codes`]。
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::OutOfMemory => codes::OUT_OF_MEMORY,
            ErrorKind::UnsupportedEncodingPair => codes::UNSUPPORTED_PAIR,
            ErrorKind::InvalidParameter => codes::INVALID_PARAMETER,
            ErrorKind::OutputOverflow => codes::OUTPUT_OVERFLOW,
            ErrorKind::Aborted => codes::ABORTED,
        }
    }

    /// 对 `Aborted` 返回被包装的引擎错误，其它变体返回 `None`。
    pub fn abort_cause(&self) -> Option<&CharConvError> {
        match self {
            Self::Aborted { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// 本 crate 统一的 `Result` 别名。
pub type Result<T, E = CharConvError> = core::result::Result<T, E>;
