#![warn(missing_docs)]

//! `spark-charconv` 提供在 UTF-8、UTF-16 与 ISO-8859-1 之间转换字节缓冲的有界转换引擎，
//! 以及按尺寸档位挑选固定容量输出块的包装器。
//!
//! # 模块定位（Why）
//! - 引擎每条转换路径都写入容量在编译期未知的输出缓冲，核心承诺是：无论输入长度、编码组合
//!   或字节内容如何，写入永远不越过缓冲的声明容量，越界请求返回错误而不是写入；
//! - 引擎对执行环境一无所知：分配器、档位堆管理器与协议注册表都以 trait 或显式对象注入，
//!   适合运行在禁止阻塞与抢占的受限上下文中。
//!
//! # 使用概览（How）
//! - [`EncodingDescriptor::open`] 打开会话描述符，[`engine::convert`] / [`engine::convert_into`]
//!   执行转换；
//! - [`CharConverter`] 提供 `standard` / `libxml2` / `pkexec` 三种容量估算策略的包装器；
//! - [`install_char_converter`] 把转换器安装进显式的 [`ProtocolRegistry`]。
//!
//! # 并发模型（What）
//! - 所有操作同步完成，不挂起、不等待、不加锁；
//! - 描述符与输出缓冲归单次调用或单个会话独占，宿主若多线程共享描述符需自行约束。

pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod memory;
pub mod registry;
pub mod wrappers;

pub use crate::config::{CharConverterConfig, ConfigError, SessionPair, SizeClassConfig};
pub use crate::encoding::{EncodingDescriptor, EncodingName, ISO_8859_1, UTF_8, UTF_16};
pub use crate::engine::{ConversionPair, ConversionRequest, Converted};
pub use crate::error::{CharConvError, ErrorKind, Result};
pub use crate::memory::{
    Allocator, ChunkSizeClass, GlobalHeap, HeapManager, ReleaseHook, ReleasedBuffer, SizeClass,
    SizeClassTable, ZeroedBuffer,
};
pub use crate::registry::{
    CHAR_CONVERTER_PROTOCOL_GUID, CHAR_CONVERTER_READY_PROTOCOL_GUID, CharConverterProtocol,
    ProtocolGuid, ProtocolInterface, ProtocolRegistry, ReadyNotice, install_char_converter,
};
pub use crate::wrappers::{CharConverter, NUL_TERMINATOR_LENGTH, SizingPolicy};
