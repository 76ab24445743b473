//! 显式协议注册表。
//!
//! # 模块定位（Why）
//! - 分派器以 GUID 查找转换器；注册表是宿主创建的显式对象，
//!   传给需要它的分派器，注册动作是一次显式调用，没有隐式全局状态。
//!
//! # 契约说明（What）
//! - 同一 GUID 只能安装一次，重复安装返回 `InvalidParameter`；
//! - [`install_char_converter`] 先安装转换器协议，再安装就绪通知，两步中任一失败立即返回。

use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::{debug, info};

use crate::{
    encoding::EncodingDescriptor,
    engine::{ConversionRequest, Converted},
    error::{CharConvError, Result},
    memory::HeapManager,
    wrappers::CharConverter,
};

/// 128 位协议标识。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolGuid(u128);

impl ProtocolGuid {
    /// 由 128 位整数构造。
    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// 原始整数值。
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Display for ProtocolGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xFFFF_FFFF_FFFF
        )
    }
}

impl fmt::Debug for ProtocolGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProtocolGuid({self})")
    }
}

/// 字符转换器协议标识。
pub const CHAR_CONVERTER_PROTOCOL_GUID: ProtocolGuid =
    ProtocolGuid::from_u128(0x4c8a_2f61_9b3e_4d07_a5c2_7e19_d04b_36f8);

/// 字符转换器就绪通知标识。
pub const CHAR_CONVERTER_READY_PROTOCOL_GUID: ProtocolGuid =
    ProtocolGuid::from_u128(0x4c8a_2f62_9b3e_4d07_a5c2_7e19_d04b_36f8);

/// 转换器对分派器暴露的函数表。
///
/// # 契约说明（What）
/// - 与 [`CharConverter`] 的同名方法语义一致；
/// - 对象安全，分派器经由 `Arc<dyn CharConverterProtocol>` 调用。
pub trait CharConverterProtocol: Send + Sync {
    /// 打开会话描述符。
    fn iconv_open(&self, from: &str, to: &str) -> Result<EncodingDescriptor>;

    /// 引擎自带分配的转换。
    fn iconv(
        &self,
        descriptor: &EncodingDescriptor,
        request: &ConversionRequest<'_>,
    ) -> Result<Converted>;

    /// 所需容量 = `size`。
    fn standard_convert(&self, input: &[u8], size: usize, heap: &dyn HeapManager)
    -> Result<Converted>;

    /// 所需容量 = `size * 2`。
    fn libxml2_convert(&self, input: &[u8], size: usize, heap: &dyn HeapManager)
    -> Result<Converted>;

    /// 所需容量 = `size + 1`。
    fn pkexec_convert(&self, input: &[u8], size: usize, heap: &dyn HeapManager)
    -> Result<Converted>;
}

impl CharConverterProtocol for CharConverter {
    fn iconv_open(&self, from: &str, to: &str) -> Result<EncodingDescriptor> {
        self.open(from, to)
    }

    fn iconv(
        &self,
        descriptor: &EncodingDescriptor,
        request: &ConversionRequest<'_>,
    ) -> Result<Converted> {
        self.convert(descriptor, request)
    }

    fn standard_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        CharConverter::standard_convert(self, input, size, heap)
    }

    fn libxml2_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        CharConverter::libxml2_convert(self, input, size, heap)
    }

    fn pkexec_convert(
        &self,
        input: &[u8],
        size: usize,
        heap: &dyn HeapManager,
    ) -> Result<Converted> {
        CharConverter::pkexec_convert(self, input, size, heap)
    }
}

/// 就绪通知，标志位全部置位表示转换器可用。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadyNotice {
    flags: u8,
}

impl ReadyNotice {
    /// 全部就绪。
    pub const ALL_READY: Self = Self { flags: !0 };

    /// 以指定标志位构造。
    pub const fn new(flags: u8) -> Self {
        Self { flags }
    }

    /// 标志位。
    pub const fn flags(self) -> u8 {
        self.flags
    }

    /// 是否全部就绪。
    pub const fn is_ready(self) -> bool {
        self.flags == !0
    }
}

/// 注册表中的协议接口。
#[derive(Clone)]
pub enum ProtocolInterface {
    /// 转换器函数表。
    CharConverter(Arc<dyn CharConverterProtocol>),
    /// 就绪通知。
    Ready(ReadyNotice),
}

impl fmt::Debug for ProtocolInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CharConverter(_) => f.write_str("CharConverter(..)"),
            Self::Ready(notice) => f.debug_tuple("Ready").field(notice).finish(),
        }
    }
}

/// 以 GUID 为键的协议注册表。
#[derive(Debug, Default)]
pub struct ProtocolRegistry {
    entries: BTreeMap<ProtocolGuid, ProtocolInterface>,
}

impl ProtocolRegistry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装协议接口；GUID 已存在时拒绝且不覆盖原有接口。
    pub fn install(&mut self, guid: ProtocolGuid, interface: ProtocolInterface) -> Result<()> {
        if self.entries.contains_key(&guid) {
            return Err(CharConvError::invalid(format!(
                "protocol {guid} is already installed"
            )));
        }
        debug!(%guid, ?interface, "protocol installed");
        self.entries.insert(guid, interface);
        Ok(())
    }

    /// 按 GUID 查找。
    pub fn locate(&self, guid: ProtocolGuid) -> Option<&ProtocolInterface> {
        self.entries.get(&guid)
    }

    /// 查找转换器函数表。
    pub fn locate_char_converter(&self) -> Option<Arc<dyn CharConverterProtocol>> {
        match self.locate(CHAR_CONVERTER_PROTOCOL_GUID)? {
            ProtocolInterface::CharConverter(converter) => Some(Arc::clone(converter)),
            ProtocolInterface::Ready(_) => None,
        }
    }

    /// 转换器是否已发出就绪通知。
    pub fn is_char_converter_ready(&self) -> bool {
        matches!(
            self.locate(CHAR_CONVERTER_READY_PROTOCOL_GUID),
            Some(ProtocolInterface::Ready(notice)) if notice.is_ready()
        )
    }

    /// 已安装协议数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 入口例程：安装转换器协议并发出就绪通知。
pub fn install_char_converter(
    registry: &mut ProtocolRegistry,
    converter: Arc<dyn CharConverterProtocol>,
) -> Result<()> {
    registry.install(
        CHAR_CONVERTER_PROTOCOL_GUID,
        ProtocolInterface::CharConverter(converter),
    )?;
    registry.install(
        CHAR_CONVERTER_READY_PROTOCOL_GUID,
        ProtocolInterface::Ready(ReadyNotice::ALL_READY),
    )?;
    info!(guid = %CHAR_CONVERTER_PROTOCOL_GUID, "char converter protocol installed");
    Ok(())
}
