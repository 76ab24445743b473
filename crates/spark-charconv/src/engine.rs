//! 有界转换引擎。
//!
//! # 模块定位（Why）
//! - 引擎写入的输出缓冲容量在编译期未知：可能来自引擎自己的分配，也可能是包装器租借的档位块；
//! - 无论输入长度、编码组合或字节内容如何，任何写入都不得落在声明容量之外。
//!
//! # 设计概要（How）
//! - 可写区间由“实际缓冲长度”与 `output_capacity` 二者取小推导，而不是只信任容量公式；
//! - 循环前整体校验一次所需字节数，失败时一个字节都不写；
//! - [`BoundedOutput`] 在每次写入（含结尾终止符）前再校验下标，三个分支走同一条检查路径。
//!
//! # 编码约定（What）
//!
//! | 组合 | 输出字节数 | 逐单元变换 | 终止符 |
//! |---|---|---|---|
//! | UTF-8 → UTF-16 | `(len + 1) * 2` | 每个字节零扩展为 16 位单元（仅对 ASCII 子集正确） | 下标 `len` 处写 16 位 0 |
//! | UTF-16 → UTF-8 | `len / 2 + 1` | 单元 ≤ 0x7F 直接收窄，否则写 `?` | 下标 `len / 2` 处写 0 |
//! | ISO-8859-1 → UTF-16 | `(len + 1) * 2` | 高位为 0 直接零扩展，否则写替换码 `0xFD` | 下标 `len` 处写 16 位 0 |
//!
//! 16 位单元统一按小端存放；奇数长度的 UTF-16 输入忽略最后一个字节。

use tracing::{debug, warn};

use crate::{
    encoding::{EncodingDescriptor, ISO_8859_1, UTF_8, UTF_16},
    error::{CharConvError, Result},
    memory::{Allocator, ZeroedBuffer},
};

/// 16 位单元的字节宽度。
const UNIT_SIZE: usize = 2;
/// ISO-8859-1 高位字节的替换码。
pub const REPLACEMENT_UNIT: u16 = 0x00FD;
/// 无法收窄为 ASCII 的 UTF-16 单元的替换字节。
pub const REPLACEMENT_BYTE: u8 = b'?';

/// 引擎支持的编码组合。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionPair {
    /// UTF-8 → UTF-16。
    Utf8ToUtf16,
    /// UTF-16 → UTF-8。
    Utf16ToUtf8,
    /// ISO-8859-1 → UTF-16。
    Latin1ToUtf16,
}

impl ConversionPair {
    /// 全部支持的组合。
    pub const ALL: [ConversionPair; 3] = [Self::Utf8ToUtf16, Self::Utf16ToUtf8, Self::Latin1ToUtf16];

    /// 按描述符的 `(from, to)` 精确匹配组合。
    pub fn resolve(descriptor: &EncodingDescriptor) -> Option<Self> {
        Self::ALL.into_iter().find(|pair| {
            descriptor.from().matches(pair.source()) && descriptor.to().matches(pair.target())
        })
    }

    /// 源编码名。
    pub const fn source(self) -> &'static str {
        match self {
            Self::Utf8ToUtf16 => UTF_8,
            Self::Utf16ToUtf8 => UTF_16,
            Self::Latin1ToUtf16 => ISO_8859_1,
        }
    }

    /// 目标编码名。
    pub const fn target(self) -> &'static str {
        match self {
            Self::Utf8ToUtf16 | Self::Latin1ToUtf16 => UTF_16,
            Self::Utf16ToUtf8 => UTF_8,
        }
    }

    /// 按容量公式计算输出字节数；算术溢出时返回 `None`。
    pub fn output_size(self, input_len: usize) -> Option<usize> {
        match self {
            Self::Utf8ToUtf16 | Self::Latin1ToUtf16 => {
                input_len.checked_add(1)?.checked_mul(UNIT_SIZE)
            }
            Self::Utf16ToUtf8 => Some(input_len / UNIT_SIZE + 1),
        }
    }
}

/// 一次转换调用的瞬时请求，调用结束即丢弃。
#[derive(Clone, Copy, Debug)]
pub struct ConversionRequest<'a> {
    input: &'a [u8],
    output_capacity: usize,
}

impl<'a> ConversionRequest<'a> {
    /// 以显式 `input_len` 构造请求。
    ///
    /// `input_len` 超过 `input` 实际长度时返回 `InvalidParameter`，引擎绝不越界读取。
    pub fn new(input: &'a [u8], input_len: usize, output_capacity: usize) -> Result<Self> {
        let input = input.get(..input_len).ok_or_else(|| {
            CharConvError::invalid(format!(
                "input length {input_len} exceeds supplied buffer of {} bytes",
                input.len()
            ))
        })?;
        Ok(Self {
            input,
            output_capacity,
        })
    }

    /// 以整段输入构造请求。
    pub fn whole(input: &'a [u8], output_capacity: usize) -> Self {
        Self {
            input,
            output_capacity,
        }
    }

    /// 输入字节。
    pub fn input(&self) -> &'a [u8] {
        self.input
    }

    /// 输入长度。
    pub fn input_len(&self) -> usize {
        self.input.len()
    }

    /// 声明的输出容量。
    pub fn output_capacity(&self) -> usize {
        self.output_capacity
    }
}

/// 转换结果：输出缓冲与有效长度，所有权移交调用方。
#[derive(Debug)]
pub struct Converted {
    buffer: ZeroedBuffer,
    len: usize,
}

impl Converted {
    pub(crate) fn new(buffer: ZeroedBuffer, len: usize) -> Self {
        Self { buffer, len }
    }

    /// 有效输出字节数（含终止符）。
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否没有有效输出。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 有效输出字节。
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// 按小端把有效输出解释为 16 位单元。
    pub fn utf16_units(&self) -> Vec<u16> {
        self.as_bytes()
            .chunks_exact(UNIT_SIZE)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect()
    }

    /// 底层缓冲的完整容量，可能大于有效输出。
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// 交出底层缓冲。
    pub fn into_buffer(self) -> ZeroedBuffer {
        self.buffer
    }
}

/// 由引擎分配一块输出缓冲并完成转换。
///
/// # 教案式说明
/// - **意图 (Why)**：对应“引擎自带分配”的调用路径，每次成功调用恰好分配一块缓冲；
/// - **契约 (What)**：
///   - 组合不受支持时返回 `UnsupportedEncodingPair`，不发生任何分配；
///   - 公式所需字节数超过 `output_capacity` 时返回 `OutputOverflow`，同样不分配；
///   - 分配失败返回 `OutOfMemory`；
/// - **执行 (How)**：按公式大小分配，再以 `min(output_capacity, 缓冲长度)` 为界逐次写入。
pub fn convert(
    descriptor: &EncodingDescriptor,
    request: &ConversionRequest<'_>,
    allocator: &dyn Allocator,
) -> Result<Converted> {
    let pair = dispatch(descriptor)?;
    let required = required_bytes(pair, request)?;
    let capacity = request.output_capacity();
    if required > capacity {
        return Err(refuse(pair, required - 1, capacity));
    }

    let mut buffer = allocator
        .allocate_zeroed(required)
        .ok_or(CharConvError::out_of_memory("allocating conversion output"))?;
    let mut output = BoundedOutput::new(&mut buffer, capacity);
    let len = transcode(pair, request.input(), &mut output)?;
    Ok(Converted::new(buffer, len))
}

/// 写入调用方提供的缓冲，返回有效输出字节数。
///
/// 可写区间为 `min(request.output_capacity(), output.len())`：即使调用方声明的容量偏大或过期，
/// 也不会写出实际缓冲之外；容量偏小时整体拒绝，不产生部分写入。
pub fn convert_into(
    descriptor: &EncodingDescriptor,
    request: &ConversionRequest<'_>,
    output: &mut [u8],
) -> Result<usize> {
    let pair = dispatch(descriptor)?;
    let required = required_bytes(pair, request)?;
    let mut output = BoundedOutput::new(output, request.output_capacity());
    if required > output.limit() {
        return Err(refuse(pair, required - 1, output.limit()));
    }
    transcode(pair, request.input(), &mut output)
}

fn dispatch(descriptor: &EncodingDescriptor) -> Result<ConversionPair> {
    match ConversionPair::resolve(descriptor) {
        Some(pair) => {
            debug!(?pair, "dispatching conversion");
            Ok(pair)
        }
        None => {
            warn!(
                from = %descriptor.from(),
                to = %descriptor.to(),
                "no conversion rule for encoding pair"
            );
            Err(CharConvError::UnsupportedEncodingPair)
        }
    }
}

fn required_bytes(pair: ConversionPair, request: &ConversionRequest<'_>) -> Result<usize> {
    pair.output_size(request.input_len()).ok_or_else(|| {
        CharConvError::invalid(format!(
            "output size for {} input bytes overflows",
            request.input_len()
        ))
    })
}

fn refuse(pair: ConversionPair, offset: usize, capacity: usize) -> CharConvError {
    warn!(?pair, offset, capacity, "conversion output exceeds capacity");
    CharConvError::OutputOverflow { offset, capacity }
}

fn transcode(pair: ConversionPair, input: &[u8], output: &mut BoundedOutput<'_>) -> Result<usize> {
    match pair {
        ConversionPair::Utf8ToUtf16 => {
            for (index, byte) in input.iter().enumerate() {
                output.put_unit(index, u16::from(*byte))?;
            }
            output.put_unit(input.len(), 0)?;
            Ok((input.len() + 1) * UNIT_SIZE)
        }
        ConversionPair::Utf16ToUtf8 => {
            let units = input.len() / UNIT_SIZE;
            for (index, unit) in input.chunks_exact(UNIT_SIZE).enumerate() {
                let unit = u16::from_le_bytes([unit[0], unit[1]]);
                let byte = u8::try_from(unit)
                    .ok()
                    .filter(u8::is_ascii)
                    .unwrap_or(REPLACEMENT_BYTE);
                output.put_byte(index, byte)?;
            }
            output.put_byte(units, 0)?;
            Ok(units + 1)
        }
        ConversionPair::Latin1ToUtf16 => {
            for (index, byte) in input.iter().enumerate() {
                let unit = if byte & 0x80 == 0 {
                    u16::from(*byte)
                } else {
                    REPLACEMENT_UNIT
                };
                output.put_unit(index, unit)?;
            }
            output.put_unit(input.len(), 0)?;
            Ok((input.len() + 1) * UNIT_SIZE)
        }
    }
}

/// 带上界的输出视图，所有写入都经过下标校验。
struct BoundedOutput<'o> {
    bytes: &'o mut [u8],
    limit: usize,
}

impl<'o> BoundedOutput<'o> {
    fn new(bytes: &'o mut [u8], output_capacity: usize) -> Self {
        let limit = output_capacity.min(bytes.len());
        Self { bytes, limit }
    }

    fn limit(&self) -> usize {
        self.limit
    }

    fn put_byte(&mut self, index: usize, value: u8) -> Result<()> {
        let overflow = CharConvError::OutputOverflow {
            offset: index,
            capacity: self.limit,
        };
        let slot = self.bytes[..self.limit].get_mut(index).ok_or(overflow)?;
        *slot = value;
        Ok(())
    }

    fn put_unit(&mut self, index: usize, value: u16) -> Result<()> {
        let start = index.saturating_mul(UNIT_SIZE);
        let end = start.saturating_add(UNIT_SIZE);
        let overflow = CharConvError::OutputOverflow {
            offset: end - 1,
            capacity: self.limit,
        };
        let slot = self.bytes[..self.limit].get_mut(start..end).ok_or(overflow)?;
        slot.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GlobalHeap;

    fn open(from: &str, to: &str) -> EncodingDescriptor {
        EncodingDescriptor::open(from, to).expect("打开描述符失败")
    }

    #[test]
    fn formulas_match_table() {
        assert_eq!(ConversionPair::Utf8ToUtf16.output_size(2), Some(6));
        assert_eq!(ConversionPair::Utf16ToUtf8.output_size(4), Some(3));
        assert_eq!(ConversionPair::Utf16ToUtf8.output_size(5), Some(3));
        assert_eq!(ConversionPair::Latin1ToUtf16.output_size(0), Some(2));
        assert_eq!(ConversionPair::Latin1ToUtf16.output_size(usize::MAX), None);
    }

    #[test]
    fn bounded_output_refuses_terminator_past_limit() {
        let mut backing = [0xAAu8; 8];
        let mut output = BoundedOutput::new(&mut backing, 4);
        output.put_unit(1, 0x41).expect("第二个单元仍在界内");
        let err = output.put_unit(2, 0).expect_err("终止符越界必须被拒绝");
        assert_eq!(
            err,
            CharConvError::OutputOverflow {
                offset: 5,
                capacity: 4
            }
        );
        assert_eq!(&backing[4..], &[0xAA; 4], "界外字节不得被改写");
    }

    #[test]
    fn stale_capacity_larger_than_buffer_is_clamped() {
        let descriptor = open(ISO_8859_1, UTF_16);
        let mut backing = [0u8; 4];
        let request = ConversionRequest::whole(b"abc", 0x200);
        let err = convert_into(&descriptor, &request, &mut backing).expect_err("缓冲不足");
        assert_eq!(
            err,
            CharConvError::OutputOverflow {
                offset: 7,
                capacity: 4
            }
        );
        assert_eq!(backing, [0u8; 4], "整体拒绝时不应有部分写入");
    }

    #[test]
    fn utf16_odd_trailing_byte_is_ignored() {
        let descriptor = open(UTF_16, UTF_8);
        let request = ConversionRequest::whole(&[0x41, 0x00, 0x42], 2);
        let converted = convert(&descriptor, &request, &GlobalHeap).expect("转换失败");
        assert_eq!(converted.as_bytes(), b"A\0");
    }

    #[test]
    fn request_rejects_length_past_input() {
        let err = ConversionRequest::new(b"ab", 3, 16).expect_err("越界读取必须被拒绝");
        assert_eq!(err.code(), crate::error::codes::INVALID_PARAMETER);
    }
}
