//! 端到端测试：转换器、档位堆与带预算分配器组合使用。

use std::sync::Arc;

use spark_charconv::{
    CharConvError, CharConverter, CharConverterConfig, ConversionRequest, EncodingDescriptor,
    ErrorKind, ISO_8859_1, ProtocolRegistry, UTF_8, UTF_16, engine, install_char_converter,
};
use spark_charconv_heap::{BudgetAllocator, SlabChunkHeap};

const CONFIG: &str = r#"
[session]
from = "ISO-8859-1"
to = "UTF-16"
"#;

fn configured_converter(allocator: &BudgetAllocator) -> CharConverter {
    let config = CharConverterConfig::from_toml_str(CONFIG).expect("配置合法");
    CharConverter::from_config(&config)
        .expect("配置合法")
        .with_allocator(Arc::new(allocator.clone()))
}

/// 第二个名称复制超出预算时，第一个名称已归还。
#[test]
fn descriptor_open_rolls_back_on_budget_exhaustion() {
    let allocator = BudgetAllocator::with_limit(UTF_8.len() + 1);
    let err = EncodingDescriptor::open_in(&allocator, UTF_8, UTF_16).expect_err("预算不足");
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(allocator.allocations(), 1);
    assert_eq!(allocator.refusals(), 1);
    assert_eq!(allocator.live_bytes(), 0);
}

/// 引擎自带分配在预算不足时返回 `OutOfMemory`，描述符仍可继续使用。
#[test]
fn engine_output_allocation_respects_budget() {
    let names = ISO_8859_1.len() + 1 + UTF_16.len() + 1;
    let allocator = BudgetAllocator::with_limit(names + 6);
    let descriptor = EncodingDescriptor::open_in(&allocator, ISO_8859_1, UTF_16).expect("打开失败");

    let err = engine::convert(&descriptor, &ConversionRequest::whole(b"abc", 8), &allocator)
        .expect_err("8 字节输出超出剩余预算");
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);

    let converted = engine::convert(&descriptor, &ConversionRequest::whole(b"ab", 8), &allocator)
        .expect("6 字节输出恰好在预算内");
    assert_eq!(converted.utf16_units(), vec![0x61, 0x62, 0]);
    drop(converted);
    drop(descriptor);
    assert_eq!(allocator.live_bytes(), 0);
}

/// 包装器经由档位堆租借，返回后块回到空闲链表。
#[test]
fn wrapper_chunks_return_to_slab_heap() {
    let allocator = BudgetAllocator::unlimited();
    let converter = configured_converter(&allocator);
    let heap = SlabChunkHeap::default();

    let converted = converter
        .pkexec_convert(&[b'o', b'k', 0xFF], 3, &heap)
        .expect("small 档位足以容纳");
    assert_eq!(converted.utf16_units(), vec![0x6F, 0x6B, 0xFD, 0]);
    assert_eq!(heap.stats().active_leases, 1);
    drop(converted);

    let stats = heap.stats();
    assert_eq!(stats.active_leases, 0);
    assert_eq!(stats.available_bytes, 0x80);
    assert_eq!(allocator.live_bytes(), 0, "描述符名称在调用结束时归还");
}

/// 引擎拒绝后，已租借的块与描述符都已归还。
#[test]
fn aborted_wrapper_call_leaks_nothing() {
    let allocator = BudgetAllocator::unlimited();
    let converter = configured_converter(&allocator);
    let heap = SlabChunkHeap::default();
    let input = vec![b'a'; 0x100];

    let err = converter
        .standard_convert(&input, 0x100, &heap)
        .expect_err("0x202 字节超过 medium 档位");
    assert_eq!(
        err.abort_cause(),
        Some(&CharConvError::OutputOverflow {
            offset: 0x201,
            capacity: 0x100
        })
    );
    let stats = heap.stats();
    assert_eq!(stats.active_leases, 0);
    assert_eq!(stats.classes[1].grants, 1);
    assert_eq!(allocator.live_bytes(), 0);
}

/// 档位堆达到驻留上限时，包装器返回 `OutOfMemory`。
#[test]
fn exhausted_heap_surfaces_out_of_memory() {
    let converter = configured_converter(&BudgetAllocator::unlimited());
    let heap = SlabChunkHeap::bounded(Default::default(), 0x40);
    let err = converter
        .libxml2_convert(b"x", 1, &heap)
        .expect_err("small 档位超过驻留上限");
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
}

/// 入口例程安装后，经注册表分派到档位堆。
#[test]
fn registry_dispatch_uses_injected_heap() {
    let mut registry = ProtocolRegistry::new();
    install_char_converter(
        &mut registry,
        Arc::new(configured_converter(&BudgetAllocator::unlimited())),
    )
    .expect("安装失败");
    let heap = SlabChunkHeap::default();
    let protocol = registry.locate_char_converter().expect("转换器已安装");
    let converted = protocol
        .libxml2_convert(b"hi", 2, &heap)
        .expect("转换失败");
    assert_eq!(converted.utf16_units(), vec![0x68, 0x69, 0]);
    assert_eq!(heap.stats().classes[0].grants, 1);
}
