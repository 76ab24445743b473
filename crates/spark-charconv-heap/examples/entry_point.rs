//! 演示入口流程：安装转换器协议，再由分派器定位并调用包装器。
//!
//! 运行：`RUST_LOG=debug cargo run -p spark-charconv-heap --example entry_point`

use std::{error::Error, sync::Arc};

use spark_charconv::{CharConverter, CharConverterConfig, ProtocolRegistry, install_char_converter};
use spark_charconv_heap::{BudgetAllocator, SlabChunkHeap};
use tracing_subscriber::{EnvFilter, fmt};

const CONFIG: &str = r#"
[session]
from = "ISO-8859-1"
to = "UTF-16"
"#;

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let allocator = BudgetAllocator::with_limit(0x1000);
    let config = CharConverterConfig::from_toml_str(CONFIG)?;
    let converter = CharConverter::from_config(&config)?.with_allocator(Arc::new(allocator.clone()));

    let mut registry = ProtocolRegistry::new();
    install_char_converter(&mut registry, Arc::new(converter))?;
    let protocol = registry
        .locate_char_converter()
        .ok_or("char converter protocol is not installed")?;

    let heap = SlabChunkHeap::default();
    let input = b"caf\xE9";
    let converted = protocol.pkexec_convert(input, input.len(), &heap)?;
    println!("units: {:04x?}", converted.utf16_units());

    let oversized = vec![b'x'; 0x300];
    if let Err(err) = protocol.standard_convert(&oversized, oversized.len(), &heap) {
        println!("oversized input refused: {err} ({})", err.code());
    }

    drop(converted);
    println!("heap: {:?}", heap.stats());
    println!("allocator: {allocator:?}");
    Ok(())
}
