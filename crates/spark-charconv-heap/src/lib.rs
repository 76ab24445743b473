#![warn(missing_docs)]

//! `spark-charconv-heap` 为 `spark-charconv` 的两个内存接缝提供具体实现。
//!
//! # 模块定位（Why）
//! - 核心 crate 只定义 [`Allocator`](spark_charconv::Allocator) 与
//!   [`HeapManager`](spark_charconv::HeapManager) 两个 trait，不落地任何内存策略；
//! - 本 crate 提供可复用的分档空闲链表堆与带字节预算的分配器，宿主可直接注入，
//!   也可在测试中观测“租借了多少、归还了多少”。
//!
//! # 设计概要（How）
//! - [`SlabChunkHeap`]：每个尺寸档位一条 `spin::Mutex<Vec<BytesMut>>` 空闲链表，
//!   借助 [`ReleaseHook`](spark_charconv::ReleaseHook) 在缓冲析构时按容量归还；
//! - [`BudgetAllocator`]：以原子计数维护在用字节数，超过预算即返回 `None`。
//!
//! # 并发模型（What）
//! - 两个实现都满足 `Send + Sync + 'static`，临界区只包含链表的入栈与出栈，不会阻塞等待外部事件。

mod budget;
mod slab;

pub use budget::BudgetAllocator;
pub use slab::{ClassStats, HeapStats, SlabChunkHeap};
