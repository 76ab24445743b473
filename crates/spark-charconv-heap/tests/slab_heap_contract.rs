//! `slab_heap_contract` 集成测试：验证 `SlabChunkHeap` 的租借、归还、上限与收缩契约。
//!
//! # 测试目标（Why）
//! - 档位块必须长度恰为档位容量且内容全零，否则引擎推导出的可写区间会偏离档位；
//! - 归还路径失效会让驻留字节只增不减，这里从公开统计快照观测。

use proptest::prelude::*;
use spark_charconv::{ChunkSizeClass, ErrorKind, HeapManager, SizeClass, SizeClassTable};
use spark_charconv_heap::SlabChunkHeap;

fn class(kind: ChunkSizeClass) -> SizeClass {
    SizeClass::from(kind)
}

/// 每个标准档位授予的块长度恰为档位容量。
#[test]
fn chunks_match_class_capacity() {
    let heap = SlabChunkHeap::default();
    for kind in ChunkSizeClass::ALL {
        let chunk = heap.allocate_chunk(&class(kind)).expect("租借档位块失败");
        assert_eq!(chunk.len(), kind.capacity());
        assert!(chunk.iter().all(|byte| *byte == 0));
    }
    let stats = heap.stats();
    assert_eq!(stats.active_leases, 0, "块已在循环内归还");
    assert_eq!(stats.resident_bytes, 0x80 + 0x100 + 0x200);
    assert_eq!(stats.available_bytes, stats.resident_bytes);
}

/// 驻留上限耗尽后返回 `OutOfMemory`，归还后再次可用。
///
/// # 步骤说明（How）
/// 1. 上限设为一个 medium 块；
/// 2. 持有该块时再请求 small 块，新建会越过上限，必须失败；
/// 3. 归还 medium 块后，再次请求 medium 块走复用路径成功。
#[test]
fn resident_limit_is_enforced() {
    let heap = SlabChunkHeap::bounded(SizeClassTable::standard(), 0x100);
    let medium = heap
        .allocate_chunk(&class(ChunkSizeClass::Medium))
        .expect("上限内应成功");
    let err = heap
        .allocate_chunk(&class(ChunkSizeClass::Small))
        .expect_err("超过驻留上限");
    assert_eq!(err.kind(), ErrorKind::OutOfMemory);
    assert_eq!(heap.stats().failed_acquisitions, 1);

    drop(medium);
    let reused = heap
        .allocate_chunk(&class(ChunkSizeClass::Medium))
        .expect("复用不受上限约束");
    assert_eq!(reused.len(), 0x100);
    assert_eq!(heap.stats().resident_bytes, 0x100);
}

/// 收缩清空空闲链表并归还驻留字节。
#[test]
fn shrink_releases_free_lists() {
    let heap = SlabChunkHeap::default();
    drop(heap.allocate_chunk(&class(ChunkSizeClass::Large)).expect("租借失败"));
    drop(heap.allocate_chunk(&class(ChunkSizeClass::Small)).expect("租借失败"));
    assert_eq!(heap.shrink_to_fit(), 0x280);
    let stats = heap.stats();
    assert_eq!(stats.resident_bytes, 0);
    assert_eq!(stats.available_bytes, 0);
    assert!(stats.classes.iter().all(|class| class.free_slots == 0));
}

/// 自定义档位表：只服务表内档位。
#[test]
fn custom_table_serves_only_its_classes() {
    let table = SizeClassTable::new(vec![SizeClass::new("tiny", 0x20), SizeClass::new("huge", 0x400)])
        .expect("档位表合法");
    let heap = SlabChunkHeap::new(table);
    assert_eq!(
        heap.allocate_chunk(&SizeClass::new("tiny", 0x20))
            .expect("表内档位")
            .len(),
        0x20
    );
    let err = heap
        .allocate_chunk(&class(ChunkSizeClass::Small))
        .expect_err("表外档位");
    assert_eq!(err.kind(), ErrorKind::InvalidParameter);
}

proptest! {
    /// 任意租借与归还序列之后，活跃租约归零且驻留字节等于空闲字节。
    #[test]
    fn leases_balance_after_release(picks in prop::collection::vec(0usize..3, 1..32)) {
        let heap = SlabChunkHeap::default();
        let chunks: Vec<_> = picks
            .iter()
            .map(|pick| {
                heap.allocate_chunk(&class(ChunkSizeClass::ALL[*pick]))
                    .expect("无上限堆不应失败")
            })
            .collect();
        prop_assert_eq!(heap.stats().active_leases, picks.len());
        drop(chunks);
        let stats = heap.stats();
        prop_assert_eq!(stats.active_leases, 0);
        prop_assert_eq!(stats.resident_bytes, stats.available_bytes);
        let grants: u64 = stats.classes.iter().map(|class| class.grants).sum();
        prop_assert_eq!(grants, picks.len() as u64);
    }
}
