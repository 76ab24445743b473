use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytes::BytesMut;
use spin::Mutex;
use tracing::{debug, trace, warn};

use spark_charconv::{
    CharConvError, HeapManager, ReleaseHook, ReleasedBuffer, Result, SizeClass, SizeClassTable,
    ZeroedBuffer,
};

/// `SlabChunkHeap` 按尺寸档位维护空闲链表，为转换包装器授予固定容量的零填充块。
///
/// # 模块角色（Why）
/// - 包装器每次调用都要租借一块档位块，直接走全局堆会让同尺寸的短命块反复分配与释放；
/// - 借助 [`ReleaseHook`]，块在 [`ZeroedBuffer`] 析构时自动回到所属档位的链表，调用方无需关心归还。
///
/// # 核心机制（How）
/// - 每个档位一条 `spin::Mutex<Vec<BytesMut>>`，租借时优先复用，未命中才新建；
/// - 可选的驻留上限（resident limit）约束“已新建且尚未收缩”的总字节数，超限时返回 `OutOfMemory`；
/// - `HeapMetrics` 以原子计数跟踪活跃租约、驻留字节、空闲字节与失败次数，供 [`stats`](Self::stats) 生成快照。
///
/// # 契约说明（What）
/// - 授予的块长度恰为档位容量，内容全零（复用块在授予前清零）；
/// - 只接受档位表中存在的档位，未知档位返回 `InvalidParameter`；
/// - 所有共享状态通过 `spin::Mutex` 与原子计数保护，满足 `Send + Sync + 'static`。
///
/// # 设计权衡（Trade-offs）
/// - 自旋锁而非阻塞锁：临界区只有一次 `push`/`pop`，且受限执行环境不允许挂起；
/// - `shrink_to_fit` 直接清空全部空闲链表，压测后可一次性归还峰值内存。
#[derive(Clone)]
pub struct SlabChunkHeap {
    inner: Arc<HeapInner>,
}

impl Default for SlabChunkHeap {
    fn default() -> Self {
        Self::new(SizeClassTable::standard())
    }
}

impl std::fmt::Debug for SlabChunkHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabChunkHeap")
            .field("resident_limit", &self.inner.resident_limit)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SlabChunkHeap {
    /// 按档位表创建不设驻留上限的堆。
    pub fn new(table: SizeClassTable) -> Self {
        Self::build(table, None)
    }

    /// 按档位表创建堆，新建块的驻留总字节数不超过 `resident_limit`。
    pub fn bounded(table: SizeClassTable, resident_limit: usize) -> Self {
        Self::build(table, Some(resident_limit))
    }

    fn build(table: SizeClassTable, resident_limit: Option<usize>) -> Self {
        let tiers = table.classes().iter().cloned().map(Tier::new).collect();
        Self {
            inner: Arc::new(HeapInner {
                tiers,
                resident_limit,
                metrics: HeapMetrics::default(),
            }),
        }
    }

    /// 清空全部空闲链表，返回归还的字节数。
    pub fn shrink_to_fit(&self) -> usize {
        self.inner.shrink_free_lists()
    }

    /// 读取统计快照。
    pub fn stats(&self) -> HeapStats {
        self.inner.snapshot()
    }
}

impl HeapManager for SlabChunkHeap {
    fn allocate_chunk(&self, class: &SizeClass) -> Result<ZeroedBuffer> {
        let raw = self.inner.acquire(class)?;
        let hook: Arc<dyn ReleaseHook> = self.inner.clone();
        Ok(ZeroedBuffer::managed(raw, hook))
    }
}

/// 堆统计快照。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// 尚未归还的租约数。
    pub active_leases: usize,
    /// 已新建且尚未收缩的总字节数。
    pub resident_bytes: usize,
    /// 空闲链表中可复用的字节数。
    pub available_bytes: usize,
    /// 因驻留上限被拒绝的租借次数。
    pub failed_acquisitions: u64,
    /// 各档位明细，按容量升序。
    pub classes: Vec<ClassStats>,
}

/// 单个档位的统计。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassStats {
    /// 档位标签。
    pub label: String,
    /// 档位容量。
    pub capacity: usize,
    /// 累计授予次数（含复用）。
    pub grants: u64,
    /// 空闲链表长度。
    pub free_slots: usize,
}

struct Tier {
    class: SizeClass,
    free_list: Mutex<Vec<BytesMut>>,
    grants: AtomicU64,
}

impl Tier {
    fn new(class: SizeClass) -> Self {
        Self {
            class,
            free_list: Mutex::new(Vec::new()),
            grants: AtomicU64::new(0),
        }
    }
}

struct HeapInner {
    tiers: Vec<Tier>,
    resident_limit: Option<usize>,
    metrics: HeapMetrics,
}

impl HeapInner {
    fn tier_for(&self, class: &SizeClass) -> Option<&Tier> {
        self.tiers.iter().find(|tier| tier.class == *class)
    }

    /// 从档位链表或堆上获取一块长度恰为档位容量的 `BytesMut`。
    fn acquire(&self, class: &SizeClass) -> Result<BytesMut> {
        let tier = self.tier_for(class).ok_or_else(|| {
            CharConvError::invalid(format!(
                "size class `{}` ({:#x}) is not served by this heap",
                class.label(),
                class.capacity()
            ))
        })?;
        let capacity = tier.class.capacity();

        let reused = tier.free_list.lock().pop();
        let buffer = match reused {
            Some(buf) => {
                self.metrics.decrease_available(capacity);
                trace!(class = class.label(), capacity, "slab chunk reused");
                buf
            }
            None => {
                self.reserve_resident(capacity).inspect_err(|_| {
                    warn!(
                        class = class.label(),
                        capacity,
                        limit = self.resident_limit,
                        "slab heap resident limit reached"
                    );
                })?;
                debug!(class = class.label(), capacity, "slab chunk allocated");
                BytesMut::zeroed(capacity)
            }
        };
        tier.grants.fetch_add(1, Ordering::Relaxed);
        self.metrics.increase_active_leases();
        Ok(buffer)
    }

    fn reserve_resident(&self, capacity: usize) -> Result<()> {
        let limit = self.resident_limit.unwrap_or(usize::MAX);
        self.metrics
            .resident_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(capacity)
                    .filter(|next| *next <= limit)
            })
            .map(|_| ())
            .map_err(|_| {
                self.metrics.failed_acquisitions.fetch_add(1, Ordering::Relaxed);
                CharConvError::out_of_memory("reserving slab chunk")
            })
    }

    fn shrink_free_lists(&self) -> usize {
        let mut reclaimed = 0;
        for tier in &self.tiers {
            let mut list = tier.free_list.lock();
            reclaimed += list.len() * tier.class.capacity();
            list.clear();
        }
        self.metrics.decrease_on_shrink(reclaimed);
        reclaimed
    }

    fn snapshot(&self) -> HeapStats {
        HeapStats {
            active_leases: self.metrics.active_leases.load(Ordering::Relaxed),
            resident_bytes: self.metrics.resident_bytes.load(Ordering::Relaxed),
            available_bytes: self.metrics.available_bytes.load(Ordering::Relaxed),
            failed_acquisitions: self.metrics.failed_acquisitions.load(Ordering::Relaxed),
            classes: self
                .tiers
                .iter()
                .map(|tier| ClassStats {
                    label: tier.class.label().to_owned(),
                    capacity: tier.class.capacity(),
                    grants: tier.grants.load(Ordering::Relaxed),
                    free_slots: tier.free_list.lock().len(),
                })
                .collect(),
        }
    }
}

impl ReleaseHook for HeapInner {
    fn release(&self, released: ReleasedBuffer) {
        self.metrics.decrease_active_leases();
        let capacity = released.capacity();
        let tier = self
            .tiers
            .iter()
            .find(|tier| tier.class.capacity() == capacity);
        match (tier, released.into_buffer()) {
            (Some(tier), Some(buf)) if buf.len() == capacity => {
                self.metrics.increase_available(capacity);
                tier.free_list.lock().push(buf);
            }
            _ => self.metrics.decrease_on_loss(capacity),
        }
    }
}

#[derive(Default)]
struct HeapMetrics {
    resident_bytes: AtomicUsize,
    available_bytes: AtomicUsize,
    active_leases: AtomicUsize,
    failed_acquisitions: AtomicU64,
}

impl HeapMetrics {
    fn increase_available(&self, capacity: usize) {
        self.available_bytes.fetch_add(capacity, Ordering::Relaxed);
    }

    fn decrease_available(&self, capacity: usize) {
        saturating_sub(&self.available_bytes, capacity);
    }

    fn decrease_on_loss(&self, capacity: usize) {
        saturating_sub(&self.resident_bytes, capacity);
    }

    fn decrease_on_shrink(&self, capacity: usize) {
        self.decrease_available(capacity);
        self.decrease_on_loss(capacity);
    }

    fn increase_active_leases(&self) {
        self.active_leases.fetch_add(1, Ordering::Relaxed);
    }

    fn decrease_active_leases(&self) {
        saturating_sub(&self.active_leases, 1);
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(value))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_charconv::ChunkSizeClass;

    #[test]
    fn released_chunk_is_reused_and_rezeroed() {
        let heap = SlabChunkHeap::default();
        let small = SizeClass::from(ChunkSizeClass::Small);
        {
            let mut chunk = heap.allocate_chunk(&small).expect("租借档位块失败");
            chunk[0] = 0x5A;
        }
        let after_release = heap.stats();
        assert_eq!(after_release.active_leases, 0);
        assert_eq!(after_release.available_bytes, 0x80);

        let chunk = heap.allocate_chunk(&small).expect("复用档位块失败");
        assert!(chunk.iter().all(|byte| *byte == 0), "复用块必须清零");
        let stats = heap.stats();
        assert_eq!(stats.resident_bytes, 0x80, "复用不应新建块");
        assert_eq!(stats.classes[0].grants, 2);
    }

    #[test]
    fn unknown_class_is_invalid() {
        let heap = SlabChunkHeap::default();
        let err = heap
            .allocate_chunk(&SizeClass::new("odd", 0x90))
            .expect_err("未知档位应被拒绝");
        assert_eq!(err.code(), spark_charconv::error::codes::INVALID_PARAMETER);
    }
}
