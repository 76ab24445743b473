use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;
use tracing::{trace, warn};

use spark_charconv::{Allocator, ReleaseHook, ReleasedBuffer, ZeroedBuffer};

/// 带字节预算的零初始化分配器。
///
/// # 教案式说明
/// - **意图 (Why)**：描述符名称复制与引擎自带分配都走 [`Allocator`] 接缝；给它一个预算，
///   宿主就能模拟资源耗尽，并验证失败路径上没有泄漏；
/// - **契约 (What)**：
///   - 在用字节数（`live_bytes`）加上本次请求超过预算时返回 `None`，不改变在用字节数；
///   - 授予的缓冲析构时经 [`ReleaseHook`] 归还，在用字节数随之回落；
/// - **执行 (How)**：`fetch_update` 原子地预留额度，失败即计入 `refusals`。
#[derive(Clone)]
pub struct BudgetAllocator {
    inner: Arc<BudgetInner>,
}

struct BudgetInner {
    limit: usize,
    live_bytes: AtomicUsize,
    allocations: AtomicUsize,
    refusals: AtomicUsize,
}

impl BudgetAllocator {
    /// 不设预算，仅记账。
    pub fn unlimited() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// 以 `limit` 字节为预算。
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner {
                limit,
                live_bytes: AtomicUsize::new(0),
                allocations: AtomicUsize::new(0),
                refusals: AtomicUsize::new(0),
            }),
        }
    }

    /// 预算上限。
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// 尚未归还的字节数。
    pub fn live_bytes(&self) -> usize {
        self.inner.live_bytes.load(Ordering::Acquire)
    }

    /// 成功分配的次数。
    pub fn allocations(&self) -> usize {
        self.inner.allocations.load(Ordering::Relaxed)
    }

    /// 因超出预算被拒绝的次数。
    pub fn refusals(&self) -> usize {
        self.inner.refusals.load(Ordering::Relaxed)
    }
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl std::fmt::Debug for BudgetAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetAllocator")
            .field("limit", &self.limit())
            .field("live_bytes", &self.live_bytes())
            .field("allocations", &self.allocations())
            .field("refusals", &self.refusals())
            .finish()
    }
}

impl Allocator for BudgetAllocator {
    fn allocate_zeroed(&self, size: usize) -> Option<ZeroedBuffer> {
        let limit = self.inner.limit.min(isize::MAX as usize);
        let reserved = self
            .inner
            .live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                live.checked_add(size).filter(|next| *next <= limit)
            });
        if let Err(live) = reserved {
            self.inner.refusals.fetch_add(1, Ordering::Relaxed);
            warn!(size, live, limit = self.inner.limit, "allocation exceeds budget");
            return None;
        }
        self.inner.allocations.fetch_add(1, Ordering::Relaxed);
        trace!(size, "budgeted allocation granted");
        let hook: Arc<dyn ReleaseHook> = self.inner.clone();
        Some(ZeroedBuffer::managed(BytesMut::zeroed(size), hook))
    }
}

impl ReleaseHook for BudgetInner {
    fn release(&self, released: ReleasedBuffer) {
        let capacity = released.capacity();
        let _ = self
            .live_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                Some(live.saturating_sub(capacity))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_leaves_live_bytes_untouched() {
        let allocator = BudgetAllocator::with_limit(8);
        let first = allocator.allocate_zeroed(6).expect("预算内应成功");
        assert!(allocator.allocate_zeroed(3).is_none(), "超出预算应返回 None");
        assert_eq!(allocator.live_bytes(), 6);
        assert_eq!(allocator.refusals(), 1);
        drop(first);
        assert_eq!(allocator.live_bytes(), 0);
        assert!(allocator.allocate_zeroed(8).is_some());
    }

    #[test]
    fn zero_sized_allocation_succeeds() {
        let allocator = BudgetAllocator::with_limit(0);
        let buffer = allocator.allocate_zeroed(0).expect("零字节分配应成功");
        assert!(buffer.is_empty());
        assert_eq!(allocator.allocations(), 1);
    }
}
