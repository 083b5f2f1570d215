use core::sync::atomic::{AtomicU64, Ordering};

/// The reasons a physical CPU left its guest, as counted per core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuStat {
    /// A management event (suspend, resume, park, reset, flush) was serviced.
    VmExitsManagement = 0,
    /// The interrupt controller maintenance interrupt fired.
    VmExitsMaintenance = 1,
    /// A virtual SGI had to be injected into the guest.
    VmExitsVsgi = 2,
    /// A physical IRQ was forwarded to the guest.
    VmExitsVirq = 3,
}

impl CpuStat {
    /// Number of counters.
    pub const COUNT: usize = 4;

    /// All counters in index order.
    pub const ALL: [CpuStat; Self::COUNT] = [
        CpuStat::VmExitsManagement,
        CpuStat::VmExitsMaintenance,
        CpuStat::VmExitsVsgi,
        CpuStat::VmExitsVirq,
    ];
}

/// A snapshot of the exit counters of one CPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuStats([u64; CpuStat::COUNT]);

impl CpuStats {
    /// Get the value of a counter.
    pub fn get(&self, stat: CpuStat) -> u64 {
        self.0[stat as usize]
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

/// Monotonic counters, incremented only by the owning core.
pub(crate) struct ExitCounters([AtomicU64; CpuStat::COUNT]);

impl ExitCounters {
    pub(crate) const fn new() -> Self {
        Self([
            AtomicU64::new(0),
            AtomicU64::new(0),
            AtomicU64::new(0),
            AtomicU64::new(0),
        ])
    }

    pub(crate) fn add(&self, stat: CpuStat, n: u64) {
        // Single writer; other cores only read for statistics.
        self.0[stat as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CpuStats {
        let mut stats = CpuStats::default();
        for stat in CpuStat::ALL {
            stats.0[stat as usize] = self.0[stat as usize].load(Ordering::Relaxed);
        }
        stats
    }
}
