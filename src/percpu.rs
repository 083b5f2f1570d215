use core::sync::atomic::{AtomicBool, Ordering};

use axerrno::{AxResult, ax_err};
use memory_addr::PhysAddr;
use spin::{Mutex, MutexGuard};

use crate::exit::{CpuStat, CpuStats, ExitCounters};

/// Entry address meaning "no valid entry was provided" (PSCI convention).
pub const PSCI_INVALID_ADDRESS: usize = usize::MAX;

/// Returns [`PSCI_INVALID_ADDRESS`] as an entry address.
pub fn invalid_entry() -> PhysAddr {
    PhysAddr::from(PSCI_INVALID_ADDRESS)
}

/// The lifecycle flags of a physical CPU, only accessible with its control lock held.
#[derive(Debug)]
pub(crate) struct ControlFlags {
    /// A suspension was requested. Set by any core, cleared by whoever resumes.
    pub(crate) suspend_cpu: bool,
    /// The core acknowledged the suspension. Only written by the owning core.
    pub(crate) cpu_suspended: bool,
    /// The core should power off.
    pub(crate) park: bool,
    /// The core should restart at `cpu_on_entry`.
    pub(crate) reset: bool,
    /// Where a reset lands. [`invalid_entry`] turns a reset into a park.
    pub(crate) cpu_on_entry: PhysAddr,
    /// The guest TLBs must be flushed on the next event check.
    pub(crate) flush_vcpu_caches: bool,
}

impl ControlFlags {
    fn new() -> Self {
        Self {
            suspend_cpu: false,
            cpu_suspended: false,
            park: false,
            reset: false,
            cpu_on_entry: invalid_entry(),
            flush_vcpu_caches: false,
        }
    }
}

/// A flag that only its owning core writes, while any core may read it without a lock.
///
/// This is deliberately kept outside of [`ControlFlags`]: the owner checks it after
/// releasing its control lock, right before the park or reset that may not come back.
/// Writes are crate-private and happen only on the owner's own event-check and park paths.
#[derive(Debug, Default)]
pub struct OwnerFlag(AtomicBool);

impl OwnerFlag {
    /// Create a cleared flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Read the flag. Lock-free.
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Write the flag. Must only be called by the owning core.
    pub(crate) fn set(&self, val: bool) {
        self.0.store(val, Ordering::Release);
    }
}

/// The control state of one physical CPU.
///
/// Exactly one instance exists per physical core for the lifetime of the hypervisor.
/// The owning core services it from its interrupt path, other cores mutate it through
/// the requests of [`AxCpuControl`](crate::AxCpuControl). Outside the crate the flags
/// are read-only.
pub struct PerCpuControl {
    /// The id of the CPU. It's also used to check whether the control state is initialized.
    cpu_id: Option<usize>,
    control_lock: Mutex<ControlFlags>,
    wait_for_poweron: OwnerFlag,
    stats: ExitCounters,
}

impl PerCpuControl {
    /// Create a new, uninitialized control state.
    pub fn new_uninit() -> Self {
        Self {
            cpu_id: None,
            control_lock: Mutex::new(ControlFlags::new()),
            wait_for_poweron: OwnerFlag::new(),
            stats: ExitCounters::new(),
        }
    }

    /// Initialize the control state for `cpu_id`.
    pub fn init(&mut self, cpu_id: usize) -> AxResult {
        if self.cpu_id.is_some() {
            ax_err!(BadState, "per-CPU control state is already initialized")
        } else {
            self.cpu_id = Some(cpu_id);
            Ok(())
        }
    }

    /// The id of the CPU owning this state. Panics if the state is not initialized.
    pub fn cpu_id(&self) -> usize {
        self.cpu_id.expect("per-CPU control state is not initialized")
    }

    /// Acquire the control lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ControlFlags> {
        self.control_lock.lock()
    }

    /// Whether a suspension is requested.
    pub fn suspend_requested(&self) -> bool {
        self.lock().suspend_cpu
    }

    /// Whether the core acknowledged a suspension.
    pub fn cpu_suspended(&self) -> bool {
        self.lock().cpu_suspended
    }

    /// Whether a park request is pending.
    pub fn park_requested(&self) -> bool {
        self.lock().park
    }

    /// Whether a reset request is pending.
    pub fn reset_requested(&self) -> bool {
        self.lock().reset
    }

    /// The entry address the next reset lands on.
    pub fn cpu_on_entry(&self) -> PhysAddr {
        self.lock().cpu_on_entry
    }

    /// Whether a vCPU TLB flush waits for the next event check.
    pub fn flush_pending(&self) -> bool {
        self.lock().flush_vcpu_caches
    }

    /// Whether the core went down the power-off path and waits for a reset.
    pub fn wait_for_poweron(&self) -> bool {
        self.wait_for_poweron.get()
    }

    pub(crate) fn set_wait_for_poweron(&self, val: bool) {
        self.wait_for_poweron.set(val);
    }

    /// Marks the core for power-off. The control lock must be held.
    pub(crate) fn enter_cpu_off(&self, flags: &mut ControlFlags) {
        flags.park = false;
        self.set_wait_for_poweron(true);
    }

    pub(crate) fn count(&self, stat: CpuStat, n: u64) {
        self.stats.add(stat, n);
    }

    /// Snapshot of the exit counters.
    pub fn stats(&self) -> CpuStats {
        self.stats.snapshot()
    }
}
