use memory_addr::PhysAddr;

use crate::{cell::Cell, sgi::Sgi};

/// Data cache maintenance operation requested on a cell's memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DcacheFlush {
    /// Write dirty lines back to memory.
    Clean,
    /// Discard lines without writing them back.
    Invalidate,
    /// Write dirty lines back, then discard them.
    CleanAndInvalidate,
}

/// The interfaces which the underlying hypervisor must implement.
///
/// Every physical core calls into the same instance, so implementations must be `Sync`.
/// Methods taking a `cpu_id` are always invoked on that very core unless stated otherwise.
pub trait AxCpuCtlHal: Sync {
    /// Sends a software-generated interrupt to every core in `sgi.targets`.
    ///
    /// Delivery is assumed to be reliable; there is no acknowledgment.
    ///
    /// # Parameters
    ///
    /// * `sgi` - The SGI kind and the bitmask of target CPU ids.
    fn send_sgi(&self, sgi: Sgi);

    /// Flushes pending virtual interrupts into the guest running on `cpu_id`.
    fn inject_pending(&self, cpu_id: usize);

    /// Marks the physical interrupt `irqn` pending for the guest running on `cpu_id`.
    ///
    /// # Parameters
    ///
    /// * `cpu_id` - The calling CPU.
    /// * `irqn` - The interrupt number to inject at the next guest entry.
    fn set_pending(&self, cpu_id: usize, irqn: u32);

    /// Commits the interrupt controller configuration after `cell` was added or removed.
    ///
    /// `None` requests a global commit.
    fn config_commit(&self, cell: Option<&Cell>);

    /// Flushes the guest TLB entries of the vCPU currently loaded on `cpu_id`.
    fn flush_vcpu_tlbs(&self, cpu_id: usize);

    /// Performs data cache maintenance on the memory of `cell`.
    ///
    /// # Parameters
    ///
    /// * `cell` - The cell whose memory regions are maintained.
    /// * `flush` - The maintenance operation to apply.
    fn cell_dcaches_flush(&self, cell: &Cell, flush: DcacheFlush);

    /// Resets the guest context of `cpu_id` so that it resumes execution at `entry`.
    ///
    /// This replaces the execution context of the core: once it has been called, the
    /// previous guest state is gone and no caller may touch it anymore.
    ///
    /// # Parameters
    ///
    /// * `cpu_id` - The calling CPU.
    /// * `entry` - The guest physical address execution restarts at. Parked cores are
    ///   reset to `0`, the start of the parking code.
    fn cpu_reset(&self, cpu_id: usize, entry: PhysAddr);

    /// Switches `cpu_id` to the minimal address space used by parked cores.
    fn paging_init_parked(&self, cpu_id: usize);

    /// Hints the core that it is spinning on a flag.
    fn cpu_relax(&self) {
        core::hint::spin_loop();
    }

    /// Waits in a low-power state until the next interrupt arrives.
    fn wait_for_interrupt(&self) {
        core::hint::spin_loop();
    }
}
