use axerrno::{AxResult, ax_err};
use log::debug;

use crate::{
    control::{AxCpuControl, MAX_CPUS},
    hal::{AxCpuCtlHal, DcacheFlush},
};

/// A cell (partition): a set of physical CPUs managed as a unit.
///
/// Cells are created and destroyed by the cell manager; this crate only fans operations
/// out across their CPU set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    id: usize,
    /// Bitmask of the physical CPUs assigned to the cell.
    cpu_set: usize,
}

impl Cell {
    /// Create a cell description. The CPU set must not be empty.
    pub fn new(id: usize, cpu_set: usize) -> AxResult<Self> {
        if cpu_set == 0 {
            return ax_err!(InvalidInput, "cell without CPUs");
        }
        Ok(Self { id, cpu_set })
    }

    /// Get the id of the cell.
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Get the CPU set of the cell.
    pub const fn cpu_set(&self) -> usize {
        self.cpu_set
    }

    /// Whether `cpu_id` belongs to the cell.
    pub const fn contains(&self, cpu_id: usize) -> bool {
        cpu_id < MAX_CPUS && self.cpu_set & (1 << cpu_id) != 0
    }

    /// Iterate over the ids of the cell's CPUs, in ascending order.
    pub fn cpus(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_CPUS).filter(move |&cpu_id| self.contains(cpu_id))
    }
}

impl<H: AxCpuCtlHal> AxCpuControl<H> {
    /// Invalidates the data caches covering the memory of `cell` before it restarts.
    pub fn cell_reset(&self, cell: &Cell) {
        debug!("resetting cell {}", cell.id());
        self.hal().cell_dcaches_flush(cell, DcacheFlush::Invalidate);
    }

    /// Schedules a vCPU TLB flush on every CPU of `cell`, issued from `this_cpu`.
    ///
    /// The calling CPU flushes right away. Other CPUs only get their flag set and flush on
    /// their next event check: nothing is signaled and nothing waits here. This is only
    /// synchronous when the cell's CPUs are driven through an event check afterwards, as the
    /// suspend/resume cycle around a configuration commit does.
    pub fn flush_cell_vcpu_caches(&self, this_cpu: usize, cell: &Cell) {
        debug!("flushing vcpu caches of cell {}", cell.id());
        for cpu_id in cell.cpus() {
            if cpu_id == this_cpu {
                self.hal().flush_vcpu_tlbs(cpu_id);
            } else if let Some(cpu) = self.cpus().get(cpu_id) {
                cpu.lock().flush_vcpu_caches = true;
            }
        }
    }

    /// Commits the interrupt configuration after `cell` was added or removed, or globally
    /// when `cell` is `None`.
    pub fn config_commit(&self, cell: Option<&Cell>) {
        debug!("committing config for cell {:?}", cell.map(Cell::id));
        self.hal().config_commit(cell);
    }
}
