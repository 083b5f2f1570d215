use log::warn;

use crate::{control::AxCpuControl, exit::CpuStat, hal::AxCpuCtlHal};

impl<H: AxCpuCtlHal> AxCpuControl<H> {
    /// Routes a physical IRQ received by `cpu_id`. Must run on `cpu_id`.
    ///
    /// The maintenance interrupt belongs to the hypervisor and is consumed here; every other
    /// IRQ is marked pending once for the guest, however many occurrences `count` collapses.
    ///
    /// Returns `true` when the hypervisor handled the IRQ, `false` when it goes to the cell.
    pub fn handle_phys_irq(&self, cpu_id: usize, irqn: u32, count: u32) -> bool {
        let Some(cpu) = self.cpus().get(cpu_id) else {
            warn!("IRQ {} received on unknown cpu {}", irqn, cpu_id);
            return false;
        };

        if irqn == self.config().maintenance_irq {
            cpu.count(CpuStat::VmExitsMaintenance, count as u64);
            self.hal().inject_pending(cpu_id);
            return true;
        }

        cpu.count(CpuStat::VmExitsVirq, count as u64);
        self.hal().set_pending(cpu_id, irqn);
        false
    }
}
