use log::{trace, warn};

use crate::{control::AxCpuControl, exit::CpuStat, hal::AxCpuCtlHal};

/// The kinds of software-generated interrupts exchanged between physical CPUs.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SgiId {
    /// Pending virtual interrupts must be injected into the running guest.
    Inject = 0,
    /// Control flags changed, the target must run an event check.
    Event = 1,
}

impl SgiId {
    /// Decode a received SGI number. Unknown numbers yield `None`.
    pub fn from_irqn(irqn: u32) -> Option<Self> {
        match irqn {
            0 => Some(SgiId::Inject),
            1 => Some(SgiId::Event),
            _ => None,
        }
    }
}

/// A directed software-generated interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sgi {
    /// Bitmask of target CPU ids.
    pub targets: usize,
    /// The SGI kind.
    pub id: SgiId,
}

impl Sgi {
    /// An SGI aimed at exactly one CPU.
    pub const fn to_cpu(cpu_id: usize, id: SgiId) -> Self {
        Self {
            targets: 1 << cpu_id,
            id,
        }
    }
}

impl<H: AxCpuCtlHal> AxCpuControl<H> {
    /// Sends a management event to `cpu_id`, forcing it through an event check.
    ///
    /// Fire-and-forget: nothing tells the caller when, or whether, the target serviced it.
    pub(crate) fn send_event(&self, cpu_id: usize) {
        trace!("kicking cpu {}", cpu_id);
        self.hal().send_sgi(Sgi::to_cpu(cpu_id, SgiId::Event));
    }

    /// Handles an SGI received by `cpu_id`. Must run on `cpu_id`, in its interrupt path.
    ///
    /// `count` is the number of occurrences the interrupt controller collapsed into this one
    /// delivery. Management requests live in the control flags, not in the SGIs, so a single
    /// event check services all of them.
    pub fn handle_sgi(&self, cpu_id: usize, irqn: u32, count: u32) {
        let Some(cpu) = self.cpus().get(cpu_id) else {
            warn!("SGI {} received on unknown cpu {}", irqn, cpu_id);
            return;
        };
        match SgiId::from_irqn(irqn) {
            Some(SgiId::Inject) => {
                cpu.count(CpuStat::VmExitsVsgi, count as u64);
                self.hal().inject_pending(cpu_id);
            }
            Some(SgiId::Event) => {
                cpu.count(CpuStat::VmExitsManagement, count as u64);
                self.check_events(cpu_id);
            }
            None => warn!("unknown SGI received {}", irqn),
        }
    }
}
