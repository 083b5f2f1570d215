use alloc::vec::Vec;

use axerrno::{AxResult, ax_err, ax_err_type};
use log::{error, trace, warn};
use memory_addr::PhysAddr;

use crate::{
    exit::CpuStats,
    hal::AxCpuCtlHal,
    percpu::{ControlFlags, PerCpuControl, invalid_entry},
};

/// Maximum number of physical CPUs. CPU sets are single-word bitmasks.
pub const MAX_CPUS: usize = usize::BITS as usize;

/// The slice of the static system configuration needed to control physical CPUs.
#[derive(Clone, Copy, Debug)]
pub struct AxCpuCtlConfig {
    /// Number of physical CPUs, ids are `0..num_cpus`.
    pub num_cpus: usize,
    /// The interrupt controller maintenance interrupt, consumed by the hypervisor.
    pub maintenance_irq: u32,
}

/// The lifecycle state of a physical CPU, as observed from its control flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuState {
    /// The core runs guest code.
    Running = 1,
    /// The core acknowledged a suspension and spins until resumed.
    Suspended = 2,
    /// The core is parked and waits for a reset.
    PoweredOff = 3,
}

/// The decision taken by one event check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    /// Return to the guest.
    Resume,
    /// Park the core.
    PowerOff,
    /// Restart the guest context at the given entry.
    Reset(PhysAddr),
}

/// Lifecycle controller for all physical CPUs of the system.
///
/// It owns one [`PerCpuControl`] per physical core. Methods taking a `cpu_id` either act
/// on a remote target (requests, may be called from any core) or on the calling core
/// itself (interrupt entry points, which must run on `cpu_id`).
pub struct AxCpuControl<H: AxCpuCtlHal> {
    config: AxCpuCtlConfig,
    cpus: Vec<PerCpuControl>,
    hal: H,
}

impl<H: AxCpuCtlHal> AxCpuControl<H> {
    /// Create the controller, with one control state per physical CPU.
    pub fn new(config: AxCpuCtlConfig, hal: H) -> AxResult<Self> {
        if config.num_cpus == 0 || config.num_cpus > MAX_CPUS {
            return ax_err!(InvalidInput, "unsupported number of physical CPUs");
        }
        let mut cpus = Vec::with_capacity(config.num_cpus);
        for cpu_id in 0..config.num_cpus {
            let mut cpu = PerCpuControl::new_uninit();
            cpu.init(cpu_id)?;
            cpus.push(cpu);
        }
        Ok(Self { config, cpus, hal })
    }

    /// Get the system configuration.
    pub const fn config(&self) -> &AxCpuCtlConfig {
        &self.config
    }

    /// Get the number of physical CPUs.
    pub fn num_cpus(&self) -> usize {
        self.cpus.len()
    }

    /// Get the hypervisor interfaces.
    pub const fn hal(&self) -> &H {
        &self.hal
    }

    pub(crate) fn cpus(&self) -> &[PerCpuControl] {
        &self.cpus
    }

    /// Get the control state of `cpu_id`.
    pub fn percpu(&self, cpu_id: usize) -> AxResult<&PerCpuControl> {
        self.cpus
            .get(cpu_id)
            .ok_or_else(|| ax_err_type!(InvalidInput, "physical CPU id out of range"))
    }

    /// Get a snapshot of the exit counters of `cpu_id`.
    pub fn stats(&self, cpu_id: usize) -> AxResult<CpuStats> {
        Ok(self.percpu(cpu_id)?.stats())
    }

    /// Get the lifecycle state of `cpu_id`.
    pub fn cpu_state(&self, cpu_id: usize) -> AxResult<CpuState> {
        let cpu = self.percpu(cpu_id)?;
        if cpu.wait_for_poweron() {
            return Ok(CpuState::PoweredOff);
        }
        Ok(if cpu.lock().cpu_suspended {
            CpuState::Suspended
        } else {
            CpuState::Running
        })
    }

    /// Forces `cpu_id` through an event check.
    pub fn kick(&self, cpu_id: usize) -> AxResult {
        self.percpu(cpu_id)?;
        self.send_event(cpu_id);
        Ok(())
    }

    /// Suspends `cpu_id` and waits until it acknowledged the suspension.
    ///
    /// Only the caller blocks. If a suspension is already requested or acknowledged, no
    /// further event is sent. There is no timeout: a target that never takes its
    /// interrupts stalls the caller forever.
    pub fn suspend(&self, cpu_id: usize) -> AxResult {
        let target = self.percpu(cpu_id)?;
        trace!("suspending cpu {}", cpu_id);

        let already_requested = {
            let mut flags = target.lock();
            let requested = flags.suspend_cpu || flags.cpu_suspended;
            flags.suspend_cpu = true;
            requested
        };

        if !already_requested {
            self.send_event(cpu_id);
        }
        while !target.lock().cpu_suspended {
            self.hal.cpu_relax();
        }
        Ok(())
    }

    /// Lets a suspended `cpu_id` continue. Returns without waiting for it.
    pub fn resume(&self, cpu_id: usize) -> AxResult {
        let target = self.percpu(cpu_id)?;
        trace!("resuming cpu {}", cpu_id);

        // Locked to order against a suspension that is still being acknowledged.
        target.lock().suspend_cpu = false;
        Ok(())
    }

    /// Requests `cpu_id` to restart its guest at `entry`.
    ///
    /// An `entry` equal to [`invalid_entry`] parks the core instead.
    pub fn reset(&self, cpu_id: usize, entry: PhysAddr) -> AxResult {
        trace!("resetting cpu {} to {:#x}", cpu_id, entry.as_usize());
        self.request(cpu_id, |flags| {
            flags.reset = true;
            flags.cpu_on_entry = entry;
        })
    }

    /// Requests `cpu_id` to power off.
    pub fn park(&self, cpu_id: usize) -> AxResult {
        trace!("parking cpu {}", cpu_id);
        self.request(cpu_id, |flags| flags.park = true)
    }

    /// Latches a request and resumes the target. A target that has not acknowledged a
    /// suspension is running or parked, so it gets an event to notice the request.
    fn request<F>(&self, cpu_id: usize, f: F) -> AxResult
    where
        F: FnOnce(&mut ControlFlags),
    {
        let target = self.percpu(cpu_id)?;
        let needs_event = {
            let mut flags = target.lock();
            f(&mut *flags);
            flags.suspend_cpu = false;
            !flags.cpu_suspended
        };
        if needs_event {
            self.send_event(cpu_id);
        }
        Ok(())
    }

    /// Runs the event check of `cpu_id` and applies its outcome. Must run on `cpu_id`.
    ///
    /// This is where a suspended core spins. The returned outcome has already been applied:
    /// after [`EventOutcome::PowerOff`] or [`EventOutcome::Reset`] the guest context of the
    /// core is replaced, and the caller must go straight back to guest entry.
    pub fn check_events(&self, cpu_id: usize) -> EventOutcome {
        let Some(cpu) = self.cpus.get(cpu_id) else {
            warn!("event check on unknown cpu {}", cpu_id);
            return EventOutcome::Resume;
        };
        let outcome = self.process_events(cpu);

        // Only this core writes wait_for_poweron and the reset decision, so neither needs
        // the lock, which must not be held across the context switch below.
        match outcome {
            EventOutcome::Resume => {}
            EventOutcome::PowerOff => self.park_self(cpu_id),
            EventOutcome::Reset(entry) => self.hal.cpu_reset(cpu_id, entry),
        }
        outcome
    }

    fn process_events(&self, cpu: &PerCpuControl) -> EventOutcome {
        let mut flags = cpu.lock();

        if flags.suspend_cpu {
            flags.cpu_suspended = true;
            // Spin with the lock released. The loop is only left with the lock held and the
            // suspension lifted, so a suspension asserted again in between keeps us here.
            while flags.suspend_cpu {
                drop(flags);
                self.hal.cpu_relax();
                flags = cpu.lock();
            }
        }
        flags.cpu_suspended = false;
        let request = Self::take_request(cpu, &mut flags);

        // Flushed before unlocking: a requester sees the flag set or the flush done.
        if flags.flush_vcpu_caches {
            flags.flush_vcpu_caches = false;
            self.hal.flush_vcpu_tlbs(cpu.cpu_id());
        }
        drop(flags);

        match request {
            Some(outcome) => outcome,
            None if cpu.wait_for_poweron() => EventOutcome::PowerOff,
            None => EventOutcome::Resume,
        }
    }

    /// Consumes a pending park or reset request. Park is checked first and wins if both
    /// are pending.
    fn take_request(cpu: &PerCpuControl, flags: &mut ControlFlags) -> Option<EventOutcome> {
        if flags.park {
            cpu.enter_cpu_off(flags);
            return Some(EventOutcome::PowerOff);
        }
        if flags.reset {
            flags.reset = false;
            if flags.cpu_on_entry != invalid_entry() {
                cpu.set_wait_for_poweron(false);
                return Some(EventOutcome::Reset(flags.cpu_on_entry));
            }
            warn!("cpu {} reset without entry, parking it", cpu.cpu_id());
            cpu.enter_cpu_off(flags);
            return Some(EventOutcome::PowerOff);
        }
        None
    }

    /// Parks the calling core `cpu_id`: marks it powered off and moves its guest context
    /// into the parking address space, where it idles until a reset arrives.
    pub fn park_self(&self, cpu_id: usize) {
        let Some(cpu) = self.cpus.get(cpu_id) else {
            warn!("park of unknown cpu {}", cpu_id);
            return;
        };
        {
            let mut flags = cpu.lock();
            cpu.enter_cpu_off(&mut flags);
        }

        self.hal.cpu_reset(cpu_id, PhysAddr::from(0));
        self.hal.paging_init_parked(cpu_id);
    }

    /// Parks the calling core after a hypervisor panic.
    pub fn panic_park(&self, cpu_id: usize) {
        self.park_self(cpu_id);
    }

    /// Stops the calling core for good after a hypervisor panic.
    pub fn panic_stop(&self, cpu_id: usize) -> ! {
        error!("cpu {} stopped", cpu_id);
        loop {
            self.hal.wait_for_interrupt();
        }
    }
}
