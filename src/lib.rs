// Copyright 2025 The Axvisor Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! AxCpuCtl - Physical CPU lifecycle control for ArceOS partitioning hypervisors.
//!
//! This crate governs how a physical core moves between running guest code, being
//! suspended by another core, being parked (powered off) and being reset into a fresh
//! entry point. Cores request these transitions from each other through directed
//! software-generated interrupts (SGIs); the target core then services the request on
//! its own instruction stream.
//!
//! # Features
//!
//! - Per-CPU control state guarded by a per-core spin lock
//! - Event-check state machine (Running → Suspended → Running, Running → Powered off, Reset)
//! - SGI dispatch and physical IRQ routing between the hypervisor and the owning cell
//! - Cell-wide hooks: reset, deferred vCPU TLB flush and interrupt configuration commit
//!
//! There is no blocking primitive anywhere in this crate: every wait is a spin loop on a
//! specific flag, and a remote core that never services its interrupts stalls the
//! requester forever.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod cell; // Cell-wide lifecycle hooks
mod control; // Lifecycle state machine and suspend/resume/reset/park requests
mod exit; // Per-CPU exit counters
mod hal; // Collaborator interfaces provided by the hypervisor
mod irq; // Physical interrupt routing
mod percpu; // Per-CPU control state
mod sgi; // Cross-core signal definitions and dispatch

pub use cell::Cell;
pub use control::{AxCpuControl, AxCpuCtlConfig, CpuState, EventOutcome, MAX_CPUS};
pub use exit::{CpuStat, CpuStats};
pub use hal::{AxCpuCtlHal, DcacheFlush};
pub use percpu::{OwnerFlag, PSCI_INVALID_ADDRESS, PerCpuControl, invalid_entry};
pub use sgi::{Sgi, SgiId};
