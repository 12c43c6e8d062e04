// Licensed under the Apache-2.0 license

//! Shared harness: an engine wired to the emulated EIP-130.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eip130_driver::{CeConfig, CryptoEngine, DeviceMemory, DeviceMmio, OpClass, StatsSink};
use eip130_emulator_periph::{Eip130Periph, EmulatedDmaRam};

/// Total emulated DMA RAM; the low region is free for hand-built scatter
/// buffers, the rest feeds the driver's pool.
pub const RAM_SIZE: usize = 512 * 1024;
pub const POOL_BASE: u64 = 0x1_0000;

pub struct TestRig {
    pub mem: Arc<EmulatedDmaRam>,
    pub periph: Arc<Eip130Periph>,
    pub engine: CryptoEngine,
}

pub fn rig() -> TestRig {
    rig_with(CeConfig::default(), Box::new(eip130_driver::NullStats))
}

pub fn rig_with(config: CeConfig, stats: Box<dyn StatsSink>) -> TestRig {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
    let mem = EmulatedDmaRam::new(RAM_SIZE);
    let periph = Eip130Periph::new(mem.clone());
    let mmio: Arc<dyn DeviceMmio> = periph.clone();
    let dma: Arc<dyn DeviceMemory> = mem.clone();
    let engine = CryptoEngine::with_stats(
        config,
        mmio,
        dma,
        POOL_BASE,
        RAM_SIZE - POOL_BASE as usize,
        stats,
    )
    .expect("engine bring-up");
    let channel = engine.mailbox();
    periph.set_irq_handler(Box::new(move || channel.handle_interrupt()));
    TestRig {
        mem,
        periph,
        engine,
    }
}

/// Short-timeout rig for timeout scenarios.
pub fn rig_fast_timeout() -> TestRig {
    rig_with(
        CeConfig {
            timeout: Duration::from_millis(100),
            ..CeConfig::default()
        },
        Box::new(eip130_driver::NullStats),
    )
}

/// Counts backlog admissions and chunk errors.
#[derive(Default)]
pub struct CountingStats {
    pub backlogged: AtomicUsize,
    pub chunk_errors: AtomicUsize,
}

impl StatsSink for CountingStats {
    fn chunk_error(&self, _class: OpClass) {
        self.chunk_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn backlogged(&self, _class: OpClass) {
        self.backlogged.fetch_add(1, Ordering::SeqCst);
    }
}
