// Licensed under the Apache-2.0 license

//! The engine facade: bring-up, shared state, and the caller-facing
//! operation API.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use eip130_token::{CommandToken, ResultToken};
use log::debug;

use crate::channel::MailboxChannel;
use crate::cipher::{self, CipherAlgo, CipherMode, CipherSession};
use crate::config::CeConfig;
use crate::dma::{DeviceMemory, DmaPage, DmaPool, SgEntry, PAGE_SIZE};
use crate::error::{CipherError, CipherResult};
use crate::hash::{self, HashAlgo, HashSession, HashSnapshot};
use crate::mmio::{regs, DeviceMmio};
use crate::pk::{self, PkDirection};
use crate::queue::{dispatch_loop, RequestQueue};
use crate::rng;
use crate::stats::{NullStats, OpClass, StatsSink};

pub(crate) struct EngineState {
    pub trng_configured: bool,
}

/// Everything the dispatcher and the sessions share: the mailbox channel,
/// the DMA pool, the engine mutex serializing hardware access, the queue
/// and the stats sink. Injected explicitly instead of living in globals.
pub(crate) struct EngineShared {
    pub(crate) channel: Arc<MailboxChannel>,
    pub(crate) pool: DmaPool,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) queue: Arc<RequestQueue>,
    pub(crate) stats: Box<dyn StatsSink>,
}

impl EngineShared {
    /// Exchange with per-chunk stats bracketing. Callers hold the engine
    /// mutex across this and any session mutation that follows.
    pub(crate) fn timed_exchange(
        &self,
        class: OpClass,
        bytes: usize,
        token: &mut CommandToken,
    ) -> CipherResult<ResultToken> {
        self.stats.chunk_start(class);
        let start = Instant::now();
        match self.channel.exchange(token) {
            Ok(r) => {
                self.stats.chunk_end(class, bytes, start.elapsed());
                Ok(r)
            }
            Err(e) => {
                self.stats.chunk_error(class);
                Err(e)
            }
        }
    }
}

/// Handle to a brought-up engine. Dropping it stops the dispatcher and
/// fails whatever is still queued.
pub struct CryptoEngine {
    shared: Arc<EngineShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CryptoEngine {
    /// Bring the engine up and start the dispatcher.
    ///
    /// `dma_base`/`dma_size` describe the device-visible region handed to
    /// the driver for bounce pages and staging. Fails with
    /// `HardwareFault` if the module status does not show accepted
    /// firmware, or if the mailbox cannot be linked.
    pub fn new(
        config: CeConfig,
        mmio: Arc<dyn DeviceMmio>,
        mem: Arc<dyn DeviceMemory>,
        dma_base: u64,
        dma_size: usize,
    ) -> CipherResult<Self> {
        Self::with_stats(config, mmio, mem, dma_base, dma_size, Box::new(NullStats))
    }

    pub fn with_stats(
        config: CeConfig,
        mmio: Arc<dyn DeviceMmio>,
        mem: Arc<dyn DeviceMemory>,
        dma_base: u64,
        dma_size: usize,
        stats: Box<dyn StatsSink>,
    ) -> CipherResult<Self> {
        if config.mailbox < 1 || config.mailbox as usize > regs::MAILBOX_COUNT {
            return Err(CipherError::InvalidParameter("mailbox number"));
        }
        firmware_check(&*mmio)?;

        let channel = Arc::new(MailboxChannel::new(mmio, config.mailbox, config.timeout));
        channel.link()?;
        if !channel.can_write_token() {
            return Err(CipherError::InvalidState("mailbox not writable"));
        }
        channel.write_lockout(0);
        channel.aic_init();
        debug!("eip130: mailbox {} linked", config.mailbox);

        let queue = Arc::new(RequestQueue::new(config.queue_depth));
        let shared = Arc::new(EngineShared {
            channel,
            pool: DmaPool::new(mem, dma_base, dma_size),
            state: Mutex::new(EngineState {
                trng_configured: false,
            }),
            queue: queue.clone(),
            stats,
        });
        let worker = thread::Builder::new()
            .name("eip130-dispatch".into())
            .spawn(move || dispatch_loop(queue))
            .map_err(|_| CipherError::ResourceExhausted("dispatch thread"))?;

        Ok(CryptoEngine {
            shared,
            worker: Some(worker),
        })
    }

    /// The channel whose `handle_interrupt` the platform's IRQ dispatch
    /// must call when the engine raises its line.
    pub fn mailbox(&self) -> Arc<MailboxChannel> {
        self.shared.channel.clone()
    }

    pub fn open_cipher(
        &self,
        algo: CipherAlgo,
        mode: CipherMode,
        key: &[u8],
        iv: Option<&[u8; 16]>,
    ) -> CipherResult<CipherSession> {
        cipher::open(&self.shared, algo, mode, key, iv)
    }

    /// Run `len` bytes through the session. `src` and `dst` are
    /// device-visible scatter lists; the session IV chains across calls.
    pub fn cipher_run(
        &self,
        session: &CipherSession,
        src: &[SgEntry],
        dst: &[SgEntry],
        len: usize,
        encrypt: bool,
    ) -> CipherResult<()> {
        cipher::run(session, src, dst, len, encrypt)
    }

    /// Convenience wrapper staging plain slices through the DMA pool.
    pub fn cipher_run_bytes(
        &self,
        session: &CipherSession,
        src: &[u8],
        dst: &mut [u8],
        encrypt: bool,
    ) -> CipherResult<()> {
        if dst.len() < src.len() {
            return Err(CipherError::InvalidParameter("destination too short"));
        }
        let staged = self.stage(src)?;
        let result = cipher::run(session, &staged.sg, &staged.sg, src.len(), encrypt)
            .and_then(|()| self.unstage(&staged, &mut dst[..src.len()]));
        self.release(staged);
        result
    }

    pub fn open_hash(&self, algo: HashAlgo, mac_key: Option<&[u8]>) -> CipherResult<HashSession> {
        hash::open(&self.shared, algo, mac_key)
    }

    /// Feed `len` bytes from `src`; returns the digest/MAC on the final
    /// update.
    pub fn hash_update(
        &self,
        session: &HashSession,
        src: &[SgEntry],
        len: usize,
        is_final: bool,
    ) -> CipherResult<Option<Vec<u8>>> {
        hash::update(session, src, len, is_final)
    }

    pub fn hash_update_bytes(
        &self,
        session: &HashSession,
        data: &[u8],
        is_final: bool,
    ) -> CipherResult<Option<Vec<u8>>> {
        let staged = self.stage(data)?;
        let result = hash::update(session, &staged.sg, data.len(), is_final);
        self.release(staged);
        result
    }

    /// Snapshot a hash/MAC session for later resumption.
    pub fn hash_export(&self, session: &HashSession) -> CipherResult<HashSnapshot> {
        hash::export(session)
    }

    pub fn hash_import(&self, session: &HashSession, snap: &HashSnapshot) -> CipherResult<()> {
        hash::import(session, snap)
    }

    /// RSA modular exponentiation; returns the modulus-sized result.
    pub fn pk_modexp(
        &self,
        direction: PkDirection,
        modulus: &[u8],
        exponent: &[u8],
        input: &[u8],
    ) -> CipherResult<Vec<u8>> {
        pk::modexp(&self.shared, direction, modulus, exponent, input)
    }

    /// Fill `dst` with engine-generated random bytes.
    pub fn random(&self, dst: &mut [u8]) -> CipherResult<()> {
        rng::random(&self.shared, dst)
    }

    /// Exchange a caller-built token under the engine mutex. Used for
    /// services the session API does not wrap, such as asset management.
    pub fn raw_exchange(&self, token: &mut CommandToken) -> CipherResult<ResultToken> {
        let _engine = self.shared.state.lock().unwrap();
        self.shared.channel.exchange(token)
    }

    fn stage(&self, data: &[u8]) -> CipherResult<Staged> {
        let mut staged = Staged {
            pages: Vec::new(),
            sg: Vec::new(),
        };
        for chunk in data.chunks(PAGE_SIZE) {
            let page = match self.shared.pool.alloc_page() {
                Ok(p) => p,
                Err(e) => {
                    self.release(staged);
                    return Err(e);
                }
            };
            staged.pages.push(page);
            if let Err(e) = self.shared.pool.memory().write(page.addr, chunk) {
                self.release(staged);
                return Err(e);
            }
            staged.sg.push(SgEntry::new(page.addr, chunk.len()));
        }
        Ok(staged)
    }

    fn unstage(&self, staged: &Staged, dst: &mut [u8]) -> CipherResult<()> {
        crate::dma::sg_copy_to_buffer(self.shared.pool.memory(), &staged.sg, 0, dst)
    }

    fn release(&self, staged: Staged) {
        for page in staged.pages {
            self.shared.pool.free_page(page);
        }
    }
}

struct Staged {
    pages: Vec<DmaPage>,
    sg: Vec<SgEntry>,
}

impl Drop for CryptoEngine {
    fn drop(&mut self) {
        self.shared.queue.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Verify the module status shows healthy, accepted firmware.
fn firmware_check(mmio: &dyn DeviceMmio) -> CipherResult<()> {
    let mut status = mmio.read_reg(regs::MODULE_STATUS);
    let mut spins = 0u32;
    while status & regs::CRC24_BUSY != 0 {
        spins += 1;
        if spins > 1_000_000 {
            return Err(CipherError::HardwareFault { status });
        }
        status = mmio.read_reg(regs::MODULE_STATUS);
    }
    if status & regs::CRC24_OK == 0 || status & regs::FATAL_ERROR != 0 {
        return Err(CipherError::HardwareFault { status });
    }
    if status & regs::FIRMWARE_WRITTEN == 0
        || status & regs::FIRMWARE_CHECKS_DONE == 0
        || status & regs::FIRMWARE_ACCEPTED == 0
    {
        return Err(CipherError::HardwareFault { status });
    }
    Ok(())
}
