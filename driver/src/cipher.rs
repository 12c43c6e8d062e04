// Licensed under the Apache-2.0 license

//! Block-cipher sessions.
//!
//! A session carries the key and the chained IV across runs; each run walks
//! its buffers chunk by chunk through the planner, executing one chunk per
//! dispatch so concurrent sessions interleave on the engine.

use std::sync::{mpsc, Arc, Mutex};

use eip130_token::crypto;
use eip130_token::{CommandToken, DMA_MAX_LENGTH};
use zeroize::Zeroize;

use crate::dma::{sg_total, SgEntry};
use crate::dma::DmaPage;
use crate::engine::EngineShared;
use crate::error::{CipherError, CipherResult};
use crate::planner::{iv_add_blocks, plan_ctr, Chunk, ChunkDescriptor, CipherPlan};
use crate::queue::{QueueEntry, StepOutcome};
use crate::stats::OpClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgo {
    Aes,
    Des,
}

impl CipherAlgo {
    pub fn block_len(self) -> usize {
        match self {
            CipherAlgo::Aes => 16,
            CipherAlgo::Des => 8,
        }
    }

    fn key_len_ok(self, len: usize) -> bool {
        match self {
            CipherAlgo::Aes => matches!(len, 16 | 24 | 32),
            // 24 bytes selects 3DES
            CipherAlgo::Des => matches!(len, 8 | 24),
        }
    }

    fn token_algo(self, key_len: usize) -> crypto::CipherAlgorithm {
        match self {
            CipherAlgo::Aes => crypto::CipherAlgorithm::Aes,
            CipherAlgo::Des if key_len == 24 => crypto::CipherAlgorithm::TripleDes,
            CipherAlgo::Des => crypto::CipherAlgorithm::Des,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Ecb,
    Cbc,
    Ctr,
    Icm,
}

impl CipherMode {
    fn token_mode(self) -> crypto::CipherMode {
        match self {
            CipherMode::Ecb => crypto::CipherMode::Ecb,
            CipherMode::Cbc => crypto::CipherMode::Cbc,
            CipherMode::Ctr => crypto::CipherMode::Ctr,
            CipherMode::Icm => crypto::CipherMode::Icm,
        }
    }

    pub(crate) fn needs_iv(self) -> bool {
        self != CipherMode::Ecb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CipherState {
    Idle,
    Running,
    Done,
    Failed,
}

pub(crate) struct CipherInner {
    pub algo: CipherAlgo,
    pub mode: CipherMode,
    pub key: [u8; 32],
    pub key_len: usize,
    pub iv: [u8; 16],
    pub state: CipherState,
    pub page: DmaPage,
}

/// Caller-visible handle. Dropping it wipes the key material and returns
/// the bounce page to the pool.
pub struct CipherSession {
    pub(crate) inner: Arc<Mutex<CipherInner>>,
    pub(crate) shared: Arc<EngineShared>,
}

impl Drop for CipherSession {
    fn drop(&mut self) {
        let mut s = self.inner.lock().unwrap();
        s.key.zeroize();
        s.iv.zeroize();
        self.shared.pool.free_page(s.page);
    }
}

pub(crate) fn open(
    shared: &Arc<EngineShared>,
    algo: CipherAlgo,
    mode: CipherMode,
    key: &[u8],
    iv: Option<&[u8; 16]>,
) -> CipherResult<CipherSession> {
    if !algo.key_len_ok(key.len()) {
        return Err(CipherError::InvalidParameter("key length"));
    }
    if algo == CipherAlgo::Des && !matches!(mode, CipherMode::Ecb | CipherMode::Cbc) {
        return Err(CipherError::InvalidParameter("mode not supported for DES"));
    }
    if mode.needs_iv() && iv.is_none() {
        return Err(CipherError::InvalidParameter("mode requires an IV"));
    }
    let page = shared.pool.alloc_page()?;
    let mut inner = CipherInner {
        algo,
        mode,
        key: [0; 32],
        key_len: key.len(),
        iv: [0; 16],
        state: CipherState::Idle,
        page,
    };
    inner.key[..key.len()].copy_from_slice(key);
    if let Some(iv) = iv {
        inner.iv = *iv;
    }
    Ok(CipherSession {
        inner: Arc::new(Mutex::new(inner)),
        shared: shared.clone(),
    })
}

/// Run one logical cipher operation over `len` bytes, blocking the caller
/// until the queue has drained every chunk.
pub(crate) fn run(
    session: &CipherSession,
    src: &[SgEntry],
    dst: &[SgEntry],
    len: usize,
    encrypt: bool,
) -> CipherResult<()> {
    let shared = session.shared.clone();
    let inner = session.inner.clone();

    let (block, mode) = {
        let mut s = inner.lock().unwrap();
        match s.state {
            CipherState::Running => {
                return Err(CipherError::InvalidState("operation already in progress"))
            }
            CipherState::Failed => return Err(CipherError::InvalidState("session failed")),
            CipherState::Idle | CipherState::Done => {}
        }
        let block = s.algo.block_len();
        if len % block != 0 && s.mode != CipherMode::Ctr {
            return Err(CipherError::InvalidParameter("length not block aligned"));
        }
        if sg_total(src) < len || sg_total(dst) < len {
            return Err(CipherError::InvalidParameter("scatter list shorter than length"));
        }
        if src.iter().chain(dst).any(|e| e.len > DMA_MAX_LENGTH as usize) {
            return Err(CipherError::InvalidParameter("segment exceeds DMA limit"));
        }
        s.state = CipherState::Running;
        (block, s.mode)
    };

    let stash_next_iv = mode == CipherMode::Cbc && !encrypt;
    let mut plan = CipherPlan::new(src, dst, len, block, len % block == 0, stash_next_iv);

    let (tx, rx) = mpsc::channel();
    let work_shared = shared.clone();
    let work_inner = inner.clone();
    let work = Box::new(move || -> CipherResult<StepOutcome> {
        let mut s = work_inner.lock().unwrap();
        let _engine = work_shared.state.lock().unwrap();
        let outcome = step(&work_shared, &mut s, &mut plan, encrypt);
        match &outcome {
            Ok(StepOutcome::Complete) => s.state = CipherState::Done,
            Err(_) => s.state = CipherState::Failed,
            Ok(StepOutcome::Continue) => {}
        }
        outcome
    });
    let backlog_shared = shared.clone();
    shared.queue.submit(QueueEntry {
        work,
        complete: Box::new(move |r| {
            let _ = tx.send(r);
        }),
        backlog_notify: Some(Box::new(move || {
            backlog_shared.stats.backlogged(OpClass::Cipher);
        })),
    });
    match rx.recv() {
        Ok(result) => result,
        Err(_) => Err(CipherError::InvalidState("engine stopped")),
    }
}

fn step(
    shared: &EngineShared,
    s: &mut CipherInner,
    plan: &mut CipherPlan,
    encrypt: bool,
) -> CipherResult<StepOutcome> {
    let mem = shared.pool.memory();
    let desc = match plan.next_chunk(mem, s.page.addr)? {
        Some(d) => d,
        None => return Ok(StepOutcome::Complete),
    };
    let payload = desc.payload;
    let bounced = desc.bounced;

    let chunk = if s.mode == CipherMode::Ctr {
        plan_ctr(desc, &s.iv, s.algo.block_len())
    } else {
        Chunk::Single(desc)
    };

    match chunk {
        Chunk::Single(d) => exchange_chunk(shared, s, &d, encrypt, true)?,
        Chunk::SplitCtr {
            first,
            second,
            carry_blocks,
        } => {
            exchange_chunk(shared, s, &first, encrypt, false)?;
            iv_add_blocks(&mut s.iv, carry_blocks);
            exchange_chunk(shared, s, &second, encrypt, true)?;
        }
    }

    if bounced {
        plan.write_back(mem, s.page.addr, payload)?;
    }

    if plan.is_done() {
        Ok(StepOutcome::Complete)
    } else {
        Ok(StepOutcome::Continue)
    }
}

fn exchange_chunk(
    shared: &EngineShared,
    s: &mut CipherInner,
    d: &ChunkDescriptor,
    encrypt: bool,
    last_part: bool,
) -> CipherResult<()> {
    let mut t = CommandToken::new();
    crypto::operation(
        &mut t,
        s.algo.token_algo(s.key_len),
        s.mode.token_mode(),
        encrypt,
        d.len as u32,
    );
    let dst = d.dst.expect("cipher chunks carry a destination");
    crypto::set_data_addresses(&mut t, d.src, d.len as u32, dst, d.len as u32);
    crypto::copy_key(&mut t, &s.key[..s.key_len]);
    crypto::set_key_length(&mut t, s.key_len as u32);
    if s.mode.needs_iv() {
        crypto::copy_iv(&mut t, &s.iv);
    }

    let r = shared.timed_exchange(OpClass::Cipher, d.payload, &mut t)?;

    match s.mode {
        // The engine hands back the advanced counter block; the first half
        // of a split gets its IV from the software carry instead.
        CipherMode::Ctr if last_part => crypto::read_iv(&r, &mut s.iv),
        CipherMode::Cbc => {
            if encrypt {
                let mut iv = [0u8; 16];
                shared.pool.memory().read(dst + d.len as u64 - 16, &mut iv)?;
                s.iv = iv;
            } else if let Some(iv) = d.next_iv {
                s.iv = iv;
            }
        }
        _ => {}
    }
    Ok(())
}
