// Licensed under the Apache-2.0 license

//! Streaming hash and HMAC sessions.
//!
//! The engine exchanges the full midstate in every token; the session keeps
//! it between chunks together with up to one block of unconsumed bytes
//! cached in the bounce page. A session can be snapshotted to an opaque
//! blob and resumed later, which is how suspended requests share a session
//! slot.

use std::sync::{mpsc, Arc, Mutex};

use eip130_token::{hash as hash_token, mac as mac_token, CommandToken};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
use zeroize::Zeroize;

use crate::dma::{sg_total, DmaPage, SgEntry, PAGE_SIZE};
use crate::engine::EngineShared;
use crate::error::{CipherError, CipherResult};
use crate::planner::HashPlan;
use crate::queue::{QueueEntry, StepOutcome};
use crate::stats::OpClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl HashAlgo {
    pub fn is_mac(self) -> bool {
        matches!(
            self,
            HashAlgo::HmacSha1
                | HashAlgo::HmacSha224
                | HashAlgo::HmacSha256
                | HashAlgo::HmacSha384
                | HashAlgo::HmacSha512
        )
    }

    /// The plain-hash twin, used for the token algorithm of non-MAC
    /// operations and for MAC key digestion.
    pub(crate) fn token_hash(self) -> hash_token::HashAlgorithm {
        match self {
            HashAlgo::Sha1 | HashAlgo::HmacSha1 => hash_token::HashAlgorithm::Sha1,
            HashAlgo::Sha224 | HashAlgo::HmacSha224 => hash_token::HashAlgorithm::Sha224,
            HashAlgo::Sha256 | HashAlgo::HmacSha256 => hash_token::HashAlgorithm::Sha256,
            HashAlgo::Sha384 | HashAlgo::HmacSha384 => hash_token::HashAlgorithm::Sha384,
            HashAlgo::Sha512 | HashAlgo::HmacSha512 => hash_token::HashAlgorithm::Sha512,
        }
    }

    pub(crate) fn token_mac(self) -> mac_token::MacAlgorithm {
        match self {
            HashAlgo::HmacSha1 => mac_token::MacAlgorithm::HmacSha1,
            HashAlgo::HmacSha224 => mac_token::MacAlgorithm::HmacSha224,
            HashAlgo::HmacSha256 => mac_token::MacAlgorithm::HmacSha256,
            HashAlgo::HmacSha384 => mac_token::MacAlgorithm::HmacSha384,
            HashAlgo::HmacSha512 => mac_token::MacAlgorithm::HmacSha512,
            _ => unreachable!("not a MAC algorithm"),
        }
    }

    pub fn digest_len(self) -> usize {
        self.token_hash().digest_len()
    }

    pub(crate) fn state_len(self) -> usize {
        self.token_hash().state_len()
    }

    pub fn block_len(self) -> usize {
        self.token_hash().block_len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HashState {
    Idle,
    Accumulating,
    Finalizing,
    Done,
}

pub(crate) struct HashInner {
    pub algo: HashAlgo,
    pub state: HashState,
    /// An update is being serviced; a second concurrent update on the
    /// same session would interleave chunks and corrupt the stream.
    pub in_flight: bool,
    pub digest: [u8; 64],
    pub key: [u8; 128],
    pub key_len: usize,
    pub cache_size: usize,
    pub cache_offset: usize,
    pub total_len: u64,
    pub first: bool,
    pub aligned: bool,
    pub page: DmaPage,
}

pub struct HashSession {
    pub(crate) inner: Arc<Mutex<HashInner>>,
    pub(crate) shared: Arc<EngineShared>,
}

impl Drop for HashSession {
    fn drop(&mut self) {
        let mut s = self.inner.lock().unwrap();
        s.digest.zeroize();
        s.key.zeroize();
        self.shared.pool.free_page(s.page);
    }
}

/// Snapshot of a hash/MAC session, including the cached partial block.
/// The layout is fixed; suspended sessions are resumed from these bytes.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct HashSnapshot {
    pub state: [u8; 64],
    pub key: [u8; 128],
    pub cache: [u8; 128],
    pub cache_size: u32,
    pub cache_offset: u32,
    pub total_len: u64,
    pub key_len: u32,
    pub first: u8,
    pub aligned: u8,
    pub pad: [u8; 2],
}

pub(crate) fn open(
    shared: &Arc<EngineShared>,
    algo: HashAlgo,
    mac_key: Option<&[u8]>,
) -> CipherResult<HashSession> {
    let (key, key_len) = match (algo.is_mac(), mac_key) {
        (false, None) => ([0u8; 128], 0),
        (false, Some(_)) => return Err(CipherError::InvalidParameter("key on a plain hash")),
        (true, None) => return Err(CipherError::InvalidParameter("MAC requires a key")),
        (true, Some(k)) if k.len() > algo.block_len() => derive_mac_key(shared, algo, k)?,
        (true, Some(k)) => {
            let mut key = [0u8; 128];
            key[..k.len()].copy_from_slice(k);
            (key, k.len())
        }
    };
    let page = shared.pool.alloc_page()?;
    Ok(HashSession {
        inner: Arc::new(Mutex::new(HashInner {
            algo,
            state: HashState::Idle,
            in_flight: false,
            digest: [0; 64],
            key,
            key_len,
            cache_size: 0,
            cache_offset: 0,
            total_len: 0,
            first: true,
            aligned: true,
            page,
        })),
        shared: shared.clone(),
    })
}

/// Keys longer than the block size are replaced by their digest, computed
/// on the engine itself. Runs outside the queue, under the engine mutex,
/// like any other key setup.
fn derive_mac_key(
    shared: &Arc<EngineShared>,
    algo: HashAlgo,
    key: &[u8],
) -> CipherResult<([u8; 128], usize)> {
    if key.len() > PAGE_SIZE {
        return Err(CipherError::InvalidParameter("MAC key too long"));
    }
    let page = shared.pool.alloc_page()?;
    let result = (|| {
        shared.pool.memory().write(page.addr, key)?;
        let mut t = CommandToken::new();
        hash_token::command(
            &mut t,
            algo.token_hash(),
            true,
            true,
            page.addr,
            key.len() as u32,
        );
        hash_token::set_total_length(&mut t, key.len() as u64);
        let _engine = shared.state.lock().unwrap();
        shared.timed_exchange(OpClass::Hash, key.len(), &mut t)
    })();
    shared.pool.free_page(page);
    let r = result?;
    let mut derived = [0u8; 128];
    hash_token::read_digest(&r, &mut derived[..algo.state_len()]);
    Ok((derived, algo.digest_len()))
}

/// Feed bytes to the session; with `is_final` the digest (or MAC) is
/// returned once the engine has consumed the trailing cache.
pub(crate) fn update(
    session: &HashSession,
    src: &[SgEntry],
    len: usize,
    is_final: bool,
) -> CipherResult<Option<Vec<u8>>> {
    let shared = session.shared.clone();
    let inner = session.inner.clone();

    let prior = {
        let mut s = inner.lock().unwrap();
        match s.state {
            HashState::Finalizing | HashState::Done => {
                return Err(CipherError::InvalidState("update after finalize"))
            }
            HashState::Idle | HashState::Accumulating => {}
        }
        if s.in_flight {
            return Err(CipherError::InvalidState("operation already in progress"));
        }
        if sg_total(src) < len {
            return Err(CipherError::InvalidParameter("scatter list shorter than length"));
        }
        let prior = s.state;
        s.in_flight = true;
        s.state = if is_final {
            HashState::Finalizing
        } else {
            HashState::Accumulating
        };
        prior
    };

    let class = if inner.lock().unwrap().algo.is_mac() {
        OpClass::Mac
    } else {
        OpClass::Hash
    };
    let mut plan = HashPlan::new(src, len, is_final);
    let (tx, rx) = mpsc::channel();
    let work_shared = shared.clone();
    let work_inner = inner.clone();
    let work = Box::new(move || -> CipherResult<StepOutcome> {
        let mut s = work_inner.lock().unwrap();
        let _engine = work_shared.state.lock().unwrap();
        step(&work_shared, &mut s, &mut plan)
    });
    let backlog_shared = shared.clone();
    shared.queue.submit(QueueEntry {
        work,
        complete: Box::new(move |r| {
            let _ = tx.send(r);
        }),
        backlog_notify: Some(Box::new(move || {
            backlog_shared.stats.backlogged(class);
        })),
    });

    let result = match rx.recv() {
        Ok(r) => r,
        Err(_) => Err(CipherError::InvalidState("engine stopped")),
    };

    let mut s = inner.lock().unwrap();
    s.in_flight = false;
    match result {
        Ok(()) => {
            if is_final {
                s.state = HashState::Done;
                Ok(Some(s.digest[..s.algo.digest_len()].to_vec()))
            } else {
                s.state = HashState::Accumulating;
                Ok(None)
            }
        }
        Err(e) => {
            // the session keeps its last-known state and may be retried
            s.state = prior;
            Err(e)
        }
    }
}

fn step(
    shared: &EngineShared,
    s: &mut HashInner,
    plan: &mut HashPlan,
) -> CipherResult<StepOutcome> {
    let mem = shared.pool.memory();
    let block = s.algo.block_len();
    let page = s.page.addr;
    let mut aligned = s.aligned;
    let mut cache_size = s.cache_size;
    let mut cache_offset = s.cache_offset;
    let desc = plan.next_chunk(
        mem,
        page,
        block,
        &mut aligned,
        &mut cache_size,
        &mut cache_offset,
    )?;
    // cache movement is a page-local effect, safe to keep even if the
    // exchange below fails
    s.aligned = aligned;
    let desc = match desc {
        Some(d) => d,
        None => {
            s.cache_size = cache_size;
            s.cache_offset = cache_offset;
            return Ok(StepOutcome::Complete);
        }
    };

    let state_len = s.algo.state_len();
    let mut t = CommandToken::new();
    if s.algo.is_mac() {
        mac_token::command(
            &mut t,
            s.algo.token_mac(),
            s.first,
            desc.is_final,
            desc.src,
            desc.len as u32,
        );
        mac_token::copy_state(&mut t, &s.digest[..state_len]);
        mac_token::copy_key(&mut t, &s.key[..s.key_len]);
        if desc.is_final {
            mac_token::set_total_length(&mut t, s.total_len + desc.len as u64);
        }
    } else {
        hash_token::command(
            &mut t,
            s.algo.token_hash(),
            s.first,
            desc.is_final,
            desc.src,
            desc.len as u32,
        );
        hash_token::copy_digest(&mut t, &s.digest[..state_len]);
        if desc.is_final {
            hash_token::set_total_length(&mut t, s.total_len + desc.len as u64);
        }
    }

    let class = if s.algo.is_mac() {
        OpClass::Mac
    } else {
        OpClass::Hash
    };
    let r = shared.timed_exchange(class, desc.len, &mut t)?;

    // state mutation only after the result is in
    hash_token::read_digest(&r, &mut s.digest[..state_len]);
    s.total_len += desc.len as u64;
    s.first = false;
    s.cache_size = cache_size;
    s.cache_offset = cache_offset;

    if desc.is_final || plan.exhausted() {
        Ok(StepOutcome::Complete)
    } else {
        Ok(StepOutcome::Continue)
    }
}

pub(crate) fn export(session: &HashSession) -> CipherResult<HashSnapshot> {
    let s = session.inner.lock().unwrap();
    let mut snap = HashSnapshot {
        state: s.digest,
        key: [0; 128],
        cache: [0; 128],
        cache_size: s.cache_size as u32,
        cache_offset: s.cache_offset as u32,
        total_len: s.total_len,
        key_len: s.key_len as u32,
        first: s.first as u8,
        aligned: s.aligned as u8,
        pad: [0; 2],
    };
    if s.algo.is_mac() {
        snap.key = s.key;
    }
    if s.cache_size > 0 {
        session.shared.pool.memory().read(
            s.page.addr + s.cache_offset as u64,
            &mut snap.cache[..s.cache_size],
        )?;
    }
    Ok(snap)
}

pub(crate) fn import(session: &HashSession, snap: &HashSnapshot) -> CipherResult<()> {
    let cache_size = snap.cache_size as usize;
    let cache_offset = snap.cache_offset as usize;
    let key_len = snap.key_len as usize;
    if cache_size > 128 || key_len > 128 || cache_offset + cache_size > PAGE_SIZE {
        return Err(CipherError::InvalidParameter("malformed snapshot"));
    }
    let mut s = session.inner.lock().unwrap();
    s.digest = snap.state;
    if s.algo.is_mac() {
        s.key = snap.key;
        s.key_len = key_len;
    }
    s.cache_size = cache_size;
    s.cache_offset = cache_offset;
    s.total_len = snap.total_len;
    s.first = snap.first != 0;
    s.aligned = snap.aligned != 0;
    s.state = if s.first && s.total_len == 0 && cache_size == 0 {
        HashState::Idle
    } else {
        HashState::Accumulating
    };
    if cache_size > 0 {
        session
            .shared
            .pool
            .memory()
            .write(s.page.addr + cache_offset as u64, &snap.cache[..cache_size])?;
    }
    Ok(())
}
