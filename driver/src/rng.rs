// Licensed under the Apache-2.0 license

//! True-random-number generation.
//!
//! The noise source is configured once, lazily, before the first request;
//! random bytes are fetched a scratch page at a time. Runs in the caller's
//! context under the engine mutex rather than through the queue, matching
//! the synchronous RNG interface.

use std::sync::Arc;

use eip130_token::{trng, CommandToken};

use crate::dma::PAGE_SIZE;
use crate::engine::EngineShared;
use crate::error::CipherResult;
use crate::stats::OpClass;

/// Default noise-source tuning: eight noise blocks, undivided sample
/// clock, one sample cycle, manual seeding, post-processor reseed.
const AUTO_SEED: u8 = 0;
const SAMPLE_CYCLES: u16 = 1;
const SAMPLE_DIV: u8 = 0;
const NOISE_BLOCKS: u8 = 8;

pub(crate) fn random(shared: &Arc<EngineShared>, dst: &mut [u8]) -> CipherResult<()> {
    if dst.is_empty() {
        return Ok(());
    }
    let page = shared.pool.alloc_page()?;
    let result = (|| {
        let mut guard = shared.state.lock().unwrap();
        if !guard.trng_configured {
            let mut t = CommandToken::new();
            trng::configure(&mut t, AUTO_SEED, SAMPLE_CYCLES, SAMPLE_DIV, NOISE_BLOCKS, true);
            shared.timed_exchange(OpClass::Rng, 0, &mut t)?;
            guard.trng_configured = true;
        }
        for out in dst.chunks_mut(PAGE_SIZE) {
            let mut t = CommandToken::new();
            trng::random_number(&mut t, out.len() as u16, page.addr);
            shared.timed_exchange(OpClass::Rng, out.len(), &mut t)?;
            shared.pool.memory().read(page.addr, out)?;
        }
        Ok(())
    })();
    shared.pool.free_page(page);
    result
}
