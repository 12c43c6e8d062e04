// Licensed under the Apache-2.0 license

//! RSA modular exponentiation through the shared PK compute unit.
//!
//! The unit is claimed sized to the modulus, operands are loaded by slot,
//! the exponentiation runs, and the unit is released with a zero-size
//! claim. Claim and release are paired on every path, including failures,
//! so the unit can never leak to a later session; the whole sequence runs
//! under the engine mutex as one queue step.

use std::sync::{mpsc, Arc};

use eip130_token::{pk, CommandToken};
use zeroize::Zeroize;

use crate::engine::EngineShared;
use crate::error::{CipherError, CipherResult};
use crate::queue::{QueueEntry, StepOutcome};
use crate::stats::OpClass;

/// Which exponent drives the operation: the public exponent (encrypt or
/// verify) or the private one (decrypt or sign).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkDirection {
    EncryptVerify,
    DecryptSign,
}

/// Modulus sizes the engine accepts, in bytes.
const MODULUS_SIZES: [usize; 3] = [128, 256, 384];

pub(crate) fn modexp(
    shared: &Arc<EngineShared>,
    direction: PkDirection,
    modulus: &[u8],
    exponent: &[u8],
    input: &[u8],
) -> CipherResult<Vec<u8>> {
    let n_len = modulus.len();
    if !MODULUS_SIZES.contains(&n_len) {
        return Err(CipherError::InvalidParameter("modulus length"));
    }
    if input.len() > n_len {
        return Err(CipherError::InvalidParameter("input longer than modulus"));
    }
    match direction {
        PkDirection::EncryptVerify => {
            if exponent.is_empty() || exponent.len() > 4 {
                return Err(CipherError::InvalidParameter("public exponent length"));
            }
        }
        PkDirection::DecryptSign => {
            if exponent.is_empty() || exponent.len() > n_len {
                return Err(CipherError::InvalidParameter("private exponent length"));
            }
        }
    }

    let modulus = modulus.to_vec();
    let mut exponent = exponent.to_vec();
    let input = input.to_vec();
    let (tx, rx) = mpsc::channel();
    let work_shared = shared.clone();
    let output: Arc<std::sync::Mutex<Vec<u8>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let work_output = output.clone();
    let work = Box::new(move || -> CipherResult<StepOutcome> {
        let _engine = work_shared.state.lock().unwrap();
        let out = run_modexp(&work_shared, direction, &modulus, &exponent, &input);
        exponent.zeroize();
        *work_output.lock().unwrap() = out?;
        Ok(StepOutcome::Complete)
    });
    let backlog_shared = shared.clone();
    shared.queue.submit(QueueEntry {
        work,
        complete: Box::new(move |r| {
            let _ = tx.send(r);
        }),
        backlog_notify: Some(Box::new(move || {
            backlog_shared.stats.backlogged(OpClass::Pk);
        })),
    });
    match rx.recv() {
        Ok(Ok(())) => Ok(std::mem::take(&mut *output.lock().unwrap())),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(CipherError::InvalidState("engine stopped")),
    }
}

/// Stage operands little-endian in a scratch page, then run the
/// claim/load/operate/release sequence.
fn run_modexp(
    shared: &EngineShared,
    direction: PkDirection,
    modulus: &[u8],
    exponent: &[u8],
    input: &[u8],
) -> CipherResult<Vec<u8>> {
    let n_len = modulus.len();
    let page = shared.pool.alloc_page()?;
    let result = (|| {
        let mem = shared.pool.memory();
        // page layout: modulus | private exponent | input/output, each a
        // reversed (little-endian) n_len-sized operand
        let mut operand = vec![0u8; n_len];
        operand.copy_from_slice(modulus);
        operand.reverse();
        mem.write(page.addr, &operand)?;

        let d_addr = page.addr + n_len as u64;
        if direction == PkDirection::DecryptSign {
            operand.fill(0);
            operand[n_len - exponent.len()..].copy_from_slice(exponent);
            operand.reverse();
            mem.write(d_addr, &operand)?;
        }

        let io_addr = page.addr + 2 * n_len as u64;
        operand.fill(0);
        operand[n_len - input.len()..].copy_from_slice(input);
        operand.reverse();
        mem.write(io_addr, &operand)?;
        operand.zeroize();

        claim(shared, n_len)?;
        let op_result = (|| {
            load(shared, 0, page.addr, n_len)?;
            if direction == PkDirection::DecryptSign {
                load(shared, 1, d_addr, n_len)?;
            }
            let (op, pub_exp) = match direction {
                PkDirection::EncryptVerify => {
                    let mut e = [0u8; 4];
                    e[4 - exponent.len()..].copy_from_slice(exponent);
                    (pk::PkOperation::ModExpE, u32::from_be_bytes(e))
                }
                PkDirection::DecryptSign => (pk::PkOperation::ModExpD, 0),
            };
            let mut t = CommandToken::new();
            pk::operation(
                &mut t,
                op,
                pub_exp,
                io_addr,
                n_len as u32,
                io_addr,
                n_len as u32 + 4,
            );
            shared.timed_exchange(OpClass::Pk, n_len, &mut t)?;
            Ok(())
        })();
        // release even when a load or the operation failed
        let release_result = claim(shared, 0);
        op_result?;
        release_result?;

        let mut out = vec![0u8; n_len];
        mem.read(io_addr, &mut out)?;
        out.reverse();
        Ok(out)
    })();
    shared.pool.free_page(page);
    result
}

fn claim(shared: &EngineShared, n_len: usize) -> CipherResult<()> {
    let mut t = CommandToken::new();
    pk::claim(&mut t, (n_len / 4) as u8, 0, 0);
    shared.timed_exchange(OpClass::Pk, 0, &mut t)?;
    Ok(())
}

fn load(shared: &EngineShared, index: u8, addr: u64, len: usize) -> CipherResult<()> {
    let mut t = CommandToken::new();
    pk::num_load(&mut t, index, addr, len as u32);
    shared.timed_exchange(OpClass::Pk, len, &mut t)?;
    Ok(())
}
