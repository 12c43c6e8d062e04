// Licensed under the Apache-2.0 license

//! The single-mailbox token exchange.
//!
//! One channel owns one physical mailbox. A command token is written into
//! the mailbox window and submitted with a control bit; the interrupt
//! handler copies the result token out, bumps the completion counter and
//! wakes the waiter. `exchange` is the only consumer of completions and the
//! interrupt handler the only producer, so each call is a single-producer/
//! single-consumer rendezvous.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use eip130_token::{CommandToken, ResultToken, CRYPTO_OFFICER_ID, TOKEN_WORDS};
use log::warn;

use crate::error::{CipherError, CipherResult};
use crate::mmio::{regs, DeviceMmio};

struct Slot {
    /// Completions reported by the interrupt handler and not yet consumed.
    events: u32,
    /// Result token copied out of the mailbox by the interrupt handler.
    result: [u32; TOKEN_WORDS],
}

pub struct MailboxChannel {
    mmio: Arc<dyn DeviceMmio>,
    mailbox_nr: u8,
    timeout: Duration,
    slot: Mutex<Slot>,
    result_ready: Condvar,
    next_token_id: AtomicU16,
}

impl MailboxChannel {
    pub fn new(mmio: Arc<dyn DeviceMmio>, mailbox_nr: u8, timeout: Duration) -> Self {
        MailboxChannel {
            mmio,
            mailbox_nr,
            timeout,
            slot: Mutex::new(Slot {
                events: 0,
                result: [0; TOKEN_WORDS],
            }),
            result_ready: Condvar::new(),
            next_token_id: AtomicU16::new(1),
        }
    }

    pub fn mailbox_nr(&self) -> u8 {
        self.mailbox_nr
    }

    fn write_ctrl(&self, value: u32) {
        self.mmio
            .write_reg(regs::MAILBOX_CTRL, regs::mailbox_bit(self.mailbox_nr, value));
    }

    /// Link the mailbox to this host and verify the link took.
    pub fn link(&self) -> CipherResult<()> {
        let bit = regs::mailbox_bit(self.mailbox_nr, 4);
        self.mmio.write_reg(regs::MAILBOX_CTRL, bit);
        let stat = self.mmio.read_reg(regs::MAILBOX_STAT);
        if stat & bit != bit {
            return Err(CipherError::HardwareFault { status: stat });
        }
        Ok(())
    }

    /// Unlink the mailbox; the status linked bit must clear.
    pub fn unlink(&self) -> CipherResult<()> {
        let bit = regs::mailbox_bit(self.mailbox_nr, 8);
        self.mmio.write_reg(regs::MAILBOX_CTRL, bit);
        let stat = self.mmio.read_reg(regs::MAILBOX_STAT);
        if stat & (bit >> 1) != 0 {
            return Err(CipherError::HardwareFault { status: stat });
        }
        Ok(())
    }

    /// The IN-full status bit must be clear before a token can be written.
    pub fn can_write_token(&self) -> bool {
        let bit = regs::mailbox_bit(self.mailbox_nr, 1);
        self.mmio.read_reg(regs::MAILBOX_STAT) & bit == 0
    }

    /// The OUT-full status bit announces a readable result.
    pub fn can_read_token(&self) -> bool {
        let bit = regs::mailbox_bit(self.mailbox_nr, 2);
        self.mmio.read_reg(regs::MAILBOX_STAT) & bit != 0
    }

    /// Allow (0) or deny token submission from lower-privilege hosts.
    pub fn write_lockout(&self, value: u32) {
        self.mmio.write_reg(regs::MAILBOX_LOCKOUT, value);
    }

    /// Program the interrupt controller for level-high token-done lines.
    pub fn aic_init(&self) {
        self.mmio
            .write_reg(regs::AIC_POL_CTRL, regs::AIC_POL_HIGH_LEVEL);
        self.mmio.write_reg(regs::AIC_TYPE_CTRL, regs::AIC_TYPE_LEVEL);
        self.mmio
            .write_reg(regs::AIC_ENABLE_CTRL, regs::AIC_TOKEN_DONE_ENABLES);
    }

    pub fn aic_disable(&self) {
        self.mmio.write_reg(regs::AIC_ENABLE_CTRL, 0);
    }

    /// Copy a command token into the mailbox window and raise the submit bit.
    pub fn write_and_submit(&self, token: &CommandToken) {
        let base = regs::mailbox_base(self.mailbox_nr);
        for (i, &w) in token.words.iter().enumerate() {
            self.mmio.write_reg(base + (i * 4) as u32, w);
        }
        self.write_ctrl(1);
    }

    fn read_result_words(&self) -> [u32; TOKEN_WORDS] {
        let base = regs::mailbox_base(self.mailbox_nr);
        let mut words = [0u32; TOKEN_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = self.mmio.read_reg(base + (i * 4) as u32);
        }
        // hand the OUT slot back to the engine
        self.write_ctrl(2);
        words
    }

    /// IRQ entry point: scan the token-done lines, acknowledge them, and
    /// for our mailbox copy the result out and wake the waiter. Called by
    /// the platform's interrupt dispatch.
    pub fn handle_interrupt(&self) {
        let raw = self.mmio.read_reg(regs::AIC_RAW_STAT);
        for i in 0..regs::MAILBOX_COUNT {
            let bit = 1u32 << (i * 2 + 1);
            if raw & bit == 0 {
                continue;
            }
            self.mmio.write_reg(regs::AIC_ACK, bit);
            if i + 1 != self.mailbox_nr as usize {
                continue;
            }
            if !self.can_read_token() {
                continue;
            }
            let words = self.read_result_words();
            let mut slot = self.slot.lock().unwrap();
            slot.result = words;
            slot.events += 1;
            self.result_ready.notify_all();
        }
    }

    /// Submit `token` and wait for its matching result.
    ///
    /// Word 1 gets the crypto-officer identity (except for the provisioning
    /// token) and word 0 a fresh nonzero token id. A result whose id does
    /// not match is a stale delivery from a mailbox-reuse edge; it is
    /// dropped and the wait re-armed. Only one token is ever in flight, so
    /// the loop is defensive, not a reordering protocol.
    pub fn exchange(&self, token: &mut CommandToken) -> CipherResult<ResultToken> {
        if !token.is_provision_huk() {
            token.set_identity(CRYPTO_OFFICER_ID);
        }
        let id = self.take_token_id();
        token.set_token_id(id, true);

        self.write_and_submit(token);

        let result = loop {
            let mut slot = self.slot.lock().unwrap();
            while slot.events == 0 {
                let (guard, wait) = self
                    .result_ready
                    .wait_timeout(slot, self.timeout)
                    .unwrap();
                slot = guard;
                if wait.timed_out() && slot.events == 0 {
                    warn!("eip130: mailbox {} exchange timeout", self.mailbox_nr);
                    return Err(CipherError::Timeout);
                }
            }
            slot.events -= 1;
            let result = ResultToken { words: slot.result };
            drop(slot);
            if result.token_id() == id {
                break result;
            }
        };

        if result.is_error() {
            warn!(
                "eip130: result token error, word0 {:#010x}",
                result.status()
            );
            return Err(CipherError::HardwareFault {
                status: result.status(),
            });
        }
        Ok(result)
    }

    fn take_token_id(&self) -> u16 {
        loop {
            let id = self.next_token_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}
