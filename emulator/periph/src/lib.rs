// Licensed under the Apache-2.0 license

//! Software model of an EIP-130 security co-processor.
//!
//! Implements the register block, the mailbox token handshake, and enough
//! of the engine's algorithm behavior (AES, the SHA-2 family, HMAC, TRNG,
//! modular exponentiation, a minimal asset store) for the host driver to
//! run end-to-end without silicon. Register protocol violations by the
//! host model panic; operational errors are reported the way the firmware
//! reports them, as error result tokens.

mod aes;
mod bignum;
mod eip130;
mod mem;
mod sha;

pub use eip130::{Eip130Periph, FaultInjection};
pub use mem::EmulatedDmaRam;
