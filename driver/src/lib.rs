// Licensed under the Apache-2.0 license

//! Host driver for an EIP-130 class security co-processor.
//!
//! The engine is driven through a single mailbox: a 64-word command token is
//! written to the mailbox IN region, a control bit submits it, and an
//! interrupt announces the matching result token. This crate provides:
//!
//! - [`MailboxChannel`], the one-token-in-flight exchange protocol with
//!   timeout and interrupt-driven completion;
//! - a bounded request queue and dispatcher thread serializing concurrent
//!   callers onto the channel;
//! - the chunk planner that splits scattered or misaligned caller buffers
//!   into hardware-legal DMA chunks via a bounce page;
//! - per-operation sessions (block cipher, hash/MAC, public-key modexp,
//!   random numbers) exposed through the [`CryptoEngine`] facade.
//!
//! Hardware access goes through two narrow seams, [`DeviceMmio`] for the
//! register block and [`DeviceMemory`] for DMA-visible memory, so the core
//! can run against real silicon or the emulated engine used in tests.

mod channel;
mod cipher;
mod config;
mod dma;
mod engine;
mod error;
mod hash;
mod mmio;
mod pk;
mod planner;
mod queue;
mod rng;
mod stats;

pub use channel::MailboxChannel;
pub use cipher::{CipherAlgo, CipherMode, CipherSession};
pub use config::CeConfig;
pub use dma::{
    sg_copy_from_buffer, sg_copy_to_buffer, sg_total, DeviceMemory, DmaPage, DmaPool, SgEntry,
    PAGE_SIZE,
};
pub use engine::CryptoEngine;
pub use error::{fw_code, CipherError, CipherResult};
pub use hash::{HashAlgo, HashSession, HashSnapshot};
pub use mmio::{regs, DeviceMmio};
pub use pk::PkDirection;
pub use stats::{NullStats, OpClass, StatsSink};
