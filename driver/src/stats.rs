// Licensed under the Apache-2.0 license

//! Observational per-chunk statistics seam.
//!
//! A [`StatsSink`] receives start/end/error events for every hardware
//! chunk, plus backlog admissions. It never affects control flow; the
//! default sink discards everything.

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Cipher,
    Hash,
    Mac,
    Rng,
    Pk,
}

pub trait StatsSink: Send + Sync {
    fn chunk_start(&self, _class: OpClass) {}
    fn chunk_end(&self, _class: OpClass, _bytes: usize, _elapsed: Duration) {}
    fn chunk_error(&self, _class: OpClass) {}
    fn backlogged(&self, _class: OpClass) {}
}

impl<T: StatsSink + ?Sized> StatsSink for Arc<T> {
    fn chunk_start(&self, class: OpClass) {
        (**self).chunk_start(class)
    }
    fn chunk_end(&self, class: OpClass, bytes: usize, elapsed: Duration) {
        (**self).chunk_end(class, bytes, elapsed)
    }
    fn chunk_error(&self, class: OpClass) {
        (**self).chunk_error(class)
    }
    fn backlogged(&self, class: OpClass) {
        (**self).backlogged(class)
    }
}

/// Discards all samples.
pub struct NullStats;

impl StatsSink for NullStats {}
