// Licensed under the Apache-2.0 license

use std::time::Duration;

/// Tunables for a [`crate::CryptoEngine`].
#[derive(Debug, Clone)]
pub struct CeConfig {
    /// Which of the engine's physical mailboxes to occupy (1-based).
    /// Exactly one is ever used by this driver.
    pub mailbox: u8,
    /// How long `exchange` waits for a result token before reporting
    /// [`crate::CipherError::Timeout`].
    pub timeout: Duration,
    /// Request-queue depth; submissions beyond this are admitted as
    /// backlog and notified before being serviced.
    pub queue_depth: usize,
}

impl Default for CeConfig {
    fn default() -> Self {
        CeConfig {
            mailbox: 2,
            timeout: Duration::from_millis(3000),
            queue_depth: 100,
        }
    }
}
