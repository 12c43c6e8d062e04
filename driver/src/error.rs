// Licensed under the Apache-2.0 license

use thiserror::Error;

/// Driver error taxonomy.
///
/// `InvalidParameter` and `InvalidState` are detected synchronously, before
/// a request ever reaches the queue. `Timeout` and `HardwareFault` surface
/// from the dispatch loop to the request they belong to and never touch
/// sibling requests. Nothing here is retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("timed out waiting for a result token")]
    Timeout,

    /// The engine reported a failure in the result token. The raw status
    /// word is preserved for diagnostics: bit 31 is the failure flag, bits
    /// 16..24 the firmware error code (see [`fw_code`]), and the low 16
    /// bits still echo the token id.
    #[error("engine reported failure, status {status:#010x}")]
    HardwareFault { status: u32 },

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),
}

pub type CipherResult<T> = Result<T, CipherError>;

/// Firmware error codes found in bits 16..24 of a failed result token.
pub mod fw_code {
    pub const INVALID_TOKEN: u32 = 0x01;
    pub const INVALID_PARAMETER: u32 = 0x02;
    pub const INVALID_KEY_SIZE: u32 = 0x03;
    pub const INVALID_LENGTH: u32 = 0x04;
    pub const INVALID_LOCATION: u32 = 0x05;
    pub const ACCESS_ERROR: u32 = 0x07;
    pub const INVALID_ASSET: u32 = 0x0B;
    pub const INVALID_ADDRESS: u32 = 0x0D;
    pub const INVALID_MODULUS: u32 = 0x0E;
    pub const VERIFY_ERROR: u32 = 0x0F;
    pub const INVALID_STATE: u32 = 0x10;
    pub const PANIC: u32 = 0x14;
    pub const INVALID_ALGORITHM: u32 = 0x1A;
    pub const INVALID_MODE: u32 = 0x1B;
}
