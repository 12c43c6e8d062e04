// Licensed under the Apache-2.0 license

use std::sync::{Arc, Mutex};

use eip130_driver::{CipherError, CipherResult, DeviceMemory};

/// Flat DMA-visible RAM shared between the host driver and the emulated
/// engine; device addresses map directly onto the backing vector.
pub struct EmulatedDmaRam {
    bytes: Mutex<Vec<u8>>,
}

impl EmulatedDmaRam {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(EmulatedDmaRam {
            bytes: Mutex::new(vec![0; size]),
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }
}

impl DeviceMemory for EmulatedDmaRam {
    fn read(&self, addr: u64, buf: &mut [u8]) -> CipherResult<()> {
        let bytes = self.bytes.lock().unwrap();
        let start = addr as usize;
        let end = start
            .checked_add(buf.len())
            .ok_or(CipherError::InvalidParameter("dma address overflow"))?;
        if end > bytes.len() {
            return Err(CipherError::InvalidParameter("dma read out of range"));
        }
        buf.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn write(&self, addr: u64, data: &[u8]) -> CipherResult<()> {
        let mut bytes = self.bytes.lock().unwrap();
        let start = addr as usize;
        let end = start
            .checked_add(data.len())
            .ok_or(CipherError::InvalidParameter("dma address overflow"))?;
        if end > bytes.len() {
            return Err(CipherError::InvalidParameter("dma write out of range"));
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }
}
