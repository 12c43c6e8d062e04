// Licensed under the Apache-2.0 license

//! Splits logical byte ranges over scattered buffers into hardware-legal
//! DMA chunks.
//!
//! A segment pair that is word-aligned, block-multiple and equal-length is
//! handed to the engine directly. Anything else is assembled in a 4 KiB
//! bounce page, with up to one block of unconsumed bytes cached at the
//! front of the page between calls for streaming hash/MAC. CTR chunks are
//! additionally bounded so the 32-bit counter embedded in the IV never
//! wraps inside a chunk; the wrap is expressed as an explicit pair of
//! sub-chunks with a software carry between them.

use crate::dma::{sg_copy_from_buffer, sg_copy_to_buffer, DeviceMemory, SgEntry, PAGE_SIZE};
use crate::error::{CipherError, CipherResult};

/// One hardware exchange worth of data movement.
#[derive(Debug, Clone)]
pub(crate) struct ChunkDescriptor {
    /// Device-visible source address.
    pub src: u64,
    /// Device-visible destination address; absent for hash/MAC.
    pub dst: Option<u64>,
    /// Length handed to the engine; a multiple of the block alignment
    /// except for a finalizing chunk.
    pub len: usize,
    /// Caller bytes consumed by this chunk (before block rounding).
    pub payload: usize,
    /// Whether the bounce page holds the data.
    pub bounced: bool,
    /// Ciphertext block stashed ahead of an in-place CBC decrypt; it
    /// becomes the next IV after the chunk completes.
    pub next_iv: Option<[u8; 16]>,
    /// Hash/MAC: this chunk carries the finalize flag.
    pub is_final: bool,
}

/// What the planner hands the session for one dispatch step.
#[derive(Debug, Clone)]
pub(crate) enum Chunk {
    Single(ChunkDescriptor),
    /// A CTR chunk split at the counter wrap boundary. `carry_blocks` is
    /// added big-endian to the full IV once `first` has completed.
    SplitCtr {
        first: ChunkDescriptor,
        second: ChunkDescriptor,
        carry_blocks: u32,
    },
}

fn seg_aligned(seg: &SgEntry, align: usize) -> bool {
    seg.addr % 4 == 0 && seg.len % align == 0
}

/// Walk state for one cipher request.
pub(crate) struct CipherPlan {
    src: Vec<SgEntry>,
    dst: Vec<SgEntry>,
    total: usize,
    left: usize,
    seg: usize,
    aligned: bool,
    align: usize,
    stash_next_iv: bool,
}

impl CipherPlan {
    /// `aligned_total` is false when the overall length is not a block
    /// multiple (legal for CTR only); that forces the bounce path from the
    /// first chunk.
    pub fn new(
        src: &[SgEntry],
        dst: &[SgEntry],
        total: usize,
        align: usize,
        aligned_total: bool,
        stash_next_iv: bool,
    ) -> Self {
        CipherPlan {
            src: src.to_vec(),
            dst: dst.to_vec(),
            total,
            left: total,
            seg: 0,
            aligned: aligned_total,
            align,
            stash_next_iv,
        }
    }

    pub fn consumed(&self) -> usize {
        self.total - self.left
    }

    pub fn is_done(&self) -> bool {
        self.left == 0
    }

    /// Produce the next chunk, copying into the bounce page when the
    /// current segments cannot be used directly.
    pub fn next_chunk(
        &mut self,
        mem: &dyn DeviceMemory,
        bounce: u64,
    ) -> CipherResult<Option<ChunkDescriptor>> {
        if self.left == 0 {
            return Ok(None);
        }

        let (count, src_addr, dst_addr, hw_len, bounced) = if self.aligned {
            let (src_seg, dst_seg) = match (self.src.get(self.seg), self.dst.get(self.seg)) {
                (Some(s), Some(d)) => (*s, *d),
                _ => return Err(CipherError::InvalidParameter("scatter list too short")),
            };
            let direct = seg_aligned(&src_seg, self.align)
                && seg_aligned(&dst_seg, self.align)
                && src_seg.len == dst_seg.len;
            if direct {
                let count = self.left.min(src_seg.len);
                self.seg += 1;
                (count, src_seg.addr, dst_seg.addr, count, false)
            } else {
                self.aligned = false;
                return self.next_chunk(mem, bounce);
            }
        } else {
            let count = self.left.min(PAGE_SIZE);
            let mut buf = vec![0u8; count];
            sg_copy_to_buffer(mem, &self.src, self.consumed(), &mut buf)?;
            mem.write(bounce, &buf)?;
            let hw_len = count.div_ceil(self.align) * self.align;
            (count, bounce, bounce, hw_len, true)
        };

        let next_iv = if self.stash_next_iv {
            let mut iv = [0u8; 16];
            sg_copy_to_buffer(mem, &self.src, self.consumed() + count - iv.len(), &mut iv)?;
            Some(iv)
        } else {
            None
        };

        self.left -= count;
        Ok(Some(ChunkDescriptor {
            src: src_addr,
            dst: Some(dst_addr),
            len: hw_len,
            payload: count,
            bounced,
            next_iv,
            is_final: false,
        }))
    }

    /// Scatter a bounced chunk's output from the page back into the
    /// destination list. `payload` is the chunk's caller-byte count; the
    /// chunk has already been consumed from `left`.
    pub fn write_back(
        &self,
        mem: &dyn DeviceMemory,
        bounce: u64,
        payload: usize,
    ) -> CipherResult<()> {
        let mut buf = vec![0u8; payload];
        mem.read(bounce, &mut buf)?;
        sg_copy_from_buffer(mem, &self.dst, self.consumed() - payload, &buf)
    }
}

/// Walk state for one hash/MAC update.
pub(crate) struct HashPlan {
    src: Vec<SgEntry>,
    total: usize,
    left: usize,
    seg: usize,
    finalize: bool,
    final_emitted: bool,
}

impl HashPlan {
    pub fn new(src: &[SgEntry], total: usize, finalize: bool) -> Self {
        HashPlan {
            src: src.to_vec(),
            total,
            left: total,
            seg: 0,
            finalize,
            final_emitted: false,
        }
    }

    fn consumed(&self) -> usize {
        self.total - self.left
    }

    /// All caller bytes have been read; a trailing cache flush may still
    /// be pending if the update is a finalize.
    pub fn exhausted(&self) -> bool {
        self.left == 0
    }

    /// Produce the next chunk. The cache fields live in the session (they
    /// persist across updates); the cached bytes themselves sit in the
    /// bounce page at `cache_offset`.
    #[allow(clippy::too_many_arguments)]
    pub fn next_chunk(
        &mut self,
        mem: &dyn DeviceMemory,
        bounce: u64,
        block: usize,
        aligned: &mut bool,
        cache_size: &mut usize,
        cache_offset: &mut usize,
    ) -> CipherResult<Option<ChunkDescriptor>> {
        if self.left == 0 {
            // A finalize with nothing left to read still issues exactly one
            // chunk: the cache remainder, or an empty final block.
            if !self.finalize || self.final_emitted {
                return Ok(None);
            }
            if *cache_size == 0 {
                self.final_emitted = true;
                return Ok(Some(ChunkDescriptor {
                    src: 0,
                    dst: None,
                    len: 0,
                    payload: 0,
                    bounced: false,
                    next_iv: None,
                    is_final: true,
                }));
            }
            return self.bounce_chunk(mem, bounce, block, cache_size, cache_offset);
        }

        if *aligned {
            let seg = match self.src.get(self.seg) {
                Some(s) => *s,
                None => return Err(CipherError::InvalidParameter("scatter list too short")),
            };
            if seg_aligned(&seg, block) {
                let count = self.left.min(seg.len);
                self.seg += 1;
                self.left -= count;
                let is_final = self.finalize && self.left == 0;
                self.final_emitted |= is_final;
                return Ok(Some(ChunkDescriptor {
                    src: seg.addr,
                    dst: None,
                    len: count,
                    payload: count,
                    bounced: false,
                    next_iv: None,
                    is_final,
                }));
            }
            *aligned = false;
        }

        self.bounce_chunk(mem, bounce, block, cache_size, cache_offset)
    }

    fn bounce_chunk(
        &mut self,
        mem: &dyn DeviceMemory,
        bounce: u64,
        block: usize,
        cache_size: &mut usize,
        cache_offset: &mut usize,
    ) -> CipherResult<Option<ChunkDescriptor>> {
        // Slide the cached partial block to the front of the page.
        if *cache_size > 0 && *cache_offset > 0 {
            let mut cached = vec![0u8; *cache_size];
            mem.read(bounce + *cache_offset as u64, &mut cached)?;
            mem.write(bounce, &cached)?;
            *cache_offset = 0;
        }

        let room = PAGE_SIZE - *cache_size;
        let count = self.left.min(room);
        if count > 0 {
            let mut buf = vec![0u8; count];
            sg_copy_to_buffer(mem, &self.src, self.consumed(), &mut buf)?;
            mem.write(bounce + *cache_size as u64, &buf)?;
        }
        self.left -= count;

        let gathered = count + *cache_size;
        let hw_len;
        if self.finalize && self.left == 0 {
            hw_len = gathered;
            *cache_size = 0;
            *cache_offset = 0;
        } else {
            hw_len = gathered / block * block;
            *cache_size = gathered - hw_len;
            *cache_offset = if *cache_size > 0 { hw_len } else { 0 };
        }

        if hw_len == 0 {
            // Everything went into the cache; nothing for the engine yet.
            return Ok(None);
        }

        let is_final = self.finalize && self.left == 0 && *cache_size == 0;
        self.final_emitted |= is_final;
        Ok(Some(ChunkDescriptor {
            src: bounce,
            dst: None,
            len: hw_len,
            payload: count,
            bounced: true,
            next_iv: None,
            is_final,
        }))
    }
}

/// Big-endian counter in the last four IV bytes.
pub(crate) fn ctr_counter(iv: &[u8; 16]) -> u32 {
    u32::from_be_bytes([iv[12], iv[13], iv[14], iv[15]])
}

/// Add `blocks` to the IV as one big-endian 128-bit number, rippling the
/// carry through the bytes above the counter field.
pub(crate) fn iv_add_blocks(iv: &mut [u8; 16], blocks: u32) {
    let mut value = blocks as u64;
    for byte in iv.iter_mut().rev() {
        value += *byte as u64;
        *byte = value as u8;
        value >>= 8;
        if value == 0 {
            break;
        }
    }
}

/// Bound a CTR chunk so the counter never wraps mid-chunk.
///
/// The blocks whose counter values sit below the 32-bit ceiling form the
/// first sub-chunk; the ceiling block and everything after it run as the
/// second sub-chunk once the carry has been folded into the IV. A counter
/// already at the ceiling takes a single block and carries immediately.
pub(crate) fn plan_ctr(chunk: ChunkDescriptor, iv: &[u8; 16], block: usize) -> Chunk {
    let nblocks = chunk.len.div_ceil(block);
    let counter = ctr_counter(iv);
    let avail = (u32::MAX - counter) as usize;
    let first_blocks = if avail == 0 { 1 } else { avail };
    if nblocks <= first_blocks {
        return Chunk::Single(chunk);
    }

    let split = first_blocks * block;
    let first = ChunkDescriptor {
        len: split,
        payload: split,
        ..chunk.clone()
    };
    let second = ChunkDescriptor {
        src: chunk.src + split as u64,
        dst: chunk.dst.map(|d| d + split as u64),
        len: chunk.len - split,
        payload: chunk.payload - split,
        ..chunk
    };
    Chunk::SplitCtr {
        first,
        second,
        carry_blocks: first_blocks as u32,
    }
}
