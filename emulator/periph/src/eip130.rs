// Licensed under the Apache-2.0 license

//! Register block and token execution for the emulated engine.
//!
//! Tokens execute synchronously on the submitting thread: writing the
//! submit control bit runs the token, places the result in the mailbox
//! window, raises the token-done line and invokes the registered
//! interrupt callback, so the host driver sees the same handshake it
//! would get from silicon.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use eip130_driver::{regs, DeviceMemory, DeviceMmio};
use eip130_driver::fw_code;
use log::trace;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::aes::Aes;
use crate::bignum::modexp_le;
use crate::sha::{self, ShaVariant};

const WORDS: usize = 64;

/// Make the next matching token fail with the given firmware error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultInjection {
    /// Fail whatever token arrives next.
    NextToken,
    /// Fail the next PK operand-load token.
    PkNumLoad,
    /// Swallow the next token: no result, no interrupt. The host sees a
    /// timeout.
    DropNextResult,
}

struct RegState {
    windows: [[u32; WORDS]; regs::MAILBOX_COUNT],
    stat: u32,
    lockout: u32,
    module_status: u32,
    aic_pol: u32,
    aic_type: u32,
    aic_enable: u32,
    aic_raw: u32,
}

struct Asset {
    len: usize,
    policy: u64,
    data: Vec<u8>,
}

#[derive(Default)]
struct PkUnit {
    claimed: bool,
    nwords: usize,
    slots: HashMap<u8, Vec<u8>>,
}

struct EngineModel {
    assets: HashMap<u32, Asset>,
    next_asset: u32,
    pk: PkUnit,
    pk_claims: u64,
    pk_releases: u64,
    trng_configured: bool,
    rng: StdRng,
    fault: Option<(FaultInjection, u32)>,
}

pub struct Eip130Periph {
    mem: Arc<dyn DeviceMemory>,
    regs: Mutex<RegState>,
    model: Mutex<EngineModel>,
    irq: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl Eip130Periph {
    pub fn new(mem: Arc<dyn DeviceMemory>) -> Arc<Self> {
        Arc::new(Eip130Periph {
            mem,
            regs: Mutex::new(RegState {
                windows: [[0; WORDS]; regs::MAILBOX_COUNT],
                stat: 0,
                lockout: 0,
                module_status: regs::CRC24_OK
                    | regs::FIRMWARE_WRITTEN
                    | regs::FIRMWARE_CHECKS_DONE
                    | regs::FIRMWARE_ACCEPTED,
                aic_pol: 0,
                aic_type: 0,
                aic_enable: 0,
                aic_raw: 0,
            }),
            model: Mutex::new(EngineModel {
                assets: HashMap::new(),
                next_asset: 0x5001,
                pk: PkUnit::default(),
                pk_claims: 0,
                pk_releases: 0,
                trng_configured: false,
                rng: StdRng::seed_from_u64(0x1e0_130),
                fault: None,
            }),
            irq: Mutex::new(None),
        })
    }

    /// Wire the token-done line to the host's interrupt dispatch.
    pub fn set_irq_handler(&self, handler: Box<dyn Fn() + Send + Sync>) {
        *self.irq.lock().unwrap() = Some(handler);
    }

    pub fn inject_fault(&self, which: FaultInjection, code: u32) {
        self.model.lock().unwrap().fault = Some((which, code));
    }

    /// (claims, releases) of the PK unit so far.
    pub fn pk_counters(&self) -> (u64, u64) {
        let model = self.model.lock().unwrap();
        (model.pk_claims, model.pk_releases)
    }

    /// Bytes currently loaded into an asset, if it exists.
    pub fn asset_data(&self, id: u32) -> Option<Vec<u8>> {
        self.model
            .lock()
            .unwrap()
            .assets
            .get(&id)
            .map(|a| a.data.clone())
    }

    fn execute(&self, mailbox: usize) {
        let cmd = self.regs.lock().unwrap().windows[mailbox];
        trace!("eip130 model: token {:#010x} on mailbox {}", cmd[0], mailbox + 1);
        {
            let mut model = self.model.lock().unwrap();
            if let Some((FaultInjection::DropNextResult, _)) = model.fault {
                model.fault = None;
                return;
            }
        }
        let result = self.run_token(&cmd);
        {
            let mut r = self.regs.lock().unwrap();
            r.windows[mailbox] = result;
            r.stat |= regs::mailbox_bit(mailbox as u8 + 1, 2);
            r.aic_raw |= 1 << (mailbox * 2 + 1);
        }
        let irq = self.irq.lock().unwrap();
        if let Some(handler) = irq.as_ref() {
            handler();
        }
    }

    fn run_token(&self, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let opcode = (cmd[0] >> 24) & 0xF;
        let subcode = cmd[0] >> 28;

        if let Some(code) = self.take_fault(opcode, subcode, cmd) {
            return err_result(cmd, code);
        }

        match opcode {
            1 => self.op_encryption(cmd),
            2 => self.op_hash(cmd),
            3 => self.op_mac(cmd),
            4 => self.op_trng(subcode, cmd),
            7 => self.op_asset(subcode, cmd),
            9 => self.op_public_key(subcode, cmd),
            _ => err_result(cmd, fw_code::INVALID_TOKEN),
        }
    }

    fn take_fault(&self, opcode: u32, subcode: u32, cmd: &[u32; WORDS]) -> Option<u32> {
        let mut model = self.model.lock().unwrap();
        match model.fault {
            Some((FaultInjection::NextToken, code)) => {
                model.fault = None;
                Some(code)
            }
            Some((FaultInjection::PkNumLoad, code))
                if opcode == 9 && subcode == 0 && cmd[2] & 0x1F == 0x01 =>
            {
                model.fault = None;
                Some(code)
            }
            _ => None,
        }
    }

    fn op_encryption(&self, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let w11 = cmd[11];
        if w11 & 0xF != 0 {
            // the model only implements AES
            return err_result(cmd, fw_code::INVALID_ALGORITHM);
        }
        let mode = (w11 >> 4) & 0xF;
        let encrypt = w11 & (1 << 15) != 0;
        let key_len = match (w11 >> 16) & 0x3 {
            1 => 16,
            2 => 24,
            3 => 32,
            _ => return err_result(cmd, fw_code::INVALID_KEY_SIZE),
        };
        let len = cmd[2] as usize;
        let src = addr(cmd, 3);
        let dst = addr(cmd, 6);
        if mode > 2 {
            return err_result(cmd, fw_code::INVALID_MODE);
        }
        if len % 16 != 0 {
            return err_result(cmd, fw_code::INVALID_LENGTH);
        }

        let key = get_bytes(cmd, 17, key_len);
        let aes = match Aes::new(&key) {
            Some(a) => a,
            None => return err_result(cmd, fw_code::INVALID_KEY_SIZE),
        };
        let mut iv = [0u8; 16];
        if mode != 0 {
            iv.copy_from_slice(&get_bytes(cmd, 13, 16));
        }

        let mut data = vec![0u8; len];
        if self.mem.read(src, &mut data).is_err() {
            return err_result(cmd, fw_code::INVALID_ADDRESS);
        }

        match (mode, encrypt) {
            (0, true) => {
                for block in data.chunks_exact_mut(16) {
                    aes.encrypt_block(block.try_into().unwrap());
                }
            }
            (0, false) => {
                for block in data.chunks_exact_mut(16) {
                    aes.decrypt_block(block.try_into().unwrap());
                }
            }
            (1, true) => {
                for block in data.chunks_exact_mut(16) {
                    for (b, v) in block.iter_mut().zip(iv) {
                        *b ^= v;
                    }
                    aes.encrypt_block(block.try_into().unwrap());
                    iv.copy_from_slice(block);
                }
            }
            (1, false) => {
                for block in data.chunks_exact_mut(16) {
                    let ct: [u8; 16] = (&*block).try_into().unwrap();
                    aes.decrypt_block(block.try_into().unwrap());
                    for (b, v) in block.iter_mut().zip(iv) {
                        *b ^= v;
                    }
                    iv = ct;
                }
            }
            (2, _) => {
                // 32-bit big-endian counter in the last IV word, wrapping
                // without carry into the upper bytes
                for block in data.chunks_mut(16) {
                    let mut ks = iv;
                    aes.encrypt_block(&mut ks);
                    for (b, k) in block.iter_mut().zip(ks) {
                        *b ^= k;
                    }
                    let ctr =
                        u32::from_be_bytes(iv[12..16].try_into().unwrap()).wrapping_add(1);
                    iv[12..16].copy_from_slice(&ctr.to_be_bytes());
                }
            }
            _ => unreachable!(),
        }

        if self.mem.write(dst, &data).is_err() {
            return err_result(cmd, fw_code::INVALID_ADDRESS);
        }
        let mut result = ok_result(cmd);
        if mode == 2 {
            put_bytes(&mut result, 2, &iv);
        }
        result
    }

    fn op_hash(&self, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let w6 = cmd[6];
        let variant = match ShaVariant::from_code((w6 & 0xF) as u8) {
            Some(v) => v,
            None => return err_result(cmd, fw_code::INVALID_ALGORITHM),
        };
        let default_init = w6 & (1 << 4) == 0;
        let finalize = w6 & (1 << 5) == 0;
        let len = cmd[2] as usize;
        let src = addr(cmd, 3);

        let mut data = vec![0u8; len];
        if len > 0 && self.mem.read(src, &mut data).is_err() {
            return err_result(cmd, fw_code::INVALID_ADDRESS);
        }
        let mut state = if default_init {
            variant.initial_state()
        } else {
            get_bytes(cmd, 8, variant.state_len())
        };

        let mut result = ok_result(cmd);
        if finalize {
            let total = cmd[24] as u64 | (cmd[25] as u64) << 32;
            let digest = sha::finalize(variant, &mut state, &data, total);
            let mut out = vec![0u8; variant.state_len()];
            out[..digest.len()].copy_from_slice(&digest);
            put_bytes(&mut result, 2, &out);
        } else {
            if len % variant.block_len() != 0 {
                return err_result(cmd, fw_code::INVALID_LENGTH);
            }
            sha::compress(variant, &mut state, &data);
            put_bytes(&mut result, 2, &state);
        }
        result
    }

    fn op_mac(&self, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let w6 = cmd[6];
        if w6 & ((1 << 8) | (1 << 9)) != 0 {
            // asset-resident keys/state are not modeled
            return err_result(cmd, fw_code::INVALID_ASSET);
        }
        let variant = match ShaVariant::from_code((w6 & 0xF) as u8) {
            Some(v) => v,
            None => return err_result(cmd, fw_code::INVALID_ALGORITHM),
        };
        let default_init = w6 & (1 << 4) == 0;
        let finalize = w6 & (1 << 5) == 0;
        let key_len = ((w6 >> 16) & 0xFF) as usize;
        if key_len > variant.block_len() {
            return err_result(cmd, fw_code::INVALID_KEY_SIZE);
        }
        let key = get_bytes(cmd, 28, key_len);
        let len = cmd[2] as usize;
        let src = addr(cmd, 3);

        let mut data = vec![0u8; len];
        if len > 0 && self.mem.read(src, &mut data).is_err() {
            return err_result(cmd, fw_code::INVALID_ADDRESS);
        }
        let mut state = if default_init {
            sha::hmac_inner_init(variant, &key)
        } else {
            get_bytes(cmd, 8, variant.state_len())
        };

        let mut result = ok_result(cmd);
        if finalize {
            let total = cmd[24] as u64 | (cmd[25] as u64) << 32;
            let mac = sha::hmac_finalize(variant, &mut state, &data, total, &key);
            let mut out = vec![0u8; variant.state_len()];
            out[..mac.len()].copy_from_slice(&mac);
            put_bytes(&mut result, 2, &out);
        } else {
            if len % variant.block_len() != 0 {
                return err_result(cmd, fw_code::INVALID_LENGTH);
            }
            sha::compress(variant, &mut state, &data);
            put_bytes(&mut result, 2, &state);
        }
        result
    }

    fn op_trng(&self, subcode: u32, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let mut model = self.model.lock().unwrap();
        match subcode {
            0 => {
                if !model.trng_configured {
                    return err_result(cmd, fw_code::INVALID_STATE);
                }
                let len = (cmd[2] & 0xFFFF) as usize;
                let dst = addr(cmd, 3);
                let mut bytes = vec![0u8; len];
                model.rng.fill_bytes(&mut bytes);
                if self.mem.write(dst, &bytes).is_err() {
                    return err_result(cmd, fw_code::INVALID_ADDRESS);
                }
                ok_result(cmd)
            }
            1 => {
                if cmd[2] & 1 == 0 {
                    return err_result(cmd, fw_code::INVALID_PARAMETER);
                }
                model.trng_configured = true;
                ok_result(cmd)
            }
            _ => err_result(cmd, fw_code::INVALID_TOKEN),
        }
    }

    fn op_asset(&self, subcode: u32, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        let mut model = self.model.lock().unwrap();
        match subcode {
            1 => {
                let policy = cmd[2] as u64 | (cmd[3] as u64) << 32;
                let len = (cmd[4] & 0x3FF) as usize;
                if len == 0 || policy == 0 {
                    return err_result(cmd, fw_code::INVALID_LENGTH);
                }
                let id = model.next_asset;
                model.next_asset += 1;
                model.assets.insert(
                    id,
                    Asset {
                        len,
                        policy,
                        data: Vec::new(),
                    },
                );
                let mut result = ok_result(cmd);
                result[1] = id;
                result
            }
            2 => {
                let id = cmd[2];
                if cmd[3] & (1 << 27) == 0 {
                    // only plaintext loads are modeled
                    return err_result(cmd, fw_code::INVALID_PARAMETER);
                }
                let len = (cmd[3] & 0x3FF) as usize;
                let src = addr(cmd, 4);
                let mut data = vec![0u8; len];
                if self.mem.read(src, &mut data).is_err() {
                    return err_result(cmd, fw_code::INVALID_ADDRESS);
                }
                match model.assets.get_mut(&id) {
                    Some(asset) if len <= asset.len => {
                        let _ = asset.policy;
                        asset.data = data;
                        ok_result(cmd)
                    }
                    Some(_) => err_result(cmd, fw_code::INVALID_LENGTH),
                    None => err_result(cmd, fw_code::INVALID_ASSET),
                }
            }
            3 => {
                if model.assets.remove(&cmd[2]).is_some() {
                    ok_result(cmd)
                } else {
                    err_result(cmd, fw_code::INVALID_ASSET)
                }
            }
            9 => ok_result(cmd),
            _ => err_result(cmd, fw_code::INVALID_TOKEN),
        }
    }

    fn op_public_key(&self, subcode: u32, cmd: &[u32; WORDS]) -> [u32; WORDS] {
        if subcode != 0 {
            return err_result(cmd, fw_code::INVALID_TOKEN);
        }
        let mut model = self.model.lock().unwrap();
        match cmd[2] & 0x1F {
            0x03 => {
                // NUMSETN: claim sized to the modulus, or release with zero
                let nwords = ((cmd[2] >> 16) & 0xFF) as usize;
                if nwords == 0 {
                    model.pk = PkUnit::default();
                    model.pk_releases += 1;
                } else {
                    model.pk.claimed = true;
                    model.pk.nwords = nwords;
                    model.pk.slots.clear();
                    model.pk_claims += 1;
                }
                ok_result(cmd)
            }
            0x01 => {
                if !model.pk.claimed {
                    return err_result(cmd, fw_code::INVALID_STATE);
                }
                let index = ((cmd[2] >> 24) & 0xF) as u8;
                let len = (cmd[5] & 0xFFF) as usize;
                let src = addr(cmd, 6);
                let mut data = vec![0u8; len];
                if self.mem.read(src, &mut data).is_err() {
                    return err_result(cmd, fw_code::INVALID_ADDRESS);
                }
                model.pk.slots.insert(index, data);
                ok_result(cmd)
            }
            op @ (0x04 | 0x05) => {
                if !model.pk.claimed {
                    return err_result(cmd, fw_code::INVALID_STATE);
                }
                if ((cmd[5] & 0xFFF) as usize) != model.pk.nwords * 4 {
                    return err_result(cmd, fw_code::INVALID_LENGTH);
                }
                let modulus = match model.pk.slots.get(&0) {
                    Some(m) => m.clone(),
                    None => return err_result(cmd, fw_code::INVALID_STATE),
                };
                let exponent = if op == 0x04 {
                    cmd[3].to_le_bytes().to_vec()
                } else {
                    match model.pk.slots.get(&1) {
                        Some(d) => d.clone(),
                        None => return err_result(cmd, fw_code::INVALID_STATE),
                    }
                };
                let src_len = (cmd[5] & 0xFFF) as usize;
                let src = addr(cmd, 6);
                let dst = addr(cmd, 8);
                let mut base = vec![0u8; src_len];
                if self.mem.read(src, &mut base).is_err() {
                    return err_result(cmd, fw_code::INVALID_ADDRESS);
                }
                let out = match modexp_le(&base, &exponent, &modulus) {
                    Some(o) => o,
                    None => return err_result(cmd, fw_code::INVALID_MODULUS),
                };
                if self.mem.write(dst, &out).is_err() {
                    return err_result(cmd, fw_code::INVALID_ADDRESS);
                }
                ok_result(cmd)
            }
            _ => err_result(cmd, fw_code::INVALID_TOKEN),
        }
    }
}

impl DeviceMmio for Eip130Periph {
    fn read_reg(&self, offset: u32) -> u32 {
        assert_eq!(offset % 4, 0, "unaligned register read at {offset:#x}");
        let r = self.regs.lock().unwrap();
        match offset {
            o if (o as usize)
                < regs::MAILBOX_COUNT * regs::MAILBOX_SPACING_BYTES as usize =>
            {
                let mailbox = (o / regs::MAILBOX_SPACING_BYTES) as usize;
                r.windows[mailbox][((o % regs::MAILBOX_SPACING_BYTES) / 4) as usize]
            }
            regs::MAILBOX_STAT => r.stat,
            regs::MAILBOX_LOCKOUT => r.lockout,
            regs::MODULE_STATUS => r.module_status,
            regs::AIC_RAW_STAT => r.aic_raw,
            regs::AIC_ENABLED_STAT => r.aic_raw & r.aic_enable,
            regs::AIC_POL_CTRL => r.aic_pol,
            regs::AIC_TYPE_CTRL => r.aic_type,
            regs::AIC_ENABLE_CTRL => r.aic_enable,
            _ => panic!("read of unmapped register {offset:#x}"),
        }
    }

    fn write_reg(&self, offset: u32, value: u32) {
        assert_eq!(offset % 4, 0, "unaligned register write at {offset:#x}");
        let mut submit = None;
        {
            let mut r = self.regs.lock().unwrap();
            match offset {
                o if (o as usize)
                    < regs::MAILBOX_COUNT * regs::MAILBOX_SPACING_BYTES as usize =>
                {
                    let mailbox = (o / regs::MAILBOX_SPACING_BYTES) as usize;
                    r.windows[mailbox][((o % regs::MAILBOX_SPACING_BYTES) / 4) as usize] = value;
                }
                regs::MAILBOX_CTRL => {
                    for mailbox in 0..regs::MAILBOX_COUNT {
                        let nibble = (value >> (mailbox * 4)) & 0xF;
                        let nr = mailbox as u8 + 1;
                        if nibble & 1 != 0 {
                            submit = Some(mailbox);
                        }
                        if nibble & 2 != 0 {
                            r.stat &= !regs::mailbox_bit(nr, 2);
                        }
                        if nibble & 4 != 0 {
                            r.stat |= regs::mailbox_bit(nr, 4);
                        }
                        if nibble & 8 != 0 {
                            r.stat &= !regs::mailbox_bit(nr, 4);
                        }
                    }
                }
                regs::MAILBOX_LOCKOUT => r.lockout = value,
                regs::AIC_POL_CTRL => r.aic_pol = value,
                regs::AIC_TYPE_CTRL => r.aic_type = value,
                regs::AIC_ENABLE_CTRL => r.aic_enable = value,
                regs::AIC_ACK => r.aic_raw &= !value,
                _ => panic!("write of unmapped register {offset:#x}"),
            }
        }
        if let Some(mailbox) = submit {
            self.execute(mailbox);
        }
    }
}

fn ok_result(cmd: &[u32; WORDS]) -> [u32; WORDS] {
    let mut result = [0u32; WORDS];
    result[0] = cmd[0] & 0xFFFF;
    result
}

fn err_result(cmd: &[u32; WORDS], code: u32) -> [u32; WORDS] {
    let mut result = ok_result(cmd);
    result[0] |= (1 << 31) | (code << 16);
    result
}

fn addr(cmd: &[u32; WORDS], word: usize) -> u64 {
    cmd[word] as u64 | (cmd[word + 1] as u64) << 32
}

fn get_bytes(words: &[u32; WORDS], start: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = (words[start + i / 4] >> (8 * (i % 4))) as u8;
    }
    out
}

fn put_bytes(words: &mut [u32; WORDS], start: usize, data: &[u8]) {
    for (i, &byte) in data.iter().enumerate() {
        let word = start + i / 4;
        let shift = 8 * (i % 4);
        words[word] &= !(0xFF << shift);
        words[word] |= (byte as u32) << shift;
    }
}
