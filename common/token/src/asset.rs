// Licensed under the Apache-2.0 license

//! Asset-management token layouts and asset policy bits.
//!
//! Assets are firmware-managed key/data objects referenced by id. The
//! 64-bit policy word fixes what an asset may ever be used for and is
//! checked by the firmware on every reference; the bit assignments below
//! are part of the firmware contract.

use crate::opcode::{
    word0, OPCODE_ASSETMANAGEMENT, SUBCODE_ASSETCREATE, SUBCODE_ASSETDELETE, SUBCODE_ASSETLOAD,
};
use crate::{CommandToken, ResultToken};

pub mod policy {
    pub const SHA1: u64 = 0x0000_0000_0000_0001;
    pub const SHA224: u64 = 0x0000_0000_0000_0002;
    pub const SHA256: u64 = 0x0000_0000_0000_0004;
    pub const SHA384: u64 = 0x0000_0000_0000_0008;
    pub const SHA512: u64 = 0x0000_0000_0000_0010;
    pub const CMAC: u64 = 0x0000_0000_0000_0020;
    pub const POLY1305: u64 = 0x0000_0000_0000_0040;

    pub const ALGO_CIPHER_MASK: u64 = 0x0000_0000_0000_0300;
    pub const ALGO_CIPHER_AES: u64 = 0x0000_0000_0000_0100;
    pub const ALGO_CIPHER_TRIPLE_DES: u64 = 0x0000_0000_0000_0200;
    pub const ALGO_CIPHER_CHACHA20: u64 = 0x0000_0000_0000_2000;
    pub const ALGO_CIPHER_SM4: u64 = 0x0000_0000_0000_4000;
    pub const ALGO_CIPHER_ARIA: u64 = 0x0000_0000_0000_8000;

    pub const MODE1: u64 = 0x0000_0000_0001_0000;
    pub const MODE2: u64 = 0x0000_0000_0002_0000;
    pub const MODE3: u64 = 0x0000_0000_0004_0000;
    pub const MODE4: u64 = 0x0000_0000_0008_0000;
    pub const MODE5: u64 = 0x0000_0000_0010_0000;
    pub const MODE6: u64 = 0x0000_0000_0020_0000;
    pub const MODE7: u64 = 0x0000_0000_0040_0000;
    pub const MODE8: u64 = 0x0000_0000_0080_0000;
    pub const MODE9: u64 = 0x0000_0000_0100_0000;
    pub const MODE10: u64 = 0x0000_0000_0200_0000;

    pub const AES_MODE_ECB: u64 = ALGO_CIPHER_AES | MODE1;
    pub const AES_MODE_CBC: u64 = ALGO_CIPHER_AES | MODE2;
    pub const AES_MODE_CTR: u64 = ALGO_CIPHER_AES | MODE4;
    pub const AES_MODE_ICM: u64 = ALGO_CIPHER_AES | MODE5;
    pub const AES_MODE_CCM: u64 = ALGO_CIPHER_AES | MODE7 | CMAC;
    pub const AES_MODE_F8: u64 = ALGO_CIPHER_AES | MODE8;
    pub const AES_MODE_XTS: u64 = ALGO_CIPHER_AES | MODE9;
    pub const AES_MODE_GCM: u64 = ALGO_CIPHER_AES | MODE10;

    pub const TDES_MODE_ECB: u64 = ALGO_CIPHER_TRIPLE_DES | MODE1;
    pub const TDES_MODE_CBC: u64 = ALGO_CIPHER_TRIPLE_DES | MODE2;

    pub const MAC_GENERATE: u64 = 0x0000_0000_0400_0000;
    pub const MAC_VERIFY: u64 = 0x0000_0000_0800_0000;
    pub const ENCRYPT: u64 = 0x0000_0000_1000_0000;
    pub const DECRYPT: u64 = 0x0000_0000_2000_0000;

    pub const TEMP_IV: u64 = 0x0001_0000_0000_0000;
    pub const TEMP_COUNTER: u64 = 0x0002_0000_0000_0000;
    pub const TEMP_MAC: u64 = 0x0004_0000_0000_0000;
    pub const TEMP_AUTH_STATE: u64 = 0x0010_0000_0000_0000;

    pub const MONOTONIC: u64 = 0x0000_0001_0000_0000;

    pub const TRUSTED_ROOT_KEY: u64 = 0x0000_0002_0000_0000;
    pub const TRUSTED_KEY_DERIVE: u64 = 0x0000_0004_0000_0000;
    pub const KEY_DERIVE: u64 = 0x0000_0008_0000_0000;

    pub const TRUSTED_WRAP: u64 = 0x0000_0010_0000_0000;
    pub const AES_WRAP: u64 = 0x0000_0020_0000_0000;

    pub const PUBLIC_KEY: u64 = 0x0000_0000_8000_0000;
    pub const PK_RSA_OAEP_WRAP: u64 = 0x0000_0040_0000_0000;
    pub const PK_RSA_PKCS1_WRAP: u64 = 0x0000_0100_0000_0000;
    pub const PK_RSA_PKCS1_SIGN: u64 = 0x0000_0200_0000_0000;
    pub const PK_RSA_PSS_SIGN: u64 = 0x0000_0400_0000_0000;
    pub const PK_DSA_SIGN: u64 = 0x0000_0800_0000_0000;
    pub const PK_ECC_ECDSA_SIGN: u64 = 0x0000_1000_0000_0000;
    pub const PK_DH_KEY: u64 = 0x0000_2000_0000_0000;
    pub const PK_ECDH_KEY: u64 = 0x0000_4000_0000_0000;
    pub const PUBLIC_KEY_PARAM: u64 = 0x0000_8000_0000_0000;

    pub const EMMC_AUTH_KEY: u64 = 0x0400_0000_0000_0000;
    pub const AUTH_KEY: u64 = 0x8000_0000_0000_0000;

    pub const SOURCE_NON_SECURE: u64 = 0x0100_0000_0000_0000;
    pub const CROSS_DOMAIN: u64 = 0x0200_0000_0000_0000;

    pub const PRIVATE_DATA: u64 = 0x0800_0000_0000_0000;
    pub const PUBLIC_DATA: u64 = 0x1000_0000_0000_0000;

    pub const EXPORT: u64 = 0x2000_0000_0000_0000;
    pub const TRUSTED_EXPORT: u64 = 0x4000_0000_0000_0000;
}

const LENGTH_MASK: u32 = 0x3FF;
const ALL_HOSTS: u32 = 1 << 28;
const PLAINTEXT: u32 = 1 << 27;

/// Create an asset with the given policy and byte length.
pub fn create(t: &mut CommandToken, policy: u64, len: u32) {
    t.words[0] = word0(OPCODE_ASSETMANAGEMENT, SUBCODE_ASSETCREATE);
    t.words[2] = policy as u32;
    t.words[3] = (policy >> 32) as u32;
    t.words[4] = (len & LENGTH_MASK) | ALL_HOSTS;
    t.words[5] = 0;
    t.words[6] = 0;
}

/// Asset id allocated by a create, returned at word 1.
pub fn read_created_id(r: &ResultToken) -> u32 {
    r.words[1]
}

/// Delete an asset by id.
pub fn delete(t: &mut CommandToken, asset_id: u32) {
    t.words[0] = word0(OPCODE_ASSETMANAGEMENT, SUBCODE_ASSETDELETE);
    t.words[2] = asset_id;
}

/// Begin a plaintext load into an existing asset.
pub fn load_plaintext(t: &mut CommandToken, asset_id: u32) {
    t.words[0] = word0(OPCODE_ASSETMANAGEMENT, SUBCODE_ASSETLOAD);
    t.words[2] = asset_id;
    t.words[3] = PLAINTEXT;
    for w in &mut t.words[4..9] {
        *w = 0;
    }
}

/// Input DMA buffer for a load (length into word 3, address words 4/5).
pub fn load_set_input(t: &mut CommandToken, src: u64, len: u32) {
    t.words[3] |= len & LENGTH_MASK;
    t.words[4] = src as u32;
    t.words[5] = (src >> 32) as u32;
}
