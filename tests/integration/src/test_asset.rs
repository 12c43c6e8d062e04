// Licensed under the Apache-2.0 license

//! Asset-management tokens exercised through the raw exchange surface.

use crate::common::rig;
use eip130_driver::CipherError;
use eip130_driver::DeviceMemory;
use eip130_token::{asset, CommandToken};

#[test]
fn asset_create_load_delete() {
    let rig = rig();

    let mut create = CommandToken::new();
    asset::create(
        &mut create,
        asset::policy::AES_MODE_CBC | asset::policy::ENCRYPT | asset::policy::DECRYPT,
        32,
    );
    let r = rig.engine.raw_exchange(&mut create).unwrap();
    let id = asset::read_created_id(&r);
    assert_ne!(id, 0);

    // stage key bytes in the low DMA region and load them in
    rig.mem.write(0x800, &[0x5Au8; 32]).unwrap();
    let mut load = CommandToken::new();
    asset::load_plaintext(&mut load, id);
    asset::load_set_input(&mut load, 0x800, 32);
    rig.engine.raw_exchange(&mut load).unwrap();
    assert_eq!(rig.periph.asset_data(id), Some(vec![0x5A; 32]));

    let mut delete = CommandToken::new();
    asset::delete(&mut delete, id);
    rig.engine.raw_exchange(&mut delete).unwrap();

    // deleting again reports the asset gone
    let mut again = CommandToken::new();
    asset::delete(&mut again, id);
    match rig.engine.raw_exchange(&mut again) {
        Err(CipherError::HardwareFault { status }) => {
            assert_eq!((status >> 16) & 0xFF, eip130_driver::fw_code::INVALID_ASSET);
        }
        other => panic!("expected an asset error, got {other:?}"),
    }
}

#[test]
fn oversized_load_is_rejected() {
    let rig = rig();
    let mut create = CommandToken::new();
    asset::create(&mut create, asset::policy::PRIVATE_DATA, 16);
    let r = rig.engine.raw_exchange(&mut create).unwrap();
    let id = asset::read_created_id(&r);

    rig.mem.write(0x800, &[0u8; 32]).unwrap();
    let mut load = CommandToken::new();
    asset::load_plaintext(&mut load, id);
    asset::load_set_input(&mut load, 0x800, 32);
    assert!(matches!(
        rig.engine.raw_exchange(&mut load),
        Err(CipherError::HardwareFault { .. })
    ));
}
