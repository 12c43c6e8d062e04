// Licensed under the Apache-2.0 license

use crate::common::rig;
use eip130_driver::{CipherError, HashAlgo};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use zerocopy::IntoBytes;

#[test]
fn sha256_empty_matches_standard_vector() {
    let rig = rig();
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    let digest = rig
        .engine
        .hash_update_bytes(&session, &[], true)
        .unwrap()
        .unwrap();
    assert_eq!(
        hex::encode(&digest),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn chunked_updates_match_one_shot() {
    let rig = rig();
    let msg = [0xA5u8; 64];

    // 1 + 1 + 62 bytes must equal a single 64-byte update
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    rig.engine
        .hash_update_bytes(&session, &msg[..1], false)
        .unwrap();
    rig.engine
        .hash_update_bytes(&session, &msg[1..2], false)
        .unwrap();
    let chunked = rig
        .engine
        .hash_update_bytes(&session, &msg[2..], true)
        .unwrap()
        .unwrap();

    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    let one_shot = rig
        .engine
        .hash_update_bytes(&session, &msg, true)
        .unwrap()
        .unwrap();

    assert_eq!(chunked, one_shot);
    assert_eq!(chunked, Sha256::digest(msg).to_vec());
}

#[test]
fn long_streams_cross_page_boundaries() {
    let rig = rig();
    let msg: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    // deliberately awkward chunk sizes
    let mut offset = 0;
    for size in [1usize, 63, 64, 65, 4095, 4096, 1000].iter().cycle() {
        if offset >= msg.len() {
            break;
        }
        let end = (offset + size).min(msg.len());
        rig.engine
            .hash_update_bytes(&session, &msg[offset..end], false)
            .unwrap();
        offset = end;
    }
    let digest = rig
        .engine
        .hash_update_bytes(&session, &[], true)
        .unwrap()
        .unwrap();
    assert_eq!(digest, Sha256::digest(&msg).to_vec());
}

#[test]
fn all_sha2_variants_match_reference() {
    let rig = rig();
    let msg = b"The quick brown fox jumps over the lazy dog";
    let cases: [(HashAlgo, Vec<u8>); 4] = [
        (HashAlgo::Sha224, Sha224::digest(msg).to_vec()),
        (HashAlgo::Sha256, Sha256::digest(msg).to_vec()),
        (HashAlgo::Sha384, Sha384::digest(msg).to_vec()),
        (HashAlgo::Sha512, Sha512::digest(msg).to_vec()),
    ];
    for (algo, expected) in cases {
        let session = rig.engine.open_hash(algo, None).unwrap();
        let digest = rig
            .engine
            .hash_update_bytes(&session, msg, true)
            .unwrap()
            .unwrap();
        assert_eq!(digest, expected, "{algo:?}");
    }
}

#[test]
fn hmac_matches_reference() {
    let rig = rig();
    let key = b"shared secret";
    let msg = b"message to authenticate";
    let session = rig
        .engine
        .open_hash(HashAlgo::HmacSha256, Some(key))
        .unwrap();
    let mac = rig
        .engine
        .hash_update_bytes(&session, msg, true)
        .unwrap()
        .unwrap();
    let mut reference = Hmac::<Sha256>::new_from_slice(key).unwrap();
    reference.update(msg);
    assert_eq!(mac, reference.finalize().into_bytes().to_vec());
}

#[test]
fn hmac_long_key_is_digested_on_the_engine() {
    let rig = rig();
    // keys longer than the block size are replaced by their hash; the
    // hmac crate does the same, so results must agree
    let key = [0x77u8; 100];
    let msg = b"long key case";
    let session = rig
        .engine
        .open_hash(HashAlgo::HmacSha256, Some(&key))
        .unwrap();
    let mac = rig
        .engine
        .hash_update_bytes(&session, msg, true)
        .unwrap()
        .unwrap();
    let mut reference = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    reference.update(msg);
    assert_eq!(mac, reference.finalize().into_bytes().to_vec());
}

#[test]
fn hmac_sha512_streaming() {
    let rig = rig();
    let key = [0x0Bu8; 20];
    let msg = [0x61u8; 300];
    let session = rig
        .engine
        .open_hash(HashAlgo::HmacSha512, Some(&key))
        .unwrap();
    rig.engine
        .hash_update_bytes(&session, &msg[..129], false)
        .unwrap();
    let mac = rig
        .engine
        .hash_update_bytes(&session, &msg[129..], true)
        .unwrap()
        .unwrap();
    let mut reference = Hmac::<Sha512>::new_from_slice(&key).unwrap();
    reference.update(&msg);
    assert_eq!(mac, reference.finalize().into_bytes().to_vec());
}

#[test]
fn update_after_finalize_is_rejected() {
    let rig = rig();
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    rig.engine
        .hash_update_bytes(&session, b"data", true)
        .unwrap();
    assert_eq!(
        rig.engine
            .hash_update_bytes(&session, b"more", false)
            .err(),
        Some(CipherError::InvalidState("update after finalize"))
    );
}

#[test]
fn export_import_resumes_mid_stream() {
    let rig = rig();
    let msg: Vec<u8> = (0u8..200).collect();

    let first = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    rig.engine
        .hash_update_bytes(&first, &msg[..77], false)
        .unwrap();
    let snapshot = rig.engine.hash_export(&first).unwrap();

    // snapshots are plain bytes, as a suspended session would store them
    let blob = snapshot.as_bytes().to_vec();
    let restored: eip130_driver::HashSnapshot =
        zerocopy::FromBytes::read_from_bytes(blob.as_slice()).expect("snapshot layout");

    let second = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    rig.engine.hash_import(&second, &restored).unwrap();
    let digest = rig
        .engine
        .hash_update_bytes(&second, &msg[77..], true)
        .unwrap()
        .unwrap();
    assert_eq!(digest, Sha256::digest(&msg).to_vec());
}

#[test]
fn finalize_with_pending_cache_only() {
    let rig = rig();
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    rig.engine
        .hash_update_bytes(&session, b"tiny", false)
        .unwrap();
    let digest = rig
        .engine
        .hash_update_bytes(&session, &[], true)
        .unwrap()
        .unwrap();
    assert_eq!(digest, Sha256::digest(b"tiny").to_vec());
}
