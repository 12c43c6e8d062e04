// Licensed under the Apache-2.0 license

use crate::common::rig;
use eip130_driver::{CipherAlgo, CipherError, CipherMode, DeviceMemory, SgEntry};
use eip130_emulator_periph::FaultInjection;

const AES128_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f,
];

#[test]
fn aes128_ecb_known_answer() {
    let rig = rig();
    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &AES128_KEY, None)
        .unwrap();
    let mut out = [0u8; 32];
    rig.engine
        .cipher_run_bytes(&session, &[0u8; 32], &mut out, true)
        .unwrap();
    // AES-128 of a zero block under the 000102..0f key
    let expected = hex::decode("c6a13b37878f5b826f4f8162a1c8d879").unwrap();
    assert_eq!(&out[..16], &expected[..]);
    assert_eq!(&out[16..], &expected[..]);

    let mut plain = [0u8; 32];
    rig.engine
        .cipher_run_bytes(&session, &out.clone(), &mut plain, false)
        .unwrap();
    assert_eq!(plain, [0u8; 32]);
}

#[test]
fn cbc_iv_chains_across_runs() {
    let rig = rig();
    let iv = [0x42u8; 16];
    let msg: Vec<u8> = (0u8..64).collect();

    let one_shot = {
        let session = rig
            .engine
            .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
            .unwrap();
        let mut out = vec![0u8; 64];
        rig.engine
            .cipher_run_bytes(&session, &msg, &mut out, true)
            .unwrap();
        out
    };

    let split = {
        let session = rig
            .engine
            .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
            .unwrap();
        let mut out = vec![0u8; 64];
        rig.engine
            .cipher_run_bytes(&session, &msg[..16], &mut out[..16], true)
            .unwrap();
        rig.engine
            .cipher_run_bytes(&session, &msg[16..], &mut out[16..], true)
            .unwrap();
        out
    };
    assert_eq!(one_shot, split);
}

#[test]
fn cbc_decrypt_roundtrip() {
    let rig = rig();
    let iv = [0x9Au8; 16];
    let msg: Vec<u8> = (0u8..128).rev().collect();

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut ct = vec![0u8; 128];
    rig.engine
        .cipher_run_bytes(&session, &msg, &mut ct, true)
        .unwrap();
    assert_ne!(ct, msg);

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut plain = vec![0u8; 128];
    rig.engine
        .cipher_run_bytes(&session, &ct, &mut plain, false)
        .unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn cbc_decrypt_chains_across_runs() {
    let rig = rig();
    let iv = [0x11u8; 16];
    let msg: Vec<u8> = (0u8..96).collect();

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut ct = vec![0u8; 96];
    rig.engine
        .cipher_run_bytes(&session, &msg, &mut ct, true)
        .unwrap();

    // decrypt in two runs; the session must carry the last ciphertext
    // block of run one as the IV of run two
    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut plain = vec![0u8; 96];
    rig.engine
        .cipher_run_bytes(&session, &ct[..48], &mut plain[..48], false)
        .unwrap();
    rig.engine
        .cipher_run_bytes(&session, &ct[48..], &mut plain[48..], false)
        .unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn ctr_handles_unaligned_length() {
    let rig = rig();
    let iv = [0x01u8; 16];
    let msg: Vec<u8> = (0..50u8).map(|b| b.wrapping_mul(7)).collect();

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ctr, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut ct = vec![0u8; 50];
    rig.engine
        .cipher_run_bytes(&session, &msg, &mut ct, true)
        .unwrap();

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ctr, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut plain = vec![0u8; 50];
    rig.engine
        .cipher_run_bytes(&session, &ct, &mut plain, false)
        .unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn ctr_counter_wrap_roundtrip() {
    let rig = rig();
    // counter field three blocks short of wrapping
    let mut iv = [0u8; 16];
    iv[12..].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFE]);
    let msg: Vec<u8> = (0u8..80).collect();

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ctr, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut ct = vec![0u8; 80];
    rig.engine
        .cipher_run_bytes(&session, &msg, &mut ct, true)
        .unwrap();
    assert_ne!(ct, msg);

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ctr, &AES128_KEY, Some(&iv))
        .unwrap();
    let mut plain = vec![0u8; 80];
    rig.engine
        .cipher_run_bytes(&session, &ct, &mut plain, false)
        .unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn scattered_misaligned_buffers_bounce() {
    let rig = rig();
    // hand-built scatter list with word-misaligned addresses
    let msg: Vec<u8> = (0u8..48).collect();
    rig.mem.write(0x101, &msg[..17]).unwrap();
    rig.mem.write(0x203, &msg[17..]).unwrap();
    let src = [SgEntry::new(0x101, 17), SgEntry::new(0x203, 31)];
    let dst = [SgEntry::new(0x401, 17), SgEntry::new(0x503, 31)];

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &AES128_KEY, None)
        .unwrap();
    rig.engine
        .cipher_run(&session, &src, &dst, 48, true)
        .unwrap();

    // compare against the contiguous path
    let mut expected = vec![0u8; 48];
    rig.engine
        .cipher_run_bytes(&session, &msg, &mut expected, true)
        .unwrap();
    let mut got = vec![0u8; 48];
    eip130_driver::sg_copy_to_buffer(&*rig.mem, &dst, 0, &mut got).unwrap();
    assert_eq!(got, expected);
}

#[test]
fn parameter_validation() {
    let rig = rig();
    assert_eq!(
        rig.engine
            .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &[0u8; 10], None)
            .err(),
        Some(CipherError::InvalidParameter("key length"))
    );
    assert_eq!(
        rig.engine
            .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &AES128_KEY, None)
            .err(),
        Some(CipherError::InvalidParameter("mode requires an IV"))
    );
    assert_eq!(
        rig.engine
            .open_cipher(CipherAlgo::Des, CipherMode::Ctr, &[0u8; 8], Some(&[0; 16]))
            .err(),
        Some(CipherError::InvalidParameter("mode not supported for DES"))
    );

    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &AES128_KEY, None)
        .unwrap();
    let mut out = [0u8; 30];
    assert_eq!(
        rig.engine
            .cipher_run_bytes(&session, &[0u8; 30], &mut out, true)
            .err(),
        Some(CipherError::InvalidParameter("length not block aligned"))
    );
}

#[test]
fn unsupported_algorithm_surfaces_hardware_fault() {
    let rig = rig();
    // the emulated engine models AES only; DES tokens come back as errors
    let session = rig
        .engine
        .open_cipher(CipherAlgo::Des, CipherMode::Ecb, &[0u8; 8], None)
        .unwrap();
    let mut out = [0u8; 16];
    match rig
        .engine
        .cipher_run_bytes(&session, &[0u8; 16], &mut out, true)
    {
        Err(CipherError::HardwareFault { status }) => {
            assert_eq!((status >> 16) & 0xFF, eip130_driver::fw_code::INVALID_ALGORITHM);
        }
        other => panic!("expected a hardware fault, got {other:?}"),
    }
    // a failed cipher session is terminal
    assert_eq!(
        rig.engine
            .cipher_run_bytes(&session, &[0u8; 16], &mut out, true)
            .err(),
        Some(CipherError::InvalidState("session failed"))
    );
}

#[test]
fn injected_fault_fails_only_that_run() {
    let rig = rig();
    let session = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &AES128_KEY, None)
        .unwrap();
    rig.periph
        .inject_fault(FaultInjection::NextToken, eip130_driver::fw_code::PANIC);
    let mut out = [0u8; 16];
    assert!(matches!(
        rig.engine
            .cipher_run_bytes(&session, &[0u8; 16], &mut out, true),
        Err(CipherError::HardwareFault { .. })
    ));

    // an unrelated fresh session still works
    let session2 = rig
        .engine
        .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &AES128_KEY, None)
        .unwrap();
    rig.engine
        .cipher_run_bytes(&session2, &[0u8; 16], &mut out, true)
        .unwrap();
}
