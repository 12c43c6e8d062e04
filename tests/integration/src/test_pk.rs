// Licensed under the Apache-2.0 license

use crate::common::rig;
use eip130_driver::{CipherError, PkDirection};
use eip130_emulator_periph::FaultInjection;

/// 1024-bit modulus with only the top bit set (2^1023): exponentiations
/// of small bases below it are exact, so results are predictable without
/// a real key pair.
fn top_bit_modulus() -> Vec<u8> {
    let mut n = vec![0u8; 128];
    n[0] = 0x80;
    n
}

#[test]
fn public_modexp_computes_powers() {
    let rig = rig();
    // 2^10 = 1024
    let out = rig
        .engine
        .pk_modexp(PkDirection::EncryptVerify, &top_bit_modulus(), &[10], &[2])
        .unwrap();
    assert_eq!(out.len(), 128);
    let mut expected = vec![0u8; 128];
    expected[126] = 0x04;
    assert_eq!(out, expected);
    assert_eq!(rig.periph.pk_counters(), (1, 1));
}

#[test]
fn public_modexp_wide_result() {
    let rig = rig();
    // 2^300 fits well below 2^1023
    let out = rig
        .engine
        .pk_modexp(
            PkDirection::EncryptVerify,
            &top_bit_modulus(),
            &[0x01, 0x2C],
            &[2],
        )
        .unwrap();
    let mut expected = vec![0u8; 128];
    expected[127 - 300 / 8] = 1 << (300 % 8);
    assert_eq!(out, expected);
}

#[test]
fn private_modexp_uses_loaded_exponent() {
    let rig = rig();
    // 3^3 = 27 via the MODEXPD path
    let out = rig
        .engine
        .pk_modexp(PkDirection::DecryptSign, &top_bit_modulus(), &[3], &[3])
        .unwrap();
    let mut expected = vec![0u8; 128];
    expected[127] = 27;
    assert_eq!(out, expected);
    assert_eq!(rig.periph.pk_counters(), (1, 1));
}

#[test]
fn claim_release_paired_on_load_failure() {
    let rig = rig();
    rig.periph.inject_fault(
        FaultInjection::PkNumLoad,
        eip130_driver::fw_code::INVALID_ADDRESS,
    );
    let result = rig
        .engine
        .pk_modexp(PkDirection::EncryptVerify, &top_bit_modulus(), &[3], &[2]);
    assert!(matches!(result, Err(CipherError::HardwareFault { .. })));
    // the release must have been issued anyway
    assert_eq!(rig.periph.pk_counters(), (1, 1));
}

#[test]
fn claim_release_stay_paired_across_mixed_outcomes() {
    let rig = rig();
    for round in 0..3 {
        if round == 1 {
            rig.periph.inject_fault(
                FaultInjection::PkNumLoad,
                eip130_driver::fw_code::INVALID_ADDRESS,
            );
        }
        let _ = rig
            .engine
            .pk_modexp(PkDirection::EncryptVerify, &top_bit_modulus(), &[3], &[2]);
    }
    let (claims, releases) = rig.periph.pk_counters();
    assert_eq!(claims, 3);
    assert_eq!(claims, releases);
}

#[test]
fn parameter_validation() {
    let rig = rig();
    assert_eq!(
        rig.engine
            .pk_modexp(PkDirection::EncryptVerify, &[0u8; 100], &[3], &[2])
            .err(),
        Some(CipherError::InvalidParameter("modulus length"))
    );
    assert_eq!(
        rig.engine
            .pk_modexp(
                PkDirection::EncryptVerify,
                &top_bit_modulus(),
                &[1, 2, 3, 4, 5],
                &[2]
            )
            .err(),
        Some(CipherError::InvalidParameter("public exponent length"))
    );
    let long_input = vec![1u8; 129];
    assert_eq!(
        rig.engine
            .pk_modexp(
                PkDirection::EncryptVerify,
                &top_bit_modulus(),
                &[3],
                &long_input
            )
            .err(),
        Some(CipherError::InvalidParameter("input longer than modulus"))
    );
    // no hardware was touched by any of these
    assert_eq!(rig.periph.pk_counters(), (0, 0));
}
