// Licensed under the Apache-2.0 license

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::common::{rig, rig_fast_timeout, rig_with, CountingStats};
use eip130_driver::{CeConfig, CipherAlgo, CipherError, CipherMode, HashAlgo};
use eip130_emulator_periph::FaultInjection;
use sha2::{Digest, Sha256};

#[test]
fn concurrent_cipher_and_hash_do_not_interfere() {
    let rig = Arc::new(rig());
    let key: Vec<u8> = (0..16).collect();

    let cipher_rig = rig.clone();
    let cipher_key = key.clone();
    let cipher = thread::spawn(move || {
        let session = cipher_rig
            .engine
            .open_cipher(CipherAlgo::Aes, CipherMode::Ecb, &cipher_key, None)
            .unwrap();
        for _ in 0..20 {
            let mut out = [0u8; 32];
            cipher_rig
                .engine
                .cipher_run_bytes(&session, &[0u8; 32], &mut out, true)
                .unwrap();
            assert_eq!(
                hex::encode(&out[..16]),
                "c6a13b37878f5b826f4f8162a1c8d879"
            );
        }
    });

    let hash_rig = rig.clone();
    let hash = thread::spawn(move || {
        for _ in 0..20 {
            let session = hash_rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
            let digest = hash_rig
                .engine
                .hash_update_bytes(&session, &[], true)
                .unwrap()
                .unwrap();
            assert_eq!(
                hex::encode(digest),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            );
        }
    });

    cipher.join().unwrap();
    hash.join().unwrap();
}

#[test]
fn saturated_queue_backlogs_and_completes_everyone() {
    let stats = Arc::new(CountingStats::default());
    let rig = Arc::new(rig_with(
        CeConfig {
            queue_depth: 2,
            timeout: std::time::Duration::from_millis(300),
            ..CeConfig::default()
        },
        Box::new(stats.clone()),
    ));

    // Jam the dispatcher: the first request's token is swallowed, so the
    // exchange sits in its timeout while the others pile up behind it.
    rig.periph.inject_fault(FaultInjection::DropNextResult, 0);
    let jammed = {
        let rig = rig.clone();
        thread::spawn(move || {
            let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
            rig.engine.hash_update_bytes(&session, b"jam", true)
        })
    };
    thread::sleep(std::time::Duration::from_millis(50));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let rig = rig.clone();
            thread::spawn(move || {
                let msg = vec![i as u8; 3000];
                let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
                let digest = rig
                    .engine
                    .hash_update_bytes(&session, &msg, true)
                    .unwrap()
                    .unwrap();
                assert_eq!(digest, Sha256::digest(&msg).to_vec());
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(jammed.join().unwrap().err(), Some(CipherError::Timeout));

    // four submissions against a depth of two while the queue was jammed:
    // at least the later ones were admitted as backlog and notified
    assert!(stats.backlogged.load(Ordering::SeqCst) >= 1);
    assert_eq!(stats.chunk_errors.load(Ordering::SeqCst), 1);
}

#[test]
fn many_sessions_interleave_without_starvation() {
    let rig = Arc::new(rig());
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let rig = rig.clone();
            thread::spawn(move || {
                let key = [i as u8; 16];
                let iv = [i as u8; 16];
                let msg: Vec<u8> = (0..4096u16).map(|b| (b % 256) as u8).collect();
                let session = rig
                    .engine
                    .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &key, Some(&iv))
                    .unwrap();
                let mut ct = vec![0u8; msg.len()];
                rig.engine
                    .cipher_run_bytes(&session, &msg, &mut ct, true)
                    .unwrap();

                let session = rig
                    .engine
                    .open_cipher(CipherAlgo::Aes, CipherMode::Cbc, &key, Some(&iv))
                    .unwrap();
                let mut plain = vec![0u8; msg.len()];
                rig.engine
                    .cipher_run_bytes(&session, &ct, &mut plain, false)
                    .unwrap();
                assert_eq!(plain, msg);
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
}

#[test]
fn swallowed_token_times_out() {
    let rig = rig_fast_timeout();
    rig.periph.inject_fault(FaultInjection::DropNextResult, 0);
    let session = rig.engine.open_hash(HashAlgo::Sha256, None).unwrap();
    assert_eq!(
        rig.engine.hash_update_bytes(&session, b"data", true).err(),
        Some(CipherError::Timeout)
    );
    // the timed-out update left the session retryable; the engine
    // recovered once the next token got a result
    let digest = rig
        .engine
        .hash_update_bytes(&session, b"data", true)
        .unwrap()
        .unwrap();
    assert_eq!(digest, Sha256::digest(b"data").to_vec());
}
