// Licensed under the Apache-2.0 license

use crate::common::rig;

#[test]
fn random_fills_multi_page_buffers() {
    let rig = rig();
    let mut first = vec![0u8; 10_000];
    rig.engine.random(&mut first).unwrap();
    assert!(first.iter().any(|&b| b != 0));
    // the tail pages got filled too
    assert!(first[8192..].iter().any(|&b| b != 0));

    let mut second = vec![0u8; 10_000];
    rig.engine.random(&mut second).unwrap();
    assert_ne!(first, second);
}

#[test]
fn zero_length_request_is_a_no_op() {
    let rig = rig();
    let mut empty: [u8; 0] = [];
    rig.engine.random(&mut empty).unwrap();
}

#[test]
fn small_requests_work_after_large_ones() {
    let rig = rig();
    let mut big = vec![0u8; 4096];
    rig.engine.random(&mut big).unwrap();
    let mut small = [0u8; 3];
    rig.engine.random(&mut small).unwrap();
}
