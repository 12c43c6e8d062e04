// Licensed under the Apache-2.0 license

//! Just enough big-number arithmetic for the PK unit model: schoolbook
//! multiply and shift-subtract reduction, square-and-multiply
//! exponentiation. Operands arrive little-endian, as the driver stages
//! them.

type Limbs = Vec<u64>;

fn to_limbs(le_bytes: &[u8]) -> Limbs {
    le_bytes
        .chunks(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b[..c.len()].copy_from_slice(c);
            u64::from_le_bytes(b)
        })
        .collect()
}

fn trim(x: &mut Limbs) {
    while x.last() == Some(&0) {
        x.pop();
    }
}

fn is_zero(x: &[u64]) -> bool {
    x.iter().all(|&l| l == 0)
}

fn cmp(a: &[u64], b: &[u64]) -> std::cmp::Ordering {
    let len = a.len().max(b.len());
    for i in (0..len).rev() {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        if x != y {
            return x.cmp(&y);
        }
    }
    std::cmp::Ordering::Equal
}

/// a -= b, assuming a >= b.
fn sub_assign(a: &mut Limbs, b: &[u64]) {
    let mut borrow = 0u64;
    for i in 0..a.len() {
        let (d1, b1) = a[i].overflowing_sub(b.get(i).copied().unwrap_or(0));
        let (d2, b2) = d1.overflowing_sub(borrow);
        a[i] = d2;
        borrow = (b1 || b2) as u64;
    }
    debug_assert_eq!(borrow, 0);
}

fn shl1(x: &mut Limbs) {
    let mut carry = 0u64;
    for limb in x.iter_mut() {
        let new_carry = *limb >> 63;
        *limb = (*limb << 1) | carry;
        carry = new_carry;
    }
    if carry != 0 {
        x.push(carry);
    }
}

fn mul(a: &[u64], b: &[u64]) -> Limbs {
    let mut out = vec![0u64; a.len() + b.len()];
    for (i, &x) in a.iter().enumerate() {
        if x == 0 {
            continue;
        }
        let mut carry = 0u128;
        for (j, &y) in b.iter().enumerate() {
            let acc = out[i + j] as u128 + (x as u128) * (y as u128) + carry;
            out[i + j] = acc as u64;
            carry = acc >> 64;
        }
        let mut k = i + b.len();
        while carry != 0 {
            let acc = out[k] as u128 + carry;
            out[k] = acc as u64;
            carry = acc >> 64;
            k += 1;
        }
    }
    trim(&mut out);
    out
}

/// x mod m by bitwise shift-subtract.
fn reduce(x: &[u64], m: &[u64]) -> Limbs {
    if cmp(x, m) == std::cmp::Ordering::Less {
        let mut r = x.to_vec();
        trim(&mut r);
        return r;
    }
    let mut r: Limbs = Vec::with_capacity(m.len() + 1);
    for i in (0..x.len() * 64).rev() {
        shl1(&mut r);
        if x[i / 64] >> (i % 64) & 1 == 1 {
            if r.is_empty() {
                r.push(1);
            } else {
                r[0] |= 1;
            }
        }
        if cmp(&r, m) != std::cmp::Ordering::Less {
            sub_assign(&mut r, m);
            trim(&mut r);
        }
    }
    r
}

fn mulmod(a: &[u64], b: &[u64], m: &[u64]) -> Limbs {
    reduce(&mul(a, b), m)
}

/// base^exp mod modulus, all little-endian byte strings. Returns
/// `modulus.len()` bytes, or `None` for a zero modulus.
pub(crate) fn modexp_le(base: &[u8], exp: &[u8], modulus: &[u8]) -> Option<Vec<u8>> {
    let m = {
        let mut m = to_limbs(modulus);
        trim(&mut m);
        m
    };
    if is_zero(&m) {
        return None;
    }

    let b = reduce(&to_limbs(base), &m);
    let one = vec![1u64];
    let mut acc = reduce(&one, &m);

    let exp_limbs = to_limbs(exp);
    let mut started = false;
    for i in (0..exp_limbs.len() * 64).rev() {
        let bit = exp_limbs[i / 64] >> (i % 64) & 1;
        if !started {
            if bit == 0 {
                continue;
            }
            started = true;
        }
        acc = mulmod(&acc, &acc, &m);
        if bit == 1 {
            acc = mulmod(&acc, &b, &m);
        }
    }

    let mut out = vec![0u8; modulus.len()];
    for (i, limb) in acc.iter().enumerate() {
        for (j, byte) in limb.to_le_bytes().iter().enumerate() {
            if let Some(slot) = out.get_mut(i * 8 + j) {
                *slot = *byte;
            }
        }
    }
    Some(out)
}
