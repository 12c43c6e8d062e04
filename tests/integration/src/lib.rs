// Licensed under the Apache-2.0 license

//! End-to-end scenarios driving `eip130-driver` against the emulated
//! engine.

#[cfg(test)]
mod common;
#[cfg(test)]
mod test_asset;
#[cfg(test)]
mod test_cipher;
#[cfg(test)]
mod test_hash;
#[cfg(test)]
mod test_pk;
#[cfg(test)]
mod test_queue;
#[cfg(test)]
mod test_rng;
