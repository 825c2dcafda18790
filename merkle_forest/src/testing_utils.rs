//! Helpers shared across this crate's tests.

use ethereum_types::H256;

/// Initializes logging for tests that want to observe tree traces.
pub(crate) fn common_setup() {
    let _ = pretty_env_logger::try_init();
}

/// A leaf value from a small integer.
pub(crate) fn h256(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}
