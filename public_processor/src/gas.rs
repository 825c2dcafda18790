//! Gas accounting and fee arithmetic.
//!
//! Gas is metered in two independent dimensions: data-availability gas and
//! L2 compute gas. Phase limits, teardown allocations and fee math all
//! operate component-wise; subtraction saturates at zero per component so a
//! misbehaving claim can never underflow the meter.

use ethereum_types::U256;
use serde::{Deserialize, Serialize};

/// A two-dimensional gas amount.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Gas {
    /// Data-availability gas.
    pub da_gas: u64,
    /// L2 compute gas.
    pub l2_gas: u64,
}

impl Gas {
    /// A gas amount from its two components.
    pub const fn new(da_gas: u64, l2_gas: u64) -> Self {
        Self { da_gas, l2_gas }
    }

    /// The zero amount.
    pub const fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Component-wise saturating addition.
    pub fn add(self, other: Self) -> Self {
        Self::new(
            self.da_gas.saturating_add(other.da_gas),
            self.l2_gas.saturating_add(other.l2_gas),
        )
    }

    /// Component-wise subtraction, saturating at zero per component.
    pub fn sub(self, other: Self) -> Self {
        Self::new(
            self.da_gas.saturating_sub(other.da_gas),
            self.l2_gas.saturating_sub(other.l2_gas),
        )
    }

    /// Whether this amount is at least `other` in every component.
    pub fn covers(&self, other: &Self) -> bool {
        self.da_gas >= other.da_gas && self.l2_gas >= other.l2_gas
    }

    /// The fee due for this amount at the given prices. Saturates at
    /// `U256::MAX`; prices are client-supplied and must not be able to
    /// panic the meter.
    pub fn compute_fee(&self, fees: &GasFees) -> U256 {
        fees.fee_per_da_gas
            .saturating_mul(U256::from(self.da_gas))
            .saturating_add(fees.fee_per_l2_gas.saturating_mul(U256::from(self.l2_gas)))
    }
}

/// Per-dimension gas prices.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GasFees {
    /// Price of one unit of data-availability gas.
    pub fee_per_da_gas: U256,
    /// Price of one unit of L2 compute gas.
    pub fee_per_l2_gas: U256,
}

impl GasFees {
    /// Prices from their two components.
    pub fn new(fee_per_da_gas: U256, fee_per_l2_gas: U256) -> Self {
        Self {
            fee_per_da_gas,
            fee_per_l2_gas,
        }
    }
}

/// The gas terms a transaction commits to up front.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GasSettings {
    /// Gas available to the setup and app-logic phases combined.
    pub gas_limits: Gas,
    /// Gas allocated to the teardown phase, independent of consumption in
    /// prior phases.
    pub teardown_gas_limits: Gas,
    /// The highest per-dimension prices the sender agrees to pay.
    pub max_fees_per_gas: GasFees,
    /// Flat fee charged for inclusion regardless of execution.
    pub inclusion_fee: U256,
}

impl GasSettings {
    /// The worst-case fee these settings can incur, which is what the
    /// fee-payer precheck must see covered before any execution starts.
    pub fn fee_limit(&self) -> U256 {
        self.inclusion_fee.saturating_add(
            self.gas_limits
                .add(self.teardown_gas_limits)
                .compute_fee(&self.max_fees_per_gas),
        )
    }
}

/// Actual consumption per phase, recorded on the processed transaction.
///
/// Billing uses the full teardown *allocation* rather than `teardown`; the
/// actuals stay visible here for observability.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PerPhaseGas {
    /// Gas used by the non-revertible setup calls.
    pub setup: Gas,
    /// Gas used by the revertible app-logic calls.
    pub app_logic: Gas,
    /// Gas actually used by the teardown call.
    pub teardown: Gas,
}
