//! Gas price settings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::ledger::types::{GasPrices, TxIntent};

/// Preferred gas price for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum GasSetting {
    Slow,
    #[default]
    Average,
    Fast,
    /// Explicit price in gwei.
    Gwei(f64),
}

impl GasSetting {
    /// Whether the price follows the ledger's current auto prices.
    pub fn is_auto(&self) -> bool {
        !matches!(self, GasSetting::Gwei(_))
    }

    /// Price in gwei for this setting given the current prices.
    ///
    /// A non-finite or negative explicit price falls back to `average`.
    pub fn price_gwei(&self, prices: &GasPrices) -> f64 {
        match *self {
            GasSetting::Slow => prices.slow,
            GasSetting::Average => prices.average,
            GasSetting::Fast => prices.fast,
            GasSetting::Gwei(gwei) if gwei.is_finite() && gwei >= 0.0 => gwei,
            GasSetting::Gwei(_) => prices.average,
        }
    }
}

impl FromStr for GasSetting {
    type Err = String;

    /// Accepts `slow`, `average`, `fast` or a price in gwei.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(GasSetting::Slow),
            "average" => Ok(GasSetting::Average),
            "fast" => Ok(GasSetting::Fast),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|gwei| gwei.is_finite() && *gwei >= 0.0)
                .map(GasSetting::Gwei)
                .ok_or_else(|| format!("invalid gas setting '{s}'")),
        }
    }
}

/// Chooses a gas setting for each intent as it is queued.
pub type GasSettingProvider = Arc<dyn Fn(&TxIntent) -> GasSetting + Send + Sync>;

pub fn gwei_to_wei(gwei: f64) -> u128 {
    // Float to int casts saturate, so negatives become 0
    (gwei * 1e9).round() as u128
}

/// Gas price in wei for `setting`. Auto prices are capped at
/// `max_auto_gwei`; explicit prices are used as given.
pub fn resolve_gas_price(setting: GasSetting, prices: &GasPrices, max_auto_gwei: f64) -> u128 {
    let mut gwei = setting.price_gwei(prices);
    if setting.is_auto() && gwei > max_auto_gwei {
        tracing::warn!(
            setting = ?setting,
            price_gwei = gwei,
            max_gwei = max_auto_gwei,
            "Auto gas price above cap, clamping"
        );
        gwei = max_auto_gwei;
    }
    gwei_to_wei(gwei)
}
