//! Risk-based position sizing.
//!
//! Formula: `lot_size = risk_amount / (stop_pips * pip_value_per_lot)`
//! with `risk_amount = equity * risk_percent / 100`. The projected
//! loss of a valid result reconciles with the risk amount by
//! construction; margin is validated against equity before a result
//! is marked valid.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::{AccountType, RiskConfig};

/// Pip values per standard lot in USD for common instruments.
const PIP_VALUES: &[(&str, f64)] = &[
    ("EURUSD", 10.0),
    ("GBPUSD", 10.0),
    ("AUDUSD", 10.0),
    ("NZDUSD", 10.0),
    ("USDCHF", 10.0),
    ("USDCAD", 10.0),
    ("USDJPY", 9.1),
    ("EURJPY", 9.1),
    ("GBPJPY", 9.1),
    ("XAUUSD", 10.0),
    ("BTCUSD", 1.0),
    ("BTCUSDT", 1.0),
    ("ETHUSD", 1.0),
    ("ETHUSDT", 1.0),
];

const DEFAULT_PIP_VALUE: f64 = 10.0;

/// Venue's practical minimum lot size; below this a non-fatal warning
/// is attached.
const MIN_PRACTICAL_LOT: f64 = 0.01;

/// Outcome of sizing a candidate trade. If `valid` is false no order
/// may be placed from this result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeResult {
    pub lot_size: f64,
    pub units: u64,
    pub risk_amount: f64,
    pub risk_percent_applied: f64,
    pub stop_pips: f64,
    pub projected_loss: f64,
    pub projected_gain: f64,
    pub margin_required: f64,
    pub valid: bool,
    pub warning: Option<String>,
}

/// Advisory re-validation of a proposed lot size, used by manual and
/// override paths. Blocking errors and non-blocking warnings are kept
/// separate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub margin_required: f64,
    pub margin_percent: f64,
    pub risk_percent: f64,
    pub risk_reward_ratio: f64,
}

/// Snapshot of the sizer's account parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub equity: f64,
    pub leverage: u32,
    pub account_type: AccountType,
    pub max_risk_percent: f64,
    pub default_risk_percent: f64,
    pub max_risk_amount: f64,
}

/// Converts candidate trades into validated order quantities against
/// account risk limits.
pub struct PositionSizer {
    config: RiskConfig,
}

impl PositionSizer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn equity(&self) -> f64 {
        self.config.equity
    }

    /// Update equity after a trade settles.
    pub fn update_equity(&mut self, equity: f64) {
        self.config.equity = equity;
    }

    /// Minimum meaningful price increment for the instrument family.
    pub fn pip_size(symbol: &str) -> f64 {
        let s = symbol.to_uppercase();
        if s.contains("JPY") {
            0.01
        } else if s.contains("BTC") || s.contains("ETH") {
            1.0
        } else if s.contains("XAU") {
            0.1
        } else {
            0.0001
        }
    }

    /// Pip value for `lot_size` lots of `symbol`, adjusted for the
    /// account's lot convention.
    pub fn pip_value(&self, symbol: &str, lot_size: f64) -> f64 {
        let key = symbol.to_uppercase().replace('/', "");
        let base = PIP_VALUES
            .iter()
            .find(|(s, _)| *s == key)
            .map(|(_, v)| *v)
            .unwrap_or(DEFAULT_PIP_VALUE);

        let type_multiplier =
            self.config.account_type.lot_units() / AccountType::Standard.lot_units();

        base * lot_size * type_multiplier
    }

    /// Distance between two prices expressed in pips.
    pub fn pips_between(symbol: &str, a: f64, b: f64) -> f64 {
        (a - b).abs() / Self::pip_size(symbol)
    }

    /// Size a candidate trade. `risk_percent` defaults to the
    /// configured per-trade risk and is clamped to the maximum with a
    /// warning.
    pub fn size(
        &self,
        symbol: &str,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        risk_percent: Option<f64>,
    ) -> PositionSizeResult {
        let mut risk_percent = risk_percent.unwrap_or(self.config.default_risk_percent);

        let mut warning = None;
        if risk_percent > self.config.max_risk_percent {
            let msg = format!(
                "Requested risk {:.2}% exceeds maximum {:.2}%, clamped",
                risk_percent, self.config.max_risk_percent
            );
            warn!("{}", msg);
            warning = Some(msg);
            risk_percent = self.config.max_risk_percent;
        }

        let risk_amount = self.config.equity * (risk_percent / 100.0);
        let stop_pips = Self::pips_between(symbol, entry_price, stop_price);

        if stop_pips <= 0.0 {
            return PositionSizeResult {
                lot_size: 0.0,
                units: 0,
                risk_amount,
                risk_percent_applied: risk_percent,
                stop_pips: 0.0,
                projected_loss: 0.0,
                projected_gain: 0.0,
                margin_required: 0.0,
                valid: false,
                warning: Some("Invalid stop distance".to_string()),
            };
        }

        let pip_value_per_lot = self.pip_value(symbol, 1.0);
        let lot_size = risk_amount / (stop_pips * pip_value_per_lot);
        let units = (lot_size * self.config.account_type.lot_units()) as u64;
        let margin_required = units as f64 * entry_price / self.config.leverage as f64;

        let projected_loss = stop_pips * pip_value_per_lot * lot_size;
        let target_pips = Self::pips_between(symbol, entry_price, target_price);
        let projected_gain = target_pips * pip_value_per_lot * lot_size;

        let mut valid = true;
        if margin_required > self.config.equity {
            valid = false;
            let msg = format!(
                "Margin required (${:.2}) exceeds equity (${:.2})",
                margin_required, self.config.equity
            );
            warn!("{}", msg);
            warning = Some(msg);
        }

        if lot_size < MIN_PRACTICAL_LOT {
            let msg = format!(
                "Lot size very small ({:.4}), consider a micro account",
                lot_size
            );
            warning = match warning {
                Some(w) => Some(format!("{} | {}", w, msg)),
                None => Some(msg),
            };
        }

        PositionSizeResult {
            lot_size,
            units,
            risk_amount,
            risk_percent_applied: risk_percent,
            stop_pips,
            projected_loss,
            projected_gain,
            margin_required,
            valid,
            warning,
        }
    }

    /// Independently re-derive margin, risk and reward figures for a
    /// proposed lot size. Margin above 90% of equity or risk above the
    /// configured maximum are blocking; high margin usage, a tight
    /// stop, or a sub-1 reward:risk ratio are warnings only.
    pub fn validate(
        &self,
        symbol: &str,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        lot_size: f64,
    ) -> TradeValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let units = (lot_size * self.config.account_type.lot_units()) as u64;
        let margin_required = units as f64 * entry_price / self.config.leverage as f64;
        let margin_percent = margin_required / self.config.equity * 100.0;

        if margin_required > self.config.equity * 0.9 {
            errors.push(format!(
                "Margin (${:.2}) exceeds 90% of equity",
                margin_required
            ));
        } else if margin_required > self.config.equity * 0.5 {
            warnings.push(format!("High margin usage: {:.1}%", margin_percent));
        }

        let stop_pips = Self::pips_between(symbol, entry_price, stop_price);
        if stop_pips < 5.0 {
            warnings.push(format!(
                "Stop very close ({:.1} pips), watch the spread",
                stop_pips
            ));
        }

        let risk_amount = stop_pips * self.pip_value(symbol, lot_size);
        let risk_percent = risk_amount / self.config.equity * 100.0;
        if risk_percent > self.config.max_risk_percent {
            errors.push(format!(
                "Risk ({:.2}%) exceeds maximum ({:.2}%)",
                risk_percent, self.config.max_risk_percent
            ));
        }

        let target_pips = Self::pips_between(symbol, entry_price, target_price);
        let risk_reward_ratio = if stop_pips > 0.0 {
            target_pips / stop_pips
        } else {
            0.0
        };
        if risk_reward_ratio < 1.0 {
            warnings.push(format!(
                "Low reward:risk ({:.2}), consider a wider target",
                risk_reward_ratio
            ));
        }

        TradeValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            margin_required,
            margin_percent,
            risk_percent,
            risk_reward_ratio,
        }
    }

    pub fn account_summary(&self) -> AccountSummary {
        AccountSummary {
            equity: self.config.equity,
            leverage: self.config.leverage,
            account_type: self.config.account_type,
            max_risk_percent: self.config.max_risk_percent,
            default_risk_percent: self.config.default_risk_percent,
            max_risk_amount: self.config.equity * (self.config.max_risk_percent / 100.0),
        }
    }
}
