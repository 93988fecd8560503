use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnStats {
    /// Number of period-over-period returns, one less than the number
    /// of prices.
    pub observations: usize,
    pub mean_return: f64,
    pub annualized_return: f64,
}

/// Expected periodic and annualized return from an ordered price
/// series spanning `years`: the mean simple return compounded over
/// the observation count, then rescaled to one year.
pub fn price_series_stats(prices: &[f64], years: f64) -> Result<ReturnStats, String> {
    if prices.len() < 2 {
        return Err("prices must contain at least 2 observations".to_string());
    }
    if !years.is_finite() || years <= 0.0 {
        return Err("years must be > 0".to_string());
    }
    for &price in prices {
        if !price.is_finite() || price <= 0.0 {
            return Err("prices must be positive and finite".to_string());
        }
    }

    let observations = prices.len() - 1;
    let mut total = 0.0;
    for pair in prices.windows(2) {
        total += pair[1] / pair[0] - 1.0;
    }
    let mean_return = total / observations as f64;

    let annualized_return = (1.0 + mean_return).powf(observations as f64 / years) - 1.0;
    if !annualized_return.is_finite() {
        return Err("annualized_return is not finite for these prices".to_string());
    }

    Ok(ReturnStats {
        observations,
        mean_return,
        annualized_return,
    })
}
