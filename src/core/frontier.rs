use serde::Serialize;

use super::solver::{portfolio_moments, validate_inputs};
use super::types::Inputs;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RiskTolerance {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierPoint {
    pub equity: f64,
    pub mean: f64,
    pub vol: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierSweep {
    pub points: Vec<FrontierPoint>,
    pub selected: FrontierPoint,
}

/// Periodic mean and volatility for every candidate equity/debt mix,
/// plus the mix matching the stated risk tolerance: maximum return
/// for `High`, minimum volatility for `Low`, and the point closest to
/// the sweep's average return for `Moderate`.
pub fn sweep_frontier(inputs: &Inputs, tolerance: RiskTolerance) -> Result<FrontierSweep, String> {
    validate_inputs(inputs)?;

    let steps = inputs.allocation_steps;
    let span = inputs.allocation_max - inputs.allocation_min;
    let mut points = Vec::with_capacity(steps);
    for i in 0..steps {
        let equity = if steps == 1 {
            inputs.allocation_min
        } else {
            inputs.allocation_min + span * i as f64 / (steps - 1) as f64
        };
        let (mean, vol) = portfolio_moments(inputs, equity);
        points.push(FrontierPoint { equity, mean, vol });
    }

    let selected = match tolerance {
        RiskTolerance::High => pick_by(&points, |p| p.mean),
        RiskTolerance::Low => pick_by(&points, |p| -p.vol),
        RiskTolerance::Moderate => {
            let average = points.iter().map(|p| p.mean).sum::<f64>() / points.len() as f64;
            pick_by(&points, |p| -(p.mean - average).abs())
        }
    };

    Ok(FrontierSweep { points, selected })
}

fn pick_by(points: &[FrontierPoint], score: impl Fn(&FrontierPoint) -> f64) -> FrontierPoint {
    let mut best = points[0];
    let mut best_score = score(&best);
    for &point in &points[1..] {
        let s = score(&point);
        if s > best_score {
            best = point;
            best_score = s;
        }
    }
    best
}
