use crate::model::ConvergencePoint;

/// Summary of one run's convergence series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceStats {
    pub samples: usize,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Compute convergence statistics (last, min, max, mean) over the parseable values.
/// Points whose value is not a number are skipped.
pub fn compute_convergence_stats(series: &[ConvergencePoint]) -> Option<ConvergenceStats> {
    let values: Vec<f64> = series
        .iter()
        .filter_map(|p| p.value.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect();
    let last = *values.last()?;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(ConvergenceStats {
        samples: values.len(),
        last,
        min,
        max,
        mean,
    })
}
