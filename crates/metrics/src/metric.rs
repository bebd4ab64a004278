use kman_core::ManagerError;

/// A metric whose source data is refreshed on a schedule.
///
/// `calculate_value` only kicks off background work; reading the gauge never
/// waits on the cluster.
pub trait ScheduleCalculatedMetric: Send + Sync {
    fn calculate_value(&self) -> Result<(), ManagerError>;
}

pub trait Gauge: Send + Sync {
    /// `None` when the value cannot be determined right now.
    fn value(&self) -> Option<f64>;

    /// Exposition value: an unknown value is NaN so one failing resource
    /// never breaks the others.
    fn gauge_value(&self) -> f64 {
        self.value().unwrap_or(f64::NAN)
    }
}

pub trait CalculatedGauge: ScheduleCalculatedMetric + Gauge {}

impl<T: ScheduleCalculatedMetric + Gauge> CalculatedGauge for T {}

/// Replace every character outside `[A-Za-z0-9_/-]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/') { c } else { '_' })
        .collect()
}
