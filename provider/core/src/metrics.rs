/// Counter/gauge sink for provider instrumentation.
///
/// Implementations must be cheap and non-blocking; handlers fire metrics on
/// the request path.
pub trait Stats: Send + Sync {
    fn incr(&self, name: &str, tags: &[(&str, &str)]);

    fn gauge(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Discards all metrics. Used in tests and when no sink is configured.
#[derive(Debug, Default)]
pub struct NoopStats;

impl Stats for NoopStats {
    fn incr(&self, _name: &str, _tags: &[(&str, &str)]) {}

    fn gauge(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}
