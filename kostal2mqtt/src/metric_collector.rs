use crate::canonical_record::CanonicalRecord;

/// An output channel. Called once per poll cycle with either a successful or a failed record;
/// implementations log their own failures instead of returning them.
pub trait MetricCollector: Send {
    fn publish(&mut self, record: &CanonicalRecord);
}
