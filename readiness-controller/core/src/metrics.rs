use crate::{SharedTracker, Stats};
use prometheus_client::{
    collector::Collector,
    encoding::{DescriptorEncoder, EncodeMetric},
    metrics::{gauge::ConstGauge, MetricType},
    registry::Registry,
};

#[derive(Debug)]
struct Instrumented(SharedTracker);

pub fn register(reg: &mut Registry, tracker: SharedTracker) {
    reg.register_collector(Box::new(Instrumented(tracker)));
}

impl Collector for Instrumented {
    fn encode(&self, mut encoder: DescriptorEncoder<'_>) -> Result<(), std::fmt::Error> {
        let satisfied_encoder = encoder.encode_descriptor(
            "tracker_satisfied",
            "Whether every tracked expectation has been observed",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(i64::from(self.0.satisfied())).encode(satisfied_encoder)?;

        let populated_encoder = encoder.encode_descriptor(
            "tracker_populated",
            "Whether every tracked kind has been listed",
            None,
            MetricType::Gauge,
        )?;
        ConstGauge::new(i64::from(self.0.populated())).encode(populated_encoder)?;

        let kinds = self.0.stats();

        let mut expected_encoder = encoder.encode_descriptor(
            "kind_expected",
            "The number of objects tracked for a kind",
            None,
            MetricType::Gauge,
        )?;
        for (category, gvk, stats) in &kinds {
            let kind = gvk.to_string();
            let labels = vec![("category", category.as_str()), ("kind", kind.as_str())];
            let expected = ConstGauge::new(stats.expected as i64);
            expected.encode(expected_encoder.encode_family(&labels)?)?;
        }

        let mut unobserved_encoder = encoder.encode_descriptor(
            "kind_unobserved",
            "The number of tracked objects of a kind that have not been observed",
            None,
            MetricType::Gauge,
        )?;
        for (category, gvk, stats) in &kinds {
            let kind = gvk.to_string();
            let labels = vec![("category", category.as_str()), ("kind", kind.as_str())];
            let unobserved = ConstGauge::new(unobserved(stats) as i64);
            unobserved.encode(unobserved_encoder.encode_family(&labels)?)?;
        }

        let mut populated_encoder = encoder.encode_descriptor(
            "kind_populated",
            "Whether a kind has been listed",
            None,
            MetricType::Gauge,
        )?;
        for (category, gvk, stats) in &kinds {
            let kind = gvk.to_string();
            let labels = vec![("category", category.as_str()), ("kind", kind.as_str())];
            let populated = ConstGauge::new(i64::from(stats.populated));
            populated.encode(populated_encoder.encode_family(&labels)?)?;
        }

        Ok(())
    }
}

fn unobserved(stats: &Stats) -> usize {
    stats.expected.saturating_sub(stats.observed)
}
