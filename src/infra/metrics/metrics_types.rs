use std::borrow::Cow;

use metrics::Label;
use metrics::describe_counter;
use metrics::describe_gauge;
use metrics::describe_histogram;

use crate::ext::not;

// -----------------------------------------------------------------------------
// Metric
// -----------------------------------------------------------------------------

/// Metric definition.
pub(super) struct Metric {
    pub(super) kind: &'static str,
    pub(super) name: &'static str,
    pub(super) description: &'static str,
    pub(super) buckets: Vec<f64>,
}

impl Metric {
    /// Checks if metric has custom buckets defined.
    pub(super) fn has_custom_buckets(&self) -> bool {
        not(self.buckets.is_empty())
    }

    /// Register description with the provider.
    pub(super) fn register_description(&self) {
        match self.kind {
            "counter" => describe_counter!(self.name, self.description),
            "histogram_duration" | "histogram_counter" => describe_histogram!(self.name, self.description),
            "gauge" => describe_gauge!(self.name, self.description),
            _ => {}
        }
    }
}

// -----------------------------------------------------------------------------
// MetricLabelValue
// -----------------------------------------------------------------------------

/// Representation of a metric label value.
///
/// It exists to improve two aspects `metrics` crate does not cover:
/// * Conversion from several types to a label value.
/// * Handling of optional values.
pub enum MetricLabelValue {
    /// Label has a value and should be recorded.
    Some(String),
    /// Label does not have a value and should be ignored.
    None,
}

impl From<Option<Cow<'static, str>>> for MetricLabelValue {
    fn from(value: Option<Cow<'static, str>>) -> Self {
        match value {
            Some(str) => Self::Some(str.into_owned()),
            None => Self::None,
        }
    }
}

impl From<&str> for MetricLabelValue {
    fn from(value: &str) -> Self {
        Self::Some(value.to_owned())
    }
}

impl From<&String> for MetricLabelValue {
    fn from(value: &String) -> Self {
        Self::Some(value.clone())
    }
}

impl From<Option<&str>> for MetricLabelValue {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(value) => Self::Some(value.to_owned()),
            None => Self::None,
        }
    }
}

impl From<String> for MetricLabelValue {
    fn from(value: String) -> Self {
        Self::Some(value)
    }
}

impl From<bool> for MetricLabelValue {
    fn from(value: bool) -> Self {
        Self::Some(value.to_string())
    }
}

/// Converts a list of label keys-value pairs to `metrics::Label`. Labels with missing values are filtered out.
pub(super) fn into_labels(labels: Vec<(&'static str, MetricLabelValue)>) -> Vec<Label> {
    labels
        .into_iter()
        .filter_map(|(key, value)| match value {
            MetricLabelValue::Some(value) => Some((key, value)),
            MetricLabelValue::None => None,
        })
        .map(|(key, value)| Label::new(key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_without_value_are_dropped() {
        let labels = into_labels(vec![("chain", "hoodi".into()), ("asset", MetricLabelValue::None), ("success", true.into())]);
        let keys: Vec<&str> = labels.iter().map(|label| label.key()).collect();
        assert_eq!(keys, vec!["chain", "success"]);
    }

    #[test]
    fn relay_histograms_declare_buckets() {
        let metrics = super::super::metrics_for_relay_transfer();
        let submission = metrics.iter().find(|metric| metric.name == "relayer_relay_submission").unwrap();
        assert!(submission.has_custom_buckets());

        let flush = super::super::metrics_for_relay_checkpoint();
        assert!(flush.iter().all(|metric| metric.name.starts_with("relayer_")));
    }
}
