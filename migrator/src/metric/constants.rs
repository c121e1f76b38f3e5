// This code is licensed under Elastic License 2.0
// https://www.elastic.co/licensing/elastic-license

/// Number of entries per time series block.
pub(crate) static BLOCK_SIZE_FOR_TIME_SERIES: usize = 128;

/// Separator between the label name and label value to create a label term. For example,
/// if the label name is 'instance' and the value is 'host:9090', and the LABEL_SEPARATOR is '~',
/// in the postings map this will be stored as 'instance~host:9090'.
pub const LABEL_SEPARATOR: &str = "~";

/// The label holding the metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// The label identifying a scrape target. This is the default partition label for sharding.
pub const INSTANCE_LABEL: &str = "instance";
