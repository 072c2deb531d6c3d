// virtchan-replay - Recorded samples
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Recorded samples in wide CSV format.
//!
//! The first column is `timestamp_ms`, every further column is one channel.
//! Empty cells mean the channel has no sample at that timestamp.
//!
//! ```text
//! timestamp_ms,pv,load
//! 1000,0.0,250.0
//! 1500,,310.0
//! 2000,480.0,
//! ```

use crate::error::ReplayError;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};
use virtchan::{ChannelClass, MemorySource, Tuple};

/// Samples per channel, as read from CSV.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Channel names in column order.
    pub channels: Vec<String>,
    samples: BTreeMap<String, Vec<Tuple>>,
}

impl Dataset {
    /// Load a CSV file.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Parse CSV from any reader.
    pub fn from_reader<R: Read>(input: R) -> Result<Self, ReplayError> {
        let mut reader = csv::Reader::from_reader(input);

        let headers = reader.headers()?.clone();
        let header_strs: Vec<&str> = headers.iter().map(|h| h.trim()).collect();
        if header_strs.first() != Some(&"timestamp_ms") {
            return Err(ReplayError::InvalidFormat(
                "First column must be 'timestamp_ms'".to_string(),
            ));
        }

        let channels: Vec<String> = header_strs[1..].iter().map(|s| s.to_string()).collect();
        let mut samples: BTreeMap<String, Vec<Tuple>> =
            channels.iter().map(|c| (c.clone(), Vec::new())).collect();

        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let mut fields = record.iter();

            let Some(ts) = fields.next() else {
                continue;
            };
            let timestamp: i64 = ts.trim().parse().map_err(|_| {
                ReplayError::InvalidFormat(format!("Invalid timestamp on row {}: {}", line + 1, ts))
            })?;

            for (channel, field) in channels.iter().zip(fields) {
                let field = field.trim();
                if field.is_empty() {
                    continue;
                }
                match field.parse::<f64>() {
                    Ok(value) => {
                        if let Some(series) = samples.get_mut(channel) {
                            series.push(Tuple::new(timestamp, value));
                        }
                    }
                    Err(_) => warn!(
                        "Skipping unparsable value {:?} for {} at {}",
                        field, channel, timestamp
                    ),
                }
            }
        }

        let dataset = Self { channels, samples };
        if dataset.sample_count() == 0 {
            return Err(ReplayError::EmptyDataset);
        }
        debug!(
            "Parsed {} channels, {} samples",
            dataset.channels.len(),
            dataset.sample_count()
        );
        Ok(dataset)
    }

    /// Total number of samples over all channels.
    pub fn sample_count(&self) -> usize {
        self.samples.values().map(|s| s.len()).sum()
    }

    /// Samples of one channel.
    pub fn samples(&self, channel: &str) -> Option<&[Tuple]> {
        self.samples.get(channel).map(|s| s.as_slice())
    }

    /// Earliest and latest timestamp over all channels.
    pub fn span(&self) -> Option<(i64, i64)> {
        let timestamps = self.samples.values().flatten().map(|t| t.timestamp);
        let min = timestamps.clone().min()?;
        let max = timestamps.max()?;
        Some((min, max))
    }

    /// Turn into a sample source; channels absent from `classes` are
    /// instantaneous.
    pub fn into_source(self, classes: &HashMap<String, ChannelClass>) -> MemorySource {
        let mut source = MemorySource::new();
        for (channel, series) in self.samples {
            let class = classes.get(&channel).copied().unwrap_or_default();
            source.insert(channel, class, series);
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use virtchan::SampleSource;

    const CSV: &str = "timestamp_ms,pv,load\n1000,0.0,250.0\n1500,,310.0\n2000,480.0,\n";

    fn create_test_csv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", CSV).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_csv() {
        let file = create_test_csv();
        let dataset = Dataset::from_csv(file.path()).expect("Failed to parse CSV");

        assert_eq!(dataset.channels, vec!["pv", "load"]);
        assert_eq!(dataset.sample_count(), 4);
        assert_eq!(
            dataset.samples("pv").unwrap(),
            &[Tuple::new(1000, 0.0), Tuple::new(2000, 480.0)]
        );
        assert_eq!(dataset.span(), Some((1000, 2000)));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Dataset::from_csv("/nonexistent/samples.csv"),
            Err(ReplayError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_bad_header() {
        let result = Dataset::from_reader("time,pv\n1,2\n".as_bytes());
        assert!(matches!(result, Err(ReplayError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_timestamp() {
        let result = Dataset::from_reader("timestamp_ms,pv\nnoon,2\n".as_bytes());
        assert!(matches!(result, Err(ReplayError::InvalidFormat(_))));
    }

    #[test]
    fn test_empty_dataset() {
        let result = Dataset::from_reader("timestamp_ms,pv\n".as_bytes());
        assert!(matches!(result, Err(ReplayError::EmptyDataset)));
    }

    #[test]
    fn test_into_source_with_classes() {
        let dataset = Dataset::from_reader(CSV.as_bytes()).unwrap();
        let classes = HashMap::from([("load".to_string(), ChannelClass::Cumulative)]);
        let source = dataset.into_source(&classes);

        assert_eq!(source.channel_class("load").unwrap(), ChannelClass::Cumulative);
        assert_eq!(source.channel_class("pv").unwrap(), ChannelClass::Instantaneous);
        assert_eq!(source.sample_count("load"), Some(2));
    }
}
