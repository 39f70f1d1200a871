//! Bulk aggregation of the per-sample weights stream.

use serde::Serialize;

use nl_core::{Error, ErrorKind, FromValue, Result, StreamKind};
use nl_io::{ColumnBinder, ColumnHandle, RecordStream};

/// Sample normalization, summed over every record of the weights stream.
///
/// Data samples carry only `dsid`; the sums are `None` for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightsSummary {
    /// Dataset id of the first record. `None` only for an empty stream.
    pub dsid: Option<i32>,
    /// Sum of `totalEventsWeighted`, for simulated samples.
    pub sum_weights: Option<f64>,
    /// Sum of `totalEvents`, when present.
    pub total_events: Option<u64>,
    /// `(name, sum)` per generator weight variation.
    pub generator_weights: Vec<(String, f64)>,
    /// Number of weights records read.
    pub n_records: u64,
}

fn optional<T: FromValue>(
    binder: &ColumnBinder,
    stream: &mut RecordStream,
    name: &str,
) -> Result<Option<ColumnHandle<T>>> {
    match binder.bind::<T>(stream, name) {
        Ok(h) => Ok(Some(h)),
        Err(e) if e.kind() == ErrorKind::SchemaResolution => {
            tracing::debug!(column = name, "weights column not available: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl WeightsSummary {
    /// Read the whole weights stream. Leaves it exhausted.
    pub fn aggregate(stream: &mut RecordStream, binder: &ColumnBinder) -> Result<Self> {
        if stream.kind() != StreamKind::Weights {
            return Err(Error::Configuration(format!(
                "weights summary needs the weights stream, got {}",
                stream.kind()
            )));
        }
        let dsid = binder.bind::<i32>(stream, "dsid")?;
        let sum = optional::<f32>(binder, stream, "totalEventsWeighted")?;
        let events = optional::<u64>(binder, stream, "totalEvents")?;
        let gen_sums = optional::<Vec<f32>>(binder, stream, "totalEventsWeighted_mc_generator_weights")?;
        let gen_names = optional::<Vec<String>>(binder, stream, "names_mc_generator_weights")?;

        let mut out = WeightsSummary {
            sum_weights: sum.map(|_| 0.0),
            total_events: events.map(|_| 0),
            ..Default::default()
        };
        while stream.advance()? {
            out.n_records += 1;
            if let (Some(h), Some(acc)) = (sum, out.sum_weights.as_mut()) {
                *acc += f64::from(*stream.get(h)?);
            }
            if let (Some(h), Some(total)) = (events, out.total_events.as_mut()) {
                *total += *stream.get(h)?;
            }
            let id = *stream.get(dsid)?;
            match out.dsid {
                None => out.dsid = Some(id),
                Some(first) if first != id => {
                    tracing::warn!(first, other = id, "weights stream mixes dataset ids")
                }
                Some(_) => {}
            }
            if let Some(h) = gen_sums {
                let sums = stream.get(h)?;
                if out.generator_weights.is_empty() {
                    let names: Vec<String> = match gen_names {
                        Some(n) => stream.value(n)?,
                        None => Vec::new(),
                    };
                    out.generator_weights = (0..sums.len())
                        .map(|i| (names.get(i).cloned().unwrap_or_else(|| format!("variation_{i}")), 0.0))
                        .collect();
                }
                if sums.len() != out.generator_weights.len() {
                    return Err(Error::Source(format!(
                        "weights record {} has {} generator weights, expected {}",
                        out.n_records - 1,
                        sums.len(),
                        out.generator_weights.len()
                    )));
                }
                for (acc, w) in out.generator_weights.iter_mut().zip(sums.iter()) {
                    acc.1 += f64::from(*w);
                }
            }
        }
        tracing::info!(
            records = out.n_records,
            sum_weights = ?out.sum_weights,
            dsid = ?out.dsid,
            "weights aggregated"
        );
        Ok(out)
    }

    /// Sum of weights for a named generator variation.
    pub fn generator_weight(&self, name: &str) -> Option<f64> {
        self.generator_weights.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }
}
