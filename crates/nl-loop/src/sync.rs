//! Reco/particle correspondence.
//!
//! [`CorrespondenceTable::correlate`] scans both streams' keys once, without
//! moving either cursor, and partitions every position into exactly one of
//! `paired`, `reco_only` or `particle_only`.

use std::collections::HashMap;

use serde::Serialize;

use nl_core::{Error, EventKey, Result};
use nl_io::RecordStream;

/// Position partition of a reco and a particle stream. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrespondenceTable {
    particle_only: Vec<u64>,
    reco_only: Vec<u64>,
    paired: Vec<(u64, u64)>,
    n_reco: u64,
    n_particle: u64,
}

/// Sizes of a [`CorrespondenceTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Reco records with a particle companion.
    pub paired: u64,
    /// Reco records without a particle companion.
    pub reco_only: u64,
    /// Particle records without a reco companion.
    pub particle_only: u64,
}

impl CorrespondenceTable {
    /// Build the table from two key sequences, indexed by position.
    ///
    /// If a particle key occurs twice, the later position wins and the
    /// earlier one ends up in `particle_only`. A reco key whose particle
    /// companion was already taken by an earlier reco record goes to
    /// `reco_only`, so every position still appears exactly once.
    pub fn from_keys(reco: &[EventKey], particle: &[EventKey]) -> Self {
        let mut by_key: HashMap<EventKey, u64> = HashMap::with_capacity(particle.len());
        for (pos, key) in particle.iter().enumerate() {
            by_key.insert(*key, pos as u64);
        }

        let mut consumed = vec![false; particle.len()];
        let mut paired = Vec::with_capacity(reco.len().min(particle.len()));
        let mut reco_only = Vec::new();
        for (pos, key) in reco.iter().enumerate() {
            match by_key.get(key) {
                Some(&p) if !consumed[p as usize] => {
                    consumed[p as usize] = true;
                    paired.push((pos as u64, p));
                }
                _ => reco_only.push(pos as u64),
            }
        }

        let particle_only = consumed
            .iter()
            .enumerate()
            .filter(|(_, used)| !**used)
            .map(|(pos, _)| pos as u64)
            .collect();

        Self {
            particle_only,
            reco_only,
            paired,
            n_reco: reco.len() as u64,
            n_particle: particle.len() as u64,
        }
    }

    /// Scan the keys of both streams and build the table.
    ///
    /// Both streams must be open and not yet advanced.
    pub fn correlate(reco: &RecordStream, particle: &RecordStream) -> Result<Self> {
        for stream in [reco, particle] {
            if stream.position().is_some() || stream.is_exhausted() {
                return Err(Error::Configuration(format!(
                    "{} stream must be unadvanced before correlation",
                    stream.kind()
                )));
            }
        }
        let reco_keys = reco.scan_keys()?;
        let particle_keys = particle.scan_keys()?;
        let table = Self::from_keys(&reco_keys, &particle_keys);
        tracing::info!(
            paired = table.paired.len(),
            reco_only = table.reco_only.len(),
            particle_only = table.particle_only.len(),
            "reco/particle correspondence built"
        );
        Ok(table)
    }

    /// `(reco position, particle position)` pairs, in reco order.
    pub fn paired(&self) -> &[(u64, u64)] {
        &self.paired
    }

    /// Reco positions without a particle companion, ascending.
    pub fn reco_only(&self) -> &[u64] {
        &self.reco_only
    }

    /// Particle positions without a reco companion, ascending.
    pub fn particle_only(&self) -> &[u64] {
        &self.particle_only
    }

    /// Number of reco records the table was built from.
    pub fn n_reco(&self) -> u64 {
        self.n_reco
    }

    /// Number of particle records the table was built from.
    pub fn n_particle(&self) -> u64 {
        self.n_particle
    }

    /// Collection sizes.
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            paired: self.paired.len() as u64,
            reco_only: self.reco_only.len() as u64,
            particle_only: self.particle_only.len() as u64,
        }
    }

    /// Check that `paired` can be visited by two forward-only cursors:
    /// particle positions must increase along with reco positions.
    pub fn check_visitation_order(&self) -> Result<()> {
        for w in self.paired.windows(2) {
            let ((r0, p0), (r1, p1)) = (w[0], w[1]);
            if r1 <= r0 || p1 <= p0 {
                return Err(Error::CorrelationInconsistency(format!(
                    "pair (reco {r1}, particle {p1}) follows (reco {r0}, particle {p0}); \
                     streams are not in the same key order"
                )));
            }
        }
        Ok(())
    }

    /// Particle companion of a reco position.
    pub fn particle_for(&self, reco: u64) -> Option<u64> {
        self.paired
            .binary_search_by_key(&reco, |&(r, _)| r)
            .ok()
            .map(|i| self.paired[i].1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(events: &[u64]) -> Vec<EventKey> {
        events.iter().map(|&e| EventKey::new(1, e)).collect()
    }

    #[test]
    fn partitions_example_streams() {
        let t = CorrespondenceTable::from_keys(&keys(&[100, 101, 102]), &keys(&[101, 103]));
        assert_eq!(t.paired(), &[(1, 0)]);
        assert_eq!(t.reco_only(), &[0, 2]);
        assert_eq!(t.particle_only(), &[1]);
        assert_eq!(t.particle_for(1), Some(0));
        assert_eq!(t.particle_for(0), None);
        t.check_visitation_order().unwrap();
    }

    #[test]
    fn later_duplicate_particle_key_wins() {
        let t = CorrespondenceTable::from_keys(&keys(&[7]), &keys(&[7, 8, 7]));
        assert_eq!(t.paired(), &[(0, 2)]);
        assert_eq!(t.particle_only(), &[0, 1]);
    }

    #[test]
    fn duplicate_reco_key_pairs_once() {
        let t = CorrespondenceTable::from_keys(&keys(&[5, 5]), &keys(&[5]));
        assert_eq!(t.paired(), &[(0, 0)]);
        assert_eq!(t.reco_only(), &[1]);
        assert!(t.particle_only().is_empty());
    }

    #[test]
    fn run_number_is_part_of_the_key() {
        let reco = vec![EventKey::new(1, 10), EventKey::new(2, 10)];
        let particle = vec![EventKey::new(2, 10)];
        let t = CorrespondenceTable::from_keys(&reco, &particle);
        assert_eq!(t.paired(), &[(1, 0)]);
    }

    #[test]
    fn crossed_order_is_inconsistent() {
        let t = CorrespondenceTable::from_keys(&keys(&[1, 2]), &keys(&[2, 1]));
        assert_eq!(t.paired(), &[(0, 1), (1, 0)]);
        let err = t.check_visitation_order().unwrap_err();
        assert_eq!(err.kind(), nl_core::ErrorKind::CorrelationInconsistency);
    }

    #[test]
    fn empty_inputs() {
        let t = CorrespondenceTable::from_keys(&[], &keys(&[1, 2]));
        assert!(t.paired().is_empty());
        assert_eq!(t.particle_only(), &[0, 1]);
        assert_eq!(t.summary(), TableSummary { paired: 0, reco_only: 0, particle_only: 2 });
    }
}
