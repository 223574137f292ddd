//! Running median over the respiration channels.

use std::collections::VecDeque;

use crate::error::FilterError;
use crate::types::Sample;

/// Median of `window` by value.
///
/// The input is left in its original order. For an even-length window the
/// result is synthetic: its value is the mean of the two middle values and its
/// index, elapsed time and label come from the upper-middle sample.
pub fn median_of(window: &[Sample]) -> Result<Sample, FilterError> {
    if window.is_empty() {
        return Err(FilterError::InvalidArgument("median of an empty window"));
    }
    let mut sorted: Vec<&Sample> = window.iter().collect();
    sorted.sort_by(|a, b| a.value.total_cmp(&b.value));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Ok(sorted[mid].clone());
    }
    let mut upper = sorted[mid].clone();
    upper.value = (sorted[mid - 1].value + sorted[mid].value) / 2.0;
    Ok(upper)
}

/// Emits one median sample every `every` raw samples, computed over the
/// trailing `on` raw samples.
///
/// Both parameters are read once when the session is configured; both are
/// clamped to at least one.
#[derive(Debug, Clone)]
pub struct MedianFilter {
    every: usize,
    on: usize,
    count: u64,
    window: VecDeque<Sample>,
}

impl MedianFilter {
    pub fn new(every: usize, on: usize) -> Self {
        let on = on.max(1);
        Self {
            every: every.max(1),
            on,
            count: 0,
            window: VecDeque::with_capacity(on),
        }
    }

    /// Feed one raw sample; returns the filtered sample when one is due.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        if self.window.len() == self.on {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.count += 1;

        if self.count % self.every as u64 != 0 {
            return None;
        }
        median_of(self.window.make_contiguous()).ok()
    }

    pub fn raw_count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn samples(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(i as u64, v, Duration::from_millis(i as u64 * 10)))
            .collect()
    }

    #[test]
    fn odd_window() {
        let w = samples(&[1.0, 3.0, 2.0]);
        let m = median_of(&w).unwrap();
        assert_eq!(m.value, 2.0);
        assert_eq!(m.sequence_index, 2);
    }

    #[test]
    fn even_window_is_synthetic() {
        let w = samples(&[1.0, 2.0, 3.0, 4.0]);
        let m = median_of(&w).unwrap();
        assert_eq!(m.value, 2.5);
        // upper-middle by value is 3.0 at index 2
        assert_eq!(m.sequence_index, 2);
        assert_eq!(m.timestamp_label, w[2].timestamp_label);
    }

    #[test]
    fn input_is_not_reordered() {
        let w = samples(&[5.0, -1.0, 3.0, 0.0]);
        let before: Vec<f64> = w.iter().map(|s| s.value).collect();
        median_of(&w).unwrap();
        assert_eq!(w.iter().map(|s| s.value).collect::<Vec<_>>(), before);
    }

    #[test]
    fn empty_window_is_invalid() {
        assert!(matches!(median_of(&[]), Err(FilterError::InvalidArgument(_))));
    }

    #[test]
    fn filter_emits_on_multiples() {
        let mut f = MedianFilter::new(3, 3);
        let out: Vec<Option<f64>> = samples(&[9.0, 1.0, 5.0, 7.0, 2.0, 8.0])
            .into_iter()
            .map(|s| f.push(s).map(|m| m.value))
            .collect();
        assert_eq!(out, vec![None, None, Some(5.0), None, None, Some(7.0)]);
        assert_eq!(f.raw_count(), 6);
    }

    #[test]
    fn filter_window_is_trailing() {
        let mut f = MedianFilter::new(1, 2);
        let out: Vec<f64> = samples(&[10.0, 20.0, 40.0])
            .into_iter()
            .filter_map(|s| f.push(s).map(|m| m.value))
            .collect();
        assert_eq!(out, vec![10.0, 15.0, 30.0]);
    }

    #[test]
    fn reset_restarts_cadence() {
        let mut f = MedianFilter::new(2, 4);
        f.push(Sample::new(0, 1.0, Duration::ZERO));
        f.reset();
        assert!(f.push(Sample::new(0, 1.0, Duration::ZERO)).is_none());
        assert_eq!(f.push(Sample::new(1, 3.0, Duration::ZERO)).map(|m| m.value), Some(2.0));
    }
}
