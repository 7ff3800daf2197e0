use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use pingpong_common::error::{PingpongError, Result};

use crate::types::LabelValues;

/// Monotonic `f64` counter that is safe to increment from many threads
/// without external locking.
#[derive(Debug)]
pub struct Counter {
    bits: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0_f64.to_bits()),
        }
    }

    pub fn inc_by(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn inc(&self) {
        self.inc_by(1.0);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Live counters of one family, keyed by label-value vector.
///
/// The lock only guards the map structure; increments go straight to the
/// shared [`Counter`] handles.
#[derive(Debug, Default)]
pub struct CounterVec {
    series: RwLock<HashMap<LabelValues, Arc<Counter>>>,
}

impl CounterVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, label_values: &[String]) -> Result<Arc<Counter>> {
        {
            let series = self.series.read().map_err(|_| poisoned())?;
            if let Some(existing) = series.get(label_values) {
                return Ok(Arc::clone(existing));
            }
        }

        let mut series = self.series.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(
            series
                .entry(label_values.to_vec())
                .or_insert_with(|| Arc::new(Counter::new())),
        ))
    }

    /// Copies the current series identities; values are read afterwards,
    /// outside the lock.
    pub fn handles(&self) -> Result<Vec<(LabelValues, Arc<Counter>)>> {
        let series = self.series.read().map_err(|_| poisoned())?;
        Ok(series
            .iter()
            .map(|(values, counter)| (values.clone(), Arc::clone(counter)))
            .collect())
    }

    pub fn get(&self, label_values: &[String]) -> Result<Option<Arc<Counter>>> {
        let series = self.series.read().map_err(|_| poisoned())?;
        Ok(series.get(label_values).cloned())
    }
}

fn poisoned() -> PingpongError {
    PingpongError::InternalError("counter series lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn counter_adds_fractions() {
        let counter = Counter::new();
        counter.inc_by(0.5);
        counter.inc_by(2.0);
        counter.inc();
        assert_eq!(counter.get(), 3.5);
    }

    #[test]
    fn same_label_values_share_a_counter() {
        let family = CounterVec::new();
        let values = vec!["200".to_string(), "/a".to_string()];
        let first = family.get_or_create(&values).unwrap();
        let second = family.get_or_create(&values).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(family.handles().unwrap().len(), 1);

        let found = family.get(&values).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &found));
        assert!(family.get(&["404".to_string()]).unwrap().is_none());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let family = CounterVec::new();
        let values = vec!["x".to_string()];

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        family.get_or_create(&values).unwrap().inc_by(2.0);
                    }
                });
            }
        });

        assert_eq!(family.get_or_create(&values).unwrap().get(), 16_000.0);
    }
}
