//! Background pseudo-event generation.

use crate::sampling::{indices_with_replacement, poisson_count};
use rand::Rng;
use sky_core::{Error, RandomStateService, Result};
use sky_llh::{Dataset, DatasetData, EventArray};
use std::f64::consts::TAU;
use std::fmt;
use std::sync::Arc;

/// Randomizes event columns so that any signal correlation is destroyed.
pub trait DataScramblingMethod: Send + Sync + fmt::Debug {
    /// Scramble `events` in place.
    fn scramble(&self, rss: &mut RandomStateService, events: &mut EventArray) -> Result<()>;
}

/// Draws new right ascensions uniformly in `[0, 2π)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformRaScramblingMethod;

impl DataScramblingMethod for UniformRaScramblingMethod {
    fn scramble(&self, rss: &mut RandomStateService, events: &mut EventArray) -> Result<()> {
        let rng = rss.rng();
        let ra: Vec<f64> = (0..events.n_events()).map(|_| rng.random::<f64>() * TAU).collect();
        events.set_column("ra", ra)
    }
}

/// Produces a background sample for one dataset.
pub trait BackgroundGenerationMethod: Send + Sync + fmt::Debug {
    /// Generate background events. `mean = None` lets the method decide the count.
    ///
    /// Returns the number of generated events and the events themselves.
    fn generate_events(
        &self,
        rss: &mut RandomStateService,
        dataset: &Dataset,
        data: &DatasetData,
        mean: Option<f64>,
    ) -> Result<(u64, EventArray)>;
}

/// Background from scrambled experimental data.
///
/// Without a mean, every experimental event is used once (the observed count). With a
/// mean `μ`, `Poisson(μ)` events are drawn with replacement from the experimental data.
/// Either way the sample is scrambled afterwards.
#[derive(Debug, Clone)]
pub struct ScrambledExpDataBkgGenMethod {
    scrambler: Arc<dyn DataScramblingMethod>,
}

impl Default for ScrambledExpDataBkgGenMethod {
    fn default() -> Self {
        Self::new(Arc::new(UniformRaScramblingMethod))
    }
}

impl ScrambledExpDataBkgGenMethod {
    /// Create with a scrambling method.
    pub fn new(scrambler: Arc<dyn DataScramblingMethod>) -> Self {
        Self { scrambler }
    }
}

impl BackgroundGenerationMethod for ScrambledExpDataBkgGenMethod {
    fn generate_events(
        &self,
        rss: &mut RandomStateService,
        dataset: &Dataset,
        data: &DatasetData,
        mean: Option<f64>,
    ) -> Result<(u64, EventArray)> {
        let exp = data.exp();
        let mut events = match mean {
            None => exp.clone(),
            Some(mu) => {
                let n = poisson_count(rss.rng(), mu)? as usize;
                if n > 0 && exp.is_empty() {
                    return Err(Error::Validation(format!(
                        "dataset '{}' has no experimental events to resample",
                        dataset.name()
                    )));
                }
                let idx = indices_with_replacement(rss.rng(), exp.n_events(), n)?;
                exp.select(&idx)?
            }
        };
        self.scrambler.scramble(rss, &mut events)?;
        Ok((events.n_events() as u64, events))
    }
}

/// Generates background samples for the datasets of an analysis.
#[derive(Debug, Clone)]
pub struct BackgroundGenerator {
    method: Arc<dyn BackgroundGenerationMethod>,
    dataset_list: Vec<Dataset>,
    data_list: Vec<Arc<DatasetData>>,
}

impl BackgroundGenerator {
    /// Create for paired dataset and data lists.
    pub fn new(
        method: Arc<dyn BackgroundGenerationMethod>,
        dataset_list: Vec<Dataset>,
        data_list: Vec<Arc<DatasetData>>,
    ) -> Result<Self> {
        if dataset_list.len() != data_list.len() {
            return Err(Error::Validation(format!(
                "{} datasets but {} data entries",
                dataset_list.len(),
                data_list.len()
            )));
        }
        Ok(Self { method, dataset_list, data_list })
    }

    /// Number of datasets.
    pub fn n_datasets(&self) -> usize {
        self.dataset_list.len()
    }

    /// Background sample of dataset `dataset_index`.
    pub fn generate_background_events(
        &self,
        rss: &mut RandomStateService,
        dataset_index: usize,
        mean: Option<f64>,
    ) -> Result<(u64, EventArray)> {
        let (dataset, data) = self
            .dataset_list
            .get(dataset_index)
            .zip(self.data_list.get(dataset_index))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "dataset index {dataset_index} out of range for {} datasets",
                    self.dataset_list.len()
                ))
            })?;
        self.method.generate_events(rss, dataset, data, mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sky_llh::{EXP_FIELDS, MC_FIELDS};

    fn data(n: usize) -> Arc<DatasetData> {
        let exp = EventArray::from_columns(
            EXP_FIELDS.iter().map(|f| (f.to_string(), (0..n).map(|i| i as f64 * 0.01).collect())),
        )
        .unwrap();
        let mc = EventArray::from_columns(
            EXP_FIELDS.iter().chain(MC_FIELDS.iter()).map(|f| (f.to_string(), vec![1.0])),
        )
        .unwrap();
        Arc::new(DatasetData::new(exp, mc).unwrap())
    }

    fn generator() -> BackgroundGenerator {
        BackgroundGenerator::new(
            Arc::new(ScrambledExpDataBkgGenMethod::default()),
            vec![Dataset::new("a", 1.0).unwrap()],
            vec![data(50)],
        )
        .unwrap()
    }

    #[test]
    fn test_default_mean_is_observed_count() {
        let mut rss = RandomStateService::from_seed(1);
        let (n, ev) = generator().generate_background_events(&mut rss, 0, None).unwrap();
        assert_eq!(n, 50);
        assert_eq!(ev.n_events(), 50);
        // Declinations are untouched, right ascensions scrambled.
        assert_eq!(ev.column("dec").unwrap()[7], 7.0 * 0.01);
        assert!(ev.column("ra").unwrap().iter().all(|&r| (0.0..TAU).contains(&r)));
    }

    #[test]
    fn test_given_mean_resamples() {
        let mut rss = RandomStateService::from_seed(2);
        let g = generator();
        let n_trials = 400;
        let total: u64 = (0..n_trials)
            .map(|_| g.generate_background_events(&mut rss, 0, Some(20.0)).unwrap().0)
            .sum();
        let mean = total as f64 / n_trials as f64;
        assert!((mean - 20.0).abs() < 1.0, "mean={mean}");
    }

    #[test]
    fn test_same_seed_same_sample() {
        let g = generator();
        let mut a = RandomStateService::from_seed(9);
        let mut b = RandomStateService::from_seed(9);
        let ea = g.generate_background_events(&mut a, 0, Some(10.0)).unwrap();
        let eb = g.generate_background_events(&mut b, 0, Some(10.0)).unwrap();
        assert_eq!(ea, eb);
    }

    #[test]
    fn test_bad_index() {
        let mut rss = RandomStateService::from_seed(1);
        assert!(generator().generate_background_events(&mut rss, 1, None).is_err());
    }
}
