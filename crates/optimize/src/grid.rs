//! Candidate generation for the weight search.

use crate::OptimizeError;
use naicsflow_model::{Dimension, PerDimension, WeightError, WeightVector, DIMENSION_COUNT, PRIOR_KEY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

fn default_threshold() -> f64 {
    1.1
}

/// One point of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub weights: WeightVector,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Candidate {
    /// Fails when the threshold is not finite.
    pub fn new(weights: WeightVector, threshold: f64) -> Result<Self, OptimizeError> {
        check_threshold(threshold)?;
        Ok(Self { weights, threshold })
    }
}

fn check_threshold(threshold: f64) -> Result<(), OptimizeError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(WeightError::NonFinite {
            name: "threshold".to_string(),
            value: threshold,
        }
        .into())
    }
}

/// Yields the candidates to evaluate, in a deterministic order.
pub trait CandidateSource {
    fn candidates(&self) -> Result<Vec<Candidate>, OptimizeError>;
}

/// A plain list of candidates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExplicitGrid(pub Vec<Candidate>);

impl CandidateSource for ExplicitGrid {
    fn candidates(&self) -> Result<Vec<Candidate>, OptimizeError> {
        Ok(self.0.clone())
    }
}

/// Every combination of per-dimension values, priors and thresholds.
///
/// Later dimensions vary fastest; thresholds vary fastest of all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartesianGrid {
    pub values: PerDimension<Vec<f64>>,
    #[serde(default = "no_prior")]
    pub priors: Vec<Option<f64>>,
    pub thresholds: Vec<f64>,
}

fn no_prior() -> Vec<Option<f64>> {
    vec![None]
}

impl CartesianGrid {
    pub fn len(&self) -> usize {
        self.values.iter().map(|(_, v)| v.len()).product::<usize>() * self.priors.len() * self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CandidateSource for CartesianGrid {
    fn candidates(&self) -> Result<Vec<Candidate>, OptimizeError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        for threshold in &self.thresholds {
            check_threshold(*threshold)?;
        }

        let mut out = Vec::with_capacity(self.len());
        let mut cursor = [0usize; DIMENSION_COUNT];
        loop {
            let dimensions = PerDimension::from_fn(|d| self.values[d][cursor[d.index()]]);
            for prior in &self.priors {
                let weights = WeightVector::new(dimensions.clone(), *prior)?;
                for threshold in &self.thresholds {
                    out.push(Candidate::new(weights.clone(), *threshold)?);
                }
            }

            // Odometer increment, last dimension fastest.
            let mut position = DIMENSION_COUNT;
            loop {
                if position == 0 {
                    return Ok(out);
                }
                position -= 1;
                let dimension = Dimension::ALL[position];
                cursor[position] += 1;
                if cursor[position] < self.values[dimension].len() {
                    break;
                }
                cursor[position] = 0;
            }
        }
    }
}

/// Inclusive range sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    fn validate(&self, name: &str) -> Result<(), OptimizeError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(OptimizeError::InvalidRange {
                name: name.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

/// Seeded uniform random sampling of weights and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomSearch {
    pub ranges: PerDimension<Range>,
    #[serde(default)]
    pub prior: Option<Range>,
    pub threshold: Range,
    pub count: usize,
    #[serde(default)]
    pub seed: u64,
}

impl RandomSearch {
    /// Every dimension sampled from `[0, 1]`, fixed threshold.
    pub fn unit(count: usize, threshold: f64, seed: u64) -> Self {
        Self {
            ranges: PerDimension::from_fn(|_| Range::new(0.0, 1.0)),
            prior: None,
            threshold: Range::fixed(threshold),
            count,
            seed,
        }
    }
}

impl CandidateSource for RandomSearch {
    fn candidates(&self) -> Result<Vec<Candidate>, OptimizeError> {
        for (dimension, range) in self.ranges.iter() {
            range.validate(dimension.name())?;
        }
        if let Some(prior) = &self.prior {
            prior.validate(PRIOR_KEY)?;
        }
        self.threshold.validate("threshold")?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut out = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            let dimensions = self.ranges.map(|_, range| range.sample(&mut rng));
            let prior = self.prior.map(|range| range.sample(&mut rng));
            let weights = WeightVector::new(dimensions, prior)?;
            out.push(Candidate::new(weights, self.threshold.sample(&mut rng))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn single_values() -> PerDimension<Vec<f64>> {
        PerDimension::from_fn(|_| vec![1.0])
    }

    #[test]
    fn test_cartesian_enumerates_all_combinations() {
        let mut values = single_values();
        values[Dimension::TitleTitle] = vec![0.5, 1.5];
        values[Dimension::DescriptionDescriptionEmbedding] = vec![0.0, 0.1, 0.2];
        let grid = CartesianGrid {
            values,
            priors: vec![None, Some(0.05)],
            thresholds: vec![1.0, 1.1],
        };

        let candidates = grid.candidates().unwrap();
        assert_eq!(candidates.len(), 2 * 3 * 2 * 2);
        assert_eq!(grid.len(), candidates.len());

        // Last dimension and thresholds vary fastest.
        assert_eq!(candidates[0].threshold, 1.0);
        assert_eq!(candidates[1].threshold, 1.1);
        assert_eq!(candidates[2].weights.prior(), Some(0.05));
        assert_eq!(candidates[4].weights.weight(Dimension::DescriptionDescriptionEmbedding), 0.1);
        assert_eq!(candidates[0].weights.weight(Dimension::TitleTitle), 0.5);
        assert_eq!(candidates[12].weights.weight(Dimension::TitleTitle), 1.5);
    }

    #[test]
    fn test_cartesian_with_empty_axis_is_empty() {
        let mut values = single_values();
        values[Dimension::TitleDescription] = vec![];
        let grid = CartesianGrid {
            values,
            priors: vec![None],
            thresholds: vec![1.0],
        };
        assert!(grid.candidates().unwrap().is_empty());
    }

    #[test]
    fn test_cartesian_from_json_requires_every_dimension() {
        let json = r#"{"values": {"t_t_sim": [1.0]}, "thresholds": [1.1]}"#;
        assert!(serde_json::from_str::<CartesianGrid>(json).is_err());
    }

    #[test]
    fn test_random_search_is_seeded() {
        let search = RandomSearch::unit(5, 1.1, 42);
        let first = search.candidates().unwrap();
        let second = search.candidates().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
        for candidate in &first {
            assert_eq!(candidate.threshold, 1.1);
            for (_, weight) in candidate.weights.dimensions().iter() {
                assert!((0.0..=1.0).contains(weight));
            }
        }
        assert_ne!(first, RandomSearch::unit(5, 1.1, 7).candidates().unwrap());
    }

    #[test]
    fn test_random_search_rejects_inverted_range() {
        let mut search = RandomSearch::unit(1, 1.1, 0);
        search.ranges[Dimension::DescriptionTitle] = Range::new(1.0, 0.0);
        assert!(matches!(
            search.candidates(),
            Err(OptimizeError::InvalidRange { name, .. }) if name == "d_t_sim"
        ));
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        assert!(matches!(
            Candidate::new(WeightVector::uniform(1.0), f64::NAN),
            Err(OptimizeError::Weight(WeightError::NonFinite { name, .. })) if name == "threshold"
        ));

        let grid = CartesianGrid {
            values: single_values(),
            priors: vec![None],
            thresholds: vec![1.0, f64::INFINITY],
        };
        assert!(matches!(grid.candidates(), Err(OptimizeError::Weight(_))));
    }

    #[test]
    fn test_candidate_threshold_defaults() {
        let weights = serde_json::to_value(WeightVector::uniform(1.0)).unwrap();
        let json = serde_json::json!([{ "weights": weights }]);
        let grid: ExplicitGrid = serde_json::from_value(json).unwrap();
        assert_eq!(grid.0[0].threshold, 1.1);
    }
}
