//! Resource utilization models of cloudlets.

use std::cell::RefCell;

use dyn_clone::{clone_trait_object, DynClone};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A utilization model is a function, which defines the fraction of a resource used by a cloudlet at the moment.
///
/// `time` is the current simulation time, `time_from_start` is the time passed since the cloudlet execution start,
/// which allows to model load peaks at the beginning of execution. Returned values are expected to be in `[0, 1]`.
pub trait UtilizationModel: DynClone {
    fn utilization(&self, time: f64, time_from_start: f64) -> f64;
}

clone_trait_object!(UtilizationModel);

/// The cloudlet always uses all of the resource.
#[derive(Clone, Default)]
pub struct UtilizationModelFull;

impl UtilizationModelFull {
    pub fn new() -> Self {
        Self {}
    }
}

impl UtilizationModel for UtilizationModelFull {
    fn utilization(&self, _time: f64, _time_from_start: f64) -> f64 {
        1.
    }
}

/// Constant utilization.
#[derive(Clone)]
pub struct ConstantUtilizationModel {
    utilization: f64,
}

impl ConstantUtilizationModel {
    pub fn new(utilization: f64) -> Self {
        Self { utilization }
    }
}

impl UtilizationModel for ConstantUtilizationModel {
    fn utilization(&self, _time: f64, _time_from_start: f64) -> f64 {
        self.utilization
    }
}

/// Utilization growing linearly from the initial value with the given increment per second,
/// limited by the maximal value.
#[derive(Clone)]
pub struct DynamicUtilizationModel {
    initial: f64,
    increment: f64,
    max: f64,
}

impl DynamicUtilizationModel {
    pub fn new(initial: f64, increment: f64, max: f64) -> Self {
        Self { initial, increment, max }
    }
}

impl UtilizationModel for DynamicUtilizationModel {
    fn utilization(&self, _time: f64, time_from_start: f64) -> f64 {
        (self.initial + self.increment * time_from_start.max(0.)).clamp(0., self.max)
    }
}

/// Random utilization drawn uniformly from `[0, 1)`.
///
/// The value is sampled once per distinct time moment, so repeated queries for the same time
/// return the same value. Sequences are reproducible for a fixed seed.
#[derive(Clone)]
pub struct StochasticUtilizationModel {
    rng: RefCell<StdRng>,
    last: RefCell<Option<(f64, f64)>>,
}

impl StochasticUtilizationModel {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            last: RefCell::new(None),
        }
    }
}

impl UtilizationModel for StochasticUtilizationModel {
    fn utilization(&self, time: f64, _time_from_start: f64) -> f64 {
        let mut last = self.last.borrow_mut();
        if let Some((last_time, value)) = *last {
            if last_time == time {
                return value;
            }
        }
        let value = self.rng.borrow_mut().gen_range(0.0..1.0);
        *last = Some((time, value));
        value
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_dynamic_model_is_capped() {
        let model = DynamicUtilizationModel::new(0.1, 0.2, 0.9);
        assert_abs_diff_eq!(model.utilization(10., 0.), 0.1);
        assert_abs_diff_eq!(model.utilization(12., 2.), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(model.utilization(20., 10.), 0.9);
    }

    #[test]
    fn test_stochastic_model_is_stable_within_time_moment() {
        let model = StochasticUtilizationModel::new(42);
        let first = model.utilization(1., 0.);
        assert_eq!(model.utilization(1., 0.), first);
        assert!((0. ..1.).contains(&first));

        let boxed: Box<dyn UtilizationModel> = Box::new(StochasticUtilizationModel::new(42));
        let cloned = boxed.clone();
        assert_eq!(boxed.utilization(1., 0.), cloned.utilization(1., 0.));
    }
}
