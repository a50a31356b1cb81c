//! Target network tracking via Polyak averaging.
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! Parameters are matched by traversal order, so the online and target
//! modules only need the same architecture, not shared parameter ids.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened to 1D.
struct ParamCollector<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamCollector<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let numel: usize = val.dims().iter().product();
        self.params.push(val.reshape([numel]));
        param
    }
}

/// Blends collected online parameters into the visited (target) module.
struct PolyakMapper<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let idx = self.index;
        self.index += 1;

        let Some(online) = self.online.get(idx) else {
            return param;
        };

        let target = param.val();
        let shape = target.dims();
        let numel: usize = shape.iter().product();
        let blended = online.clone().mul_scalar(self.tau)
            + target.reshape([numel]).mul_scalar(1.0 - self.tau);

        Param::initialized(param.id.clone(), blended.reshape(shape).detach())
    }
}

/// Move `target` towards `online` with rate `tau`.
///
/// `tau = 1` copies the online module, `tau = 0` returns the target unchanged.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut collector = ParamCollector { params: Vec::new() };
    let _ = online.clone().map(&mut collector);

    let mut mapper = PolyakMapper {
        online: collector.params,
        tau,
        index: 0,
    };
    target.map(&mut mapper)
}

/// Flatten every float parameter of a module into host memory.
///
/// Traversal order is the module's field order.
pub fn flatten_params<B, M>(module: &M) -> Vec<f32>
where
    B: Backend,
    M: Module<B>,
{
    let mut collector = ParamCollector { params: Vec::new() };
    let _ = module.clone().map(&mut collector);
    collector
        .params
        .into_iter()
        .flat_map(|t| t.into_data().to_vec::<f32>().unwrap_or_default())
        .collect()
}
