//! Levenberg-Marquardt refinement of a sum of Gaussian components.
//!
//! Each iteration solves the damped normal equations
//!
//! ```math
//! (J^TJ + \lambda\,\text{diag}(J^TJ))\,\delta = J^Tr
//! ```
//!
//! and every trial step is passed through [`GaussianShape::validate`] before it is
//! evaluated, so drifting parameters are pulled back instead of being reported.
use log::trace;
use nalgebra::{DMatrix, DVector};

use super::{CandidateGaussian, FitConfig, GaussianShape, OptimizeResult, SubPeakError};

const MAX_DAMPING: f64 = 1e12;
const MIN_DAMPING: f64 = 1e-12;

/// Evaluate the sum of `components` at positions `0..n`
pub fn model_curve<T: GaussianShape>(components: &[T], n: usize) -> Vec<f64> {
    (0..n)
        .map(|x| components.iter().map(|c| c.density(x as f64)).sum())
        .collect()
}

fn unpack_all<T: GaussianShape>(packed: &DVector<f64>, k: usize) -> Vec<T> {
    let flat = packed.as_slice();
    (0..k)
        .map(|i| T::unpack(&flat[i * T::N_PARAMS..(i + 1) * T::N_PARAMS]))
        .collect()
}

fn pack_all<T: GaussianShape>(components: &[T]) -> DVector<f64> {
    let mut packed = DVector::zeros(components.len() * T::N_PARAMS);
    for (i, c) in components.iter().enumerate() {
        c.pack(&mut packed.as_mut_slice()[i * T::N_PARAMS..(i + 1) * T::N_PARAMS]);
    }
    packed
}

fn validated<T: GaussianShape>(
    packed: &DVector<f64>,
    candidates: &[CandidateGaussian<T>],
    config: &FitConfig,
) -> Vec<T> {
    let mut components = unpack_all::<T>(packed, candidates.len());
    for (c, candidate) in components.iter_mut().zip(candidates) {
        c.validate(candidate, config);
    }
    components
}

fn residuals<T: GaussianShape>(values: &[f64], components: &[T]) -> DVector<f64> {
    let predicted = model_curve(components, values.len());
    DVector::from_iterator(
        values.len(),
        values.iter().zip(predicted).map(|(y, f)| y - f),
    )
}

fn jacobian<T: GaussianShape>(n: usize, components: &[T]) -> DMatrix<f64> {
    let p = components.len() * T::N_PARAMS;
    let mut jac = DMatrix::zeros(n, p);
    let mut row = vec![0.0; T::N_PARAMS];
    for x in 0..n {
        for (i, c) in components.iter().enumerate() {
            c.gradient(x as f64, &mut row);
            for (t, v) in row.iter().enumerate() {
                jac[(x, i * T::N_PARAMS + t)] = *v;
            }
        }
    }
    jac
}

fn solve_damped(normal: &DMatrix<f64>, gradient: &DVector<f64>, damping: f64) -> Option<DVector<f64>> {
    let mut damped = normal.clone();
    for i in 0..damped.nrows() {
        damped[(i, i)] += damping * normal[(i, i)].max(1e-12);
    }
    match damped.clone().cholesky() {
        Some(chol) => Some(chol.solve(gradient)),
        None => damped.lu().solve(gradient),
    }
    .filter(|d| d.iter().all(|v| v.is_finite()))
}

/// Refine `candidates` against `values` by Levenberg-Marquardt.
///
/// `scale` is the mean of `values` and scales the convergence tolerances.
pub fn optimize<T: GaussianShape>(
    values: &[f64],
    candidates: &[CandidateGaussian<T>],
    config: &FitConfig,
    scale: f64,
) -> Result<(Vec<T>, OptimizeResult), SubPeakError> {
    let lm = &config.optimizer;
    let n = values.len();
    let n_params = candidates.len() * T::N_PARAMS;
    if n < n_params {
        return Err(SubPeakError::TooFewValues(n, n_params));
    }
    let scale = if scale > 0.0 { scale } else { 1.0 };
    let cost_tolerance = lm.cost_tolerance * scale;
    let parameter_tolerance = lm.parameter_tolerance * scale;
    let orthogonality_tolerance = lm.orthogonality_tolerance * scale;
    let step_bound = lm.initial_step_bound.unwrap_or(T::INITIAL_STEP_BOUND);

    let initial: Vec<T> = candidates.iter().map(|c| c.parameters).collect();
    let mut packed = pack_all(&initial);
    let mut components = validated(&packed, candidates, config);
    packed = pack_all(&components);

    let mut residual = residuals(values, &components);
    let mut cost = residual.norm_squared();
    let mut evaluations = 1;
    let mut iterations = 0;
    let mut converged = false;
    let initial_damping = 0.01 / step_bound;
    let mut damping = initial_damping;

    'outer: while iterations < lm.max_iterations && evaluations < lm.max_evaluations {
        iterations += 1;
        let jac = jacobian(n, &components);
        let normal = jac.tr_mul(&jac);
        let gradient = jac.tr_mul(&residual);

        let residual_norm = cost.sqrt();
        if residual_norm == 0.0 {
            converged = true;
            break;
        }
        let orthogonality = jac
            .column_iter()
            .zip(gradient.iter())
            .map(|(col, g)| {
                let norm = col.norm();
                if norm == 0.0 {
                    0.0
                } else {
                    g.abs() / (norm * residual_norm)
                }
            })
            .fold(0.0f64, f64::max);
        if orthogonality <= orthogonality_tolerance {
            trace!("{iterations}: gradient orthogonal to residual ({orthogonality:0.3e})");
            converged = true;
            break;
        }

        loop {
            if evaluations >= lm.max_evaluations {
                break 'outer;
            }
            let Some(step) = solve_damped(&normal, &gradient, damping) else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    break 'outer;
                }
                continue;
            };
            let trial_packed = &packed + &step;
            let trial = validated(&trial_packed, candidates, config);
            let trial_residual = residuals(values, &trial);
            let trial_cost = trial_residual.norm_squared();
            evaluations += 1;

            if trial_cost.is_finite() && trial_cost < cost {
                let trial_packed = pack_all(&trial);
                let relative_reduction = (cost - trial_cost) / cost;
                let relative_step = trial_packed
                    .iter()
                    .zip(packed.iter())
                    .map(|(a, b)| (a - b).abs() / (b.abs() + f64::EPSILON))
                    .fold(0.0f64, f64::max);
                trace!("{iterations}: cost {cost:0.5} -> {trial_cost:0.5}, damping {damping:0.3e}");

                // Heavily damped steps are short regardless of how far the optimum is
                let lightly_damped = damping <= initial_damping;
                packed = trial_packed;
                components = trial;
                residual = trial_residual;
                cost = trial_cost;
                damping = (damping / 10.0).max(MIN_DAMPING);

                if lightly_damped
                    && (relative_reduction <= cost_tolerance || relative_step <= parameter_tolerance)
                {
                    converged = true;
                    break 'outer;
                }
                break;
            }
            damping *= 10.0;
            if damping > MAX_DAMPING {
                // No downhill step remains at any damping
                converged = true;
                break 'outer;
            }
        }
    }

    if !components.iter().all(|c| c.is_finite()) {
        return Err(SubPeakError::NonFiniteParameters(iterations));
    }
    let rms = (cost / n.max(1) as f64).sqrt();
    Ok((
        components,
        OptimizeResult {
            iterations,
            evaluations,
            converged,
            rms,
        },
    ))
}
