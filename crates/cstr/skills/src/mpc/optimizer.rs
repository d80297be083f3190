//! Spectral projected gradient for smooth costs over a box.
//!
//! Barzilai–Borwein step lengths with a nonmonotone Armijo line search
//! (Grippo–Lampariello–Lucidi reference value). Gradients are central finite
//! differences, so the cost only needs to be evaluable.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{SkillError, SkillResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    /// Converged when the projected gradient's infinity norm falls below this.
    pub tolerance: f64,
    /// Converged when an accepted step improves the cost by less than this
    /// fraction.
    pub ftol: f64,
    /// Finite-difference step.
    pub fd_step: f64,
    /// Past costs the nonmonotone line search may exceed.
    pub memory: usize,
    /// Sufficient decrease parameter.
    pub armijo: f64,
    pub max_backtracks: usize,
    pub step_min: f64,
    pub step_max: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-6,
            ftol: 1e-9,
            fd_step: 1e-6,
            memory: 10,
            armijo: 1e-4,
            max_backtracks: 30,
            step_min: 1e-10,
            step_max: 1e10,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> SkillResult<()> {
        if self.max_iterations == 0 || self.memory == 0 {
            return Err(SkillError::InvalidConfig(
                "optimizer iterations and memory must be positive".into(),
            ));
        }
        if !(self.fd_step > 0.0) || !(self.step_min > 0.0) || self.step_max < self.step_min {
            return Err(SkillError::InvalidConfig(
                "optimizer step sizes must be positive and ordered".into(),
            ));
        }
        Ok(())
    }
}

/// Best point found by [`minimize`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub x: Vec<f64>,
    pub cost: f64,
    pub iterations: usize,
    /// Whether a stopping criterion was met before the iteration limit.
    pub converged: bool,
    pub projected_gradient_norm: f64,
}

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((xi, lo), hi) in x.iter_mut().zip(lower).zip(upper) {
        *xi = xi.clamp(*lo, *hi);
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn gradient<F: Fn(&[f64]) -> f64>(
    cost: &F,
    x: &[f64],
    h: f64,
    deadline: Option<Instant>,
) -> SkillResult<Vec<f64>> {
    let mut shifted = x.to_vec();
    let mut g = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        if expired(deadline) {
            return Err(SkillError::SolverTimeout { timeout_ms: 0 });
        }
        let xi = shifted[i];
        shifted[i] = xi + h;
        let up = cost(&shifted);
        shifted[i] = xi - h;
        let down = cost(&shifted);
        shifted[i] = xi;
        let gi = (up - down) / (2.0 * h);
        if !gi.is_finite() {
            return Err(SkillError::SolverFailed(format!(
                "non-finite gradient in coordinate {i}"
            )));
        }
        g.push(gi);
    }
    Ok(g)
}

/// `‖P(x − g) − x‖∞`
fn projected_gradient_norm(x: &[f64], g: &[f64], lower: &[f64], upper: &[f64]) -> f64 {
    x.iter()
        .zip(g)
        .zip(lower.iter().zip(upper))
        .map(|((xi, gi), (lo, hi))| ((xi - gi).clamp(*lo, *hi) - xi).abs())
        .fold(0.0, f64::max)
}

/// Minimize `cost` over the box `[lower, upper]` starting from `x0`.
///
/// Returns [`SkillError::SolverTimeout`] if `deadline` passes (the caller
/// fills in the budget) and
/// [`SkillError::SolverFailed`] if the cost or gradient is not finite at the
/// starting point. Hitting the iteration limit or exhausting the line search
/// returns the last iterate with `converged == false`; callers that act on the
/// result must check it.
pub fn minimize<F>(
    cost: F,
    x0: Vec<f64>,
    lower: &[f64],
    upper: &[f64],
    config: &OptimizerConfig,
    deadline: Option<Instant>,
) -> SkillResult<Solution>
where
    F: Fn(&[f64]) -> f64,
{
    if x0.len() != lower.len() || x0.len() != upper.len() {
        return Err(SkillError::SolverFailed(format!(
            "dimension mismatch: x0 {}, bounds {}/{}",
            x0.len(),
            lower.len(),
            upper.len()
        )));
    }

    let mut x = x0;
    project(&mut x, lower, upper);
    let mut fx = cost(&x);
    if !fx.is_finite() {
        return Err(SkillError::SolverFailed(
            "cost is not finite at the starting point".into(),
        ));
    }
    let mut g = gradient(&cost, &x, config.fd_step, deadline)?;
    let mut pg_norm = projected_gradient_norm(&x, &g, lower, upper);

    let mut step = if pg_norm > 0.0 {
        (1.0 / pg_norm).clamp(config.step_min, config.step_max)
    } else {
        1.0
    };
    let mut recent: VecDeque<f64> = VecDeque::with_capacity(config.memory);
    recent.push_back(fx);

    let mut iterations = 0;
    let mut converged = pg_norm <= config.tolerance;

    while !converged && iterations < config.max_iterations {
        if expired(deadline) {
            return Err(SkillError::SolverTimeout { timeout_ms: 0 });
        }
        iterations += 1;

        // Spectral direction d = P(x − λg) − x
        let mut trial: Vec<f64> = x.iter().zip(&g).map(|(xi, gi)| xi - step * gi).collect();
        project(&mut trial, lower, upper);
        let direction: Vec<f64> = trial.iter().zip(&x).map(|(t, xi)| t - xi).collect();
        let slope = dot(&g, &direction);

        let reference = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..=config.max_backtracks {
            let candidate: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            let fc = cost(&candidate);
            if fc.is_finite() && fc <= reference + config.armijo * alpha * slope {
                accepted = Some((candidate, fc));
                break;
            }
            alpha *= 0.5;
        }

        let Some((x_new, f_new)) = accepted else {
            // No acceptable step along the projected direction.
            break;
        };

        let g_new = gradient(&cost, &x_new, config.fd_step, deadline)?;
        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sty = dot(&s, &y);
        step = if sty > 0.0 {
            (dot(&s, &s) / sty).clamp(config.step_min, config.step_max)
        } else {
            config.step_max
        };

        let improvement = fx - f_new;
        x = x_new;
        fx = f_new;
        g = g_new;
        pg_norm = projected_gradient_norm(&x, &g, lower, upper);

        if recent.len() == config.memory {
            recent.pop_front();
        }
        recent.push_back(fx);

        converged = pg_norm <= config.tolerance
            || (improvement >= 0.0 && improvement <= config.ftol * fx.abs().max(1.0));
    }

    Ok(Solution {
        x,
        cost: fx,
        iterations,
        converged,
        projected_gradient_norm: pg_norm,
    })
}
