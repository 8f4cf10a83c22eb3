// src/coupling/relaxation.rs

use nalgebra::DVector;
use serde::Deserialize;

/// Under-relaxation scheme for one coupled field.
///
/// Deserializes from the input deck either as a bare number (constant
/// factor) or as the string `robbins_monro`. The scheme is an explicit
/// variant rather than a reserved sentinel value, so an ordinary configured
/// factor can never collide with the scheme selector.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Relaxation {
    Constant(f64),
    Scheme(Scheme),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    RobbinsMonro,
}

#[allow(non_upper_case_globals)]
impl Relaxation {
    /// Shorthand for the Robbins-Monro variant.
    pub const RobbinsMonro: Relaxation = Relaxation::Scheme(Scheme::RobbinsMonro);

    /// Effective relaxation factor for Picard iteration `n` (0-based within
    /// the current timestep).
    ///
    /// Robbins-Monro uses the stochastic-approximation decay 1/(n+1):
    /// strong damping on the first iteration of a timestep, progressively
    /// less afterwards.
    pub fn factor(&self, n: usize) -> f64 {
        match self {
            Relaxation::Constant(alpha) => *alpha,
            Relaxation::Scheme(Scheme::RobbinsMonro) => 1.0 / (n as f64 + 1.0),
        }
    }

    /// Blends the raw new iterate with the previous relaxed iterate:
    /// `alpha * x_new + (1 - alpha) * x_old`.
    pub fn apply(&self, x_new: &DVector<f64>, x_old: &DVector<f64>, n: usize) -> DVector<f64> {
        let alpha = self.factor(n);
        x_new * alpha + x_old * (1.0 - alpha)
    }
}
