//! Nonlinear two-state CSTR model with fixed-step RK4 integration.

use serde::{Deserialize, Serialize};

use crate::error::{SkillError, SkillResult};

/// Fixed physical constants of the reactor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantParameters {
    /// Volumetric flow rate (m³/h)
    pub flow_rate: f64,
    /// Reactor volume (m³)
    pub volume: f64,
    /// Arrhenius pre-exponential factor (1/h)
    pub pre_exponential: f64,
    /// Activation energy (kcal/kmol)
    pub activation_energy: f64,
    /// Gas constant (kcal/(kmol·K))
    pub gas_constant: f64,
    /// Heat of reaction (kcal/kmol)
    pub heat_of_reaction: f64,
    /// Density times heat capacity (kcal/(m³·K))
    pub density_heat_capacity: f64,
    /// Heat transfer coefficient times area (kcal/(K·h))
    pub heat_transfer: f64,
    /// Feed concentration (kmol/m³)
    pub feed_concentration: f64,
    /// Feed temperature (K)
    pub feed_temperature: f64,
}

impl Default for PlantParameters {
    fn default() -> Self {
        Self {
            flow_rate: 1.0,
            volume: 1.0,
            pre_exponential: 34_930_800.0,
            activation_energy: 11_843.0,
            gas_constant: 1.985875,
            heat_of_reaction: -5960.0,
            density_heat_capacity: 500.0,
            heat_transfer: 150.0,
            feed_concentration: 10.0,
            feed_temperature: 298.2,
        }
    }
}

impl PlantParameters {
    pub fn validate(&self) -> SkillResult<()> {
        let positive = [
            ("flow_rate", self.flow_rate),
            ("volume", self.volume),
            ("gas_constant", self.gas_constant),
            ("density_heat_capacity", self.density_heat_capacity),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(SkillError::InvalidConfig(format!(
                    "plant parameter {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Reactor state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantState {
    pub concentration: f64,
    pub temperature: f64,
}

impl PlantState {
    pub fn new(concentration: f64, temperature: f64) -> Self {
        Self {
            concentration,
            temperature,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.concentration.is_finite() && self.temperature.is_finite()
    }

    fn axpy(self, h: f64, d: PlantState) -> PlantState {
        PlantState {
            concentration: self.concentration + h * d.concentration,
            temperature: self.temperature + h * d.temperature,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CstrModel {
    params: PlantParameters,
    substeps: usize,
}

impl CstrModel {
    pub fn new(params: PlantParameters, substeps: usize) -> Self {
        Self {
            params,
            substeps: substeps.max(1),
        }
    }

    pub fn params(&self) -> &PlantParameters {
        &self.params
    }

    /// Reaction rate `k0·exp(−E/(R·T))·Ca`.
    pub fn reaction_rate(&self, state: PlantState) -> f64 {
        let p = &self.params;
        p.pre_exponential
            * (-p.activation_energy / (p.gas_constant * state.temperature)).exp()
            * state.concentration
    }

    /// Time derivatives `(dCa/dt, dT/dt)` at coolant temperature `coolant`.
    pub fn derivatives(&self, state: PlantState, coolant: f64) -> PlantState {
        let p = &self.params;
        let dilution = p.flow_rate / p.volume;
        let rate = self.reaction_rate(state);
        PlantState {
            concentration: dilution * (p.feed_concentration - state.concentration) - rate,
            temperature: dilution * (p.feed_temperature - state.temperature)
                - (p.heat_of_reaction / p.density_heat_capacity) * rate
                - (p.heat_transfer / (p.density_heat_capacity * p.volume))
                    * (state.temperature - coolant),
        }
    }

    /// Advance `dt` with the coolant held constant.
    pub fn step(&self, state: PlantState, coolant: f64, dt: f64) -> PlantState {
        let h = dt / self.substeps as f64;
        let mut x = state;
        for _ in 0..self.substeps {
            let k1 = self.derivatives(x, coolant);
            let k2 = self.derivatives(x.axpy(h / 2.0, k1), coolant);
            let k3 = self.derivatives(x.axpy(h / 2.0, k2), coolant);
            let k4 = self.derivatives(x.axpy(h, k3), coolant);
            x = PlantState {
                concentration: x.concentration
                    + h / 6.0
                        * (k1.concentration
                            + 2.0 * k2.concentration
                            + 2.0 * k3.concentration
                            + k4.concentration),
                temperature: x.temperature
                    + h / 6.0
                        * (k1.temperature
                            + 2.0 * k2.temperature
                            + 2.0 * k3.temperature
                            + k4.temperature),
            };
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CstrModel {
        CstrModel::new(PlantParameters::default(), 4)
    }

    #[test]
    fn initial_operating_point_is_near_steady() {
        // Tc ≈ 297.98 K balances the energy equation at the initial point.
        let d = model().derivatives(PlantState::new(8.5698, 311.2612), 297.98);
        assert!(d.concentration.abs() < 1e-2, "{d:?}");
        assert!(d.temperature.abs() < 1e-2, "{d:?}");
    }

    #[test]
    fn colder_coolant_cools_reactor() {
        let m = model();
        let start = PlantState::new(8.5698, 311.2612);
        let cold = m.step(start, 280.0, 1.0);
        let warm = m.step(start, 310.0, 1.0);
        assert!(cold.temperature < warm.temperature);
        assert!(cold.concentration > warm.concentration);
    }

    #[test]
    fn substeps_converge() {
        let start = PlantState::new(5.0, 340.0);
        let coarse = CstrModel::new(PlantParameters::default(), 4).step(start, 300.0, 1.0);
        let fine = CstrModel::new(PlantParameters::default(), 64).step(start, 300.0, 1.0);
        assert!((coarse.concentration - fine.concentration).abs() < 1e-2);
        assert!((coarse.temperature - fine.temperature).abs() < 1e-1);
    }

    #[test]
    fn zero_substeps_clamped_to_one() {
        let m = CstrModel::new(PlantParameters::default(), 0);
        assert!(m.step(PlantState::new(8.0, 312.0), 298.0, 1.0).is_finite());
    }
}
