use serde::{Deserialize, Serialize};

/// Number of plant channels in every observation.
pub const CHANNEL_COUNT: usize = 8;

/// Name of the channel the risk perceptor merges into observations.
pub const RISK_CHANNEL: &str = "thermal_runaway_predict";

/// Plant sensor channels, in canonical sequence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Reactor temperature (K)
    #[serde(rename = "T")]
    Temperature,
    /// Coolant temperature (K), the manipulated variable
    #[serde(rename = "Tc")]
    CoolantTemperature,
    /// Reactant concentration (kmol/m³)
    #[serde(rename = "Ca")]
    Concentration,
    /// Concentration setpoint
    #[serde(rename = "Cref")]
    ConcentrationSetpoint,
    /// Temperature setpoint
    #[serde(rename = "Tref")]
    TemperatureSetpoint,
    #[serde(rename = "Conc_Error")]
    ConcentrationError,
    #[serde(rename = "Eps_Yield")]
    Yield,
    #[serde(rename = "Cb_Prod")]
    Product,
}

impl Channel {
    /// All channels in canonical order.
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Temperature,
        Channel::CoolantTemperature,
        Channel::Concentration,
        Channel::ConcentrationSetpoint,
        Channel::TemperatureSetpoint,
        Channel::ConcentrationError,
        Channel::Yield,
        Channel::Product,
    ];

    /// Wire name of the channel.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Temperature => "T",
            Channel::CoolantTemperature => "Tc",
            Channel::Concentration => "Ca",
            Channel::ConcentrationSetpoint => "Cref",
            Channel::TemperatureSetpoint => "Tref",
            Channel::ConcentrationError => "Conc_Error",
            Channel::Yield => "Eps_Yield",
            Channel::Product => "Cb_Prod",
        }
    }

    /// Position of the channel in an ordered sequence.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Channel::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key a skill controller may declare in its filtered sensor space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKey {
    Plant(Channel),
    ThermalRunawayPredict,
}

impl SensorKey {
    pub fn name(&self) -> &'static str {
        match self {
            SensorKey::Plant(channel) => channel.name(),
            SensorKey::ThermalRunawayPredict => RISK_CHANNEL,
        }
    }

    /// The eight plant channels.
    pub fn plant_space() -> Vec<SensorKey> {
        Channel::ALL.into_iter().map(SensorKey::Plant).collect()
    }

    /// The eight plant channels plus the risk channel.
    pub fn risk_space() -> Vec<SensorKey> {
        let mut space = Self::plant_space();
        space.push(SensorKey::ThermalRunawayPredict);
        space
    }
}

impl std::fmt::Display for SensorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
