//! Seam between the device runtime and the component it controls.

use crate::state_machine::{ObsTrigger, OpTrigger};
use serde::{Deserialize, Serialize};

/// Drives communication with the controlled component
pub trait ComponentManager: Send + Sync {
    fn start_communicating(&self) -> anyhow::Result<()>;

    fn stop_communicating(&self) -> anyhow::Result<()>;
}

/// Component manager for devices without a separate component
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComponent;

impl ComponentManager for NoComponent {
    fn start_communicating(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop_communicating(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A change reported by the component itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentSignal {
    Disconnected,
    Unknown,
    Off,
    Standby,
    On,
    Fault,
    Resourced,
    Unresourced,
    Configured,
    Unconfigured,
    Scanning,
    NotScanning,
    ObsFault,
}

impl ComponentSignal {
    /// Operational-state trigger for power and fault signals
    pub fn op_trigger(&self) -> Option<OpTrigger> {
        let trigger = match self {
            Self::Disconnected => OpTrigger::ComponentDisconnected,
            Self::Unknown => OpTrigger::ComponentUnknown,
            Self::Off => OpTrigger::ComponentOff,
            Self::Standby => OpTrigger::ComponentStandby,
            Self::On => OpTrigger::ComponentOn,
            Self::Fault => OpTrigger::ComponentFault,
            _ => return None,
        };
        Some(trigger)
    }

    /// Observation-state trigger for resourcing, configuration and scan signals
    pub fn obs_trigger(&self) -> Option<ObsTrigger> {
        let trigger = match self {
            Self::Resourced => ObsTrigger::ComponentResourced,
            Self::Unresourced => ObsTrigger::ComponentUnresourced,
            Self::Configured => ObsTrigger::ComponentConfigured,
            Self::Unconfigured => ObsTrigger::ComponentUnconfigured,
            Self::Scanning => ObsTrigger::ComponentScanning,
            Self::NotScanning => ObsTrigger::ComponentNotScanning,
            Self::ObsFault => ObsTrigger::ComponentObsFault,
            _ => return None,
        };
        Some(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_signal_maps_to_exactly_one_model() {
        let signals = [
            ComponentSignal::Disconnected,
            ComponentSignal::Unknown,
            ComponentSignal::Off,
            ComponentSignal::Standby,
            ComponentSignal::On,
            ComponentSignal::Fault,
            ComponentSignal::Resourced,
            ComponentSignal::Unresourced,
            ComponentSignal::Configured,
            ComponentSignal::Unconfigured,
            ComponentSignal::Scanning,
            ComponentSignal::NotScanning,
            ComponentSignal::ObsFault,
        ];
        for signal in signals {
            assert_ne!(
                signal.op_trigger().is_some(),
                signal.obs_trigger().is_some(),
                "{signal:?}"
            );
        }
        assert!(ComponentSignal::ObsFault
            .obs_trigger()
            .is_some_and(|trigger| trigger.is_component_signal()));
    }
}
