use crate::named_enum;

named_enum! {
    /// Triggers accepted by the operational state machine
    pub enum OpTrigger {
        InitInvoked => "init_invoked",
        InitCompleted => "init_completed",
        ComponentDisconnected => "component_disconnected",
        ComponentUnknown => "component_unknown",
        ComponentOff => "component_off",
        ComponentStandby => "component_standby",
        ComponentOn => "component_on",
        ComponentFault => "component_fault",
    }
}

named_enum! {
    /// Triggers accepted by the admin mode state machine
    pub enum AdminTrigger {
        ToNotFitted => "to_notfitted",
        ToReserved => "to_reserved",
        ToOffline => "to_offline",
        ToMaintenance => "to_maintenance",
        ToOnline => "to_online",
    }
}

impl AdminTrigger {
    /// The action that moves the machine into `mode`
    pub fn for_mode(mode: super::states::AdminMode) -> Self {
        use super::states::AdminMode;
        match mode {
            AdminMode::NotFitted => Self::ToNotFitted,
            AdminMode::Reserved => Self::ToReserved,
            AdminMode::Offline => Self::ToOffline,
            AdminMode::Maintenance => Self::ToMaintenance,
            AdminMode::Online => Self::ToOnline,
        }
    }
}

named_enum! {
    /// Triggers accepted by the observation state machines.
    ///
    /// `*_invoked` / `*_completed` bracket a command; `component_*` are signals
    /// from the observed component.
    pub enum ObsTrigger {
        AssignInvoked => "assign_invoked",
        AssignCompleted => "assign_completed",
        ReleaseInvoked => "release_invoked",
        ReleaseCompleted => "release_completed",
        ConfigureInvoked => "configure_invoked",
        ConfigureCompleted => "configure_completed",
        EndInvoked => "end_invoked",
        ScanInvoked => "scan_invoked",
        EndScanInvoked => "end_scan_invoked",
        AbortInvoked => "abort_invoked",
        AbortCompleted => "abort_completed",
        ObsResetInvoked => "obsreset_invoked",
        ObsResetCompleted => "obsreset_completed",
        RestartInvoked => "restart_invoked",
        RestartCompleted => "restart_completed",
        ComponentResourced => "component_resourced",
        ComponentUnresourced => "component_unresourced",
        ComponentConfigured => "component_configured",
        ComponentUnconfigured => "component_unconfigured",
        ComponentScanning => "component_scanning",
        ComponentNotScanning => "component_not_scanning",
        ComponentObsFault => "component_obsfault",
    }
}

impl ObsTrigger {
    /// Whether this trigger reports component activity rather than a command bracket
    pub fn is_component_signal(&self) -> bool {
        self.as_str().starts_with("component_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::states::AdminMode;

    #[test]
    fn test_trigger_names() {
        assert_eq!(OpTrigger::InitInvoked.to_string(), "init_invoked");
        assert_eq!(
            "component_obsfault".parse::<ObsTrigger>().unwrap(),
            ObsTrigger::ComponentObsFault
        );
        assert!("to_nowhere".parse::<AdminTrigger>().is_err());
    }

    #[test]
    fn test_admin_trigger_for_mode() {
        for mode in AdminMode::ALL {
            let trigger = AdminTrigger::for_mode(*mode);
            assert!(trigger.as_str().starts_with("to_"));
        }
        assert_eq!(
            AdminTrigger::for_mode(AdminMode::Online),
            AdminTrigger::ToOnline
        );
    }

    #[test]
    fn test_component_signal_classification() {
        assert!(ObsTrigger::ComponentScanning.is_component_signal());
        assert!(!ObsTrigger::AbortInvoked.is_component_signal());
    }
}
