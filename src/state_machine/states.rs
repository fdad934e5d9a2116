use crate::named_enum;

named_enum! {
    /// Internal states of the operational state machine.
    ///
    /// The `Init*` states record what the component state will resolve to once
    /// device initialisation completes.
    pub enum OpMachineState {
        Uninitialised => "_UNINITIALISED",
        InitDisable => "INIT_DISABLE",
        InitUnknown => "INIT_UNKNOWN",
        InitOff => "INIT_OFF",
        InitStandby => "INIT_STANDBY",
        InitOn => "INIT_ON",
        InitFault => "INIT_FAULT",
        Disable => "DISABLE",
        Unknown => "UNKNOWN",
        Off => "OFF",
        Standby => "STANDBY",
        On => "ON",
        Fault => "FAULT",
    }
}

impl OpMachineState {
    /// Projection onto the externally reported operational state.
    /// `Uninitialised` has no external value.
    pub fn op_state(&self) -> Option<OpState> {
        let state = match self {
            Self::Uninitialised => return None,
            Self::InitDisable
            | Self::InitUnknown
            | Self::InitOff
            | Self::InitStandby
            | Self::InitOn
            | Self::InitFault => OpState::Init,
            Self::Disable => OpState::Disable,
            Self::Unknown => OpState::Unknown,
            Self::Off => OpState::Off,
            Self::Standby => OpState::Standby,
            Self::On => OpState::On,
            Self::Fault => OpState::Fault,
        };
        Some(state)
    }

    pub fn is_initialising(&self) -> bool {
        matches!(self.op_state(), Some(OpState::Init))
    }
}

impl Default for OpMachineState {
    fn default() -> Self {
        Self::Uninitialised
    }
}

named_enum! {
    /// Externally reported operational state
    pub enum OpState {
        Init => "INIT",
        Disable => "DISABLE",
        Unknown => "UNKNOWN",
        Off => "OFF",
        Standby => "STANDBY",
        On => "ON",
        Fault => "FAULT",
    }
}

named_enum! {
    /// Administrative mode of a device
    pub enum AdminMode {
        Online => "ONLINE",
        Offline => "OFFLINE",
        Maintenance => "MAINTENANCE",
        NotFitted => "NOT_FITTED",
        Reserved => "RESERVED",
    }
}

impl AdminMode {
    /// Modes in which the device should be talking to its component
    pub fn wants_communication(&self) -> bool {
        matches!(self, Self::Online | Self::Maintenance)
    }
}

impl Default for AdminMode {
    fn default() -> Self {
        Self::Maintenance
    }
}

named_enum! {
    /// Internal states of the observation state machines.
    ///
    /// `Resourcing*` and `Configuring*` substates track whether the component has
    /// already reported resources / configuration while the command is running.
    pub enum ObsMachineState {
        Empty => "EMPTY",
        ResourcingEmpty => "RESOURCING_EMPTY",
        ResourcingIdle => "RESOURCING_IDLE",
        Idle => "IDLE",
        ConfiguringIdle => "CONFIGURING_IDLE",
        ConfiguringReady => "CONFIGURING_READY",
        Ready => "READY",
        Scanning => "SCANNING",
        Aborting => "ABORTING",
        Aborted => "ABORTED",
        Resetting => "RESETTING",
        Restarting => "RESTARTING",
        Fault => "FAULT",
    }
}

impl ObsMachineState {
    /// Projection onto the externally reported observation state
    pub fn obs_state(&self) -> ObsState {
        match self {
            Self::Empty => ObsState::Empty,
            Self::ResourcingEmpty | Self::ResourcingIdle => ObsState::Resourcing,
            Self::Idle => ObsState::Idle,
            Self::ConfiguringIdle | Self::ConfiguringReady => ObsState::Configuring,
            Self::Ready => ObsState::Ready,
            Self::Scanning => ObsState::Scanning,
            Self::Aborting => ObsState::Aborting,
            Self::Aborted => ObsState::Aborted,
            Self::Resetting => ObsState::Resetting,
            Self::Restarting => ObsState::Restarting,
            Self::Fault => ObsState::Fault,
        }
    }
}

named_enum! {
    /// Externally reported observation state
    pub enum ObsState {
        Empty => "EMPTY",
        Resourcing => "RESOURCING",
        Idle => "IDLE",
        Configuring => "CONFIGURING",
        Ready => "READY",
        Scanning => "SCANNING",
        Aborting => "ABORTING",
        Aborted => "ABORTED",
        Resetting => "RESETTING",
        Fault => "FAULT",
        Restarting => "RESTARTING",
    }
}
