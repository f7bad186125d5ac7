use crate::param::ParamValue;

/// Which parameter set a broadcast phase draws from.
///
/// `None` is the literal "data" phase of a broadcast cycle: it draws
/// from `experimental_params` rather than a named `broadcast_tags`
/// override bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseTag {
    PreReading,
    Data,
    PostReading,
    None,
}

impl PhaseTag {
    /// The config key used to look up a broadcast-tag override bundle,
    /// or `None` for the bare `experimental_params` set.
    pub fn tag_name(self) -> Option<&'static str> {
        match self {
            PhaseTag::PreReading => Some("pre_reading"),
            PhaseTag::PostReading => Some("post_reading"),
            PhaseTag::Data | PhaseTag::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Immediate,
    Recurring,
}

/// A transient unit of work bound for the microcontroller over the
/// serial link. Consumed at most once by the broadcast engine's
/// `run()` loop, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub param: String,
    pub value: ParamValue,
    pub kind: CommandKind,
    pub phase_tag: Option<PhaseTag>,
}

impl Command {
    pub fn immediate(param: impl Into<String>, value: ParamValue) -> Self {
        Command {
            param: param.into(),
            value,
            kind: CommandKind::Immediate,
            phase_tag: None,
        }
    }

    pub fn recurring(param: impl Into<String>, value: ParamValue, phase_tag: PhaseTag) -> Self {
        Command {
            param: param.into(),
            value,
            kind: CommandKind::Recurring,
            phase_tag: Some(phase_tag),
        }
    }
}
