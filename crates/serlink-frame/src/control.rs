//! HDLC control field.
//!
//! ```text
//!  bit   7 6 5 | 4 | 3 2 | 1 | 0
//!  I     N(R)  | P |  N(S)   | 0
//!  S     N(R)  |P/F| fn  | 0 | 1
//!  U     m m m |P/F| m m | 1 | 1
//! ```

/// Sequence numbers are 3 bits wide.
pub const SEQ_MODULUS: u8 = 8;

/// Poll/final bit.
pub const PF_BIT: u8 = 0x10;

/// Supervisory frame function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisoryKind {
    ReceiveReady,
    ReceiveNotReady,
    Reject,
    SelectiveReject,
}

impl SupervisoryKind {
    fn code(self) -> u8 {
        match self {
            Self::ReceiveReady => 0,
            Self::ReceiveNotReady => 1,
            Self::Reject => 2,
            Self::SelectiveReject => 3,
        }
    }

    fn from_code(code: u8) -> Self {
        match code & 0x03 {
            0 => Self::ReceiveReady,
            1 => Self::ReceiveNotReady,
            2 => Self::Reject,
            _ => Self::SelectiveReject,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReceiveReady => "RR",
            Self::ReceiveNotReady => "RNR",
            Self::Reject => "REJ",
            Self::SelectiveReject => "SREJ",
        }
    }
}

/// Unnumbered frame command, with the P/F bit masked off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnnumberedKind {
    /// Set normal response mode (link establishment request).
    Snrm,
    /// Unnumbered acknowledgment.
    Ua,
    /// Disconnected mode.
    Dm,
    /// Disconnect request.
    Disc,
    /// Unnumbered information, delivered outside the window.
    Ui,
    /// Frame reject.
    Frmr,
    /// Any other modifier combination.
    Unknown(u8),
}

impl UnnumberedKind {
    pub const SNRM: u8 = 0x83;
    pub const UA: u8 = 0x63;
    pub const DM: u8 = 0x0F;
    pub const DISC: u8 = 0x43;
    pub const UI: u8 = 0x03;
    pub const FRMR: u8 = 0x87;

    fn to_byte(self) -> u8 {
        match self {
            Self::Snrm => Self::SNRM,
            Self::Ua => Self::UA,
            Self::Dm => Self::DM,
            Self::Disc => Self::DISC,
            Self::Ui => Self::UI,
            Self::Frmr => Self::FRMR,
            Self::Unknown(b) => b & !PF_BIT,
        }
    }

    fn from_byte(byte: u8) -> Self {
        match byte & !PF_BIT {
            Self::SNRM => Self::Snrm,
            Self::UA => Self::Ua,
            Self::DM => Self::Dm,
            Self::DISC => Self::Disc,
            Self::UI => Self::Ui,
            Self::FRMR => Self::Frmr,
            other => Self::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Snrm => "SNRM",
            Self::Ua => "UA",
            Self::Dm => "DM",
            Self::Disc => "DISC",
            Self::Ui => "UI",
            Self::Frmr => "FRMR",
            Self::Unknown(_) => "U?",
        }
    }
}

/// Decoded control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Information { ns: u8, nr: u8, poll: bool },
    Supervisory { kind: SupervisoryKind, nr: u8, poll: bool },
    Unnumbered { kind: UnnumberedKind, poll: bool },
}

impl Control {
    /// Information frame carrying `ns` and piggybacking `nr`.
    pub fn information(ns: u8, nr: u8) -> Self {
        Self::Information {
            ns: ns % SEQ_MODULUS,
            nr: nr % SEQ_MODULUS,
            poll: false,
        }
    }

    /// Supervisory frame acknowledging up to `nr`.
    pub fn supervisory(kind: SupervisoryKind, nr: u8) -> Self {
        Self::Supervisory {
            kind,
            nr: nr % SEQ_MODULUS,
            poll: false,
        }
    }

    pub fn unnumbered(kind: UnnumberedKind) -> Self {
        Self::Unnumbered { kind, poll: false }
    }

    pub fn from_byte(byte: u8) -> Self {
        let poll = byte & PF_BIT != 0;
        let nr = byte >> 5;
        if byte & 0x01 == 0 {
            Self::Information {
                ns: (byte >> 1) & 0x07,
                nr,
                poll,
            }
        } else if byte & 0x03 == 0x01 {
            Self::Supervisory {
                kind: SupervisoryKind::from_code(byte >> 2),
                nr,
                poll,
            }
        } else {
            Self::Unnumbered {
                kind: UnnumberedKind::from_byte(byte),
                poll,
            }
        }
    }

    pub fn to_byte(self) -> u8 {
        let pf = |poll: bool| if poll { PF_BIT } else { 0 };
        match self {
            Self::Information { ns, nr, poll } => {
                ((ns & 0x07) << 1) | pf(poll) | ((nr & 0x07) << 5)
            }
            Self::Supervisory { kind, nr, poll } => {
                0x01 | (kind.code() << 2) | pf(poll) | ((nr & 0x07) << 5)
            }
            Self::Unnumbered { kind, poll } => kind.to_byte() | pf(poll),
        }
    }

    /// Short mnemonic for logs and the CLI decoder.
    pub fn name(self) -> &'static str {
        match self {
            Self::Information { .. } => "I",
            Self::Supervisory { kind, .. } => kind.name(),
            Self::Unnumbered { kind, .. } => kind.name(),
        }
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Information { ns, nr, .. } => write!(f, "I ns={ns} nr={nr}"),
            Self::Supervisory { kind, nr, .. } => write!(f, "{} nr={nr}", kind.name()),
            Self::Unnumbered { kind, .. } => match kind {
                UnnumberedKind::Unknown(b) => write!(f, "U {b:#04x}"),
                other => f.write_str(other.name()),
            },
        }
    }
}
