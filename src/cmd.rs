//! Command set and wire encoding for the FLIR pan-tilt unit.
//!
//! Protocol overview:
//! - Format: ASCII command/response over RS-232 or TCP
//! - Commands: `{Axis}{Verb}{Value}` followed by a single space delimiter
//! - Example: `"TO120 "` (tilt axis, offset position, 120 ticks)
//! - Acknowledgements: `"*\r"`, `"* <payload>\r"` or `"!<message>\r"`
//!
//! The host never sends a carriage return; the device terminates its own
//! acknowledgements with one. [`Command::encode`] is a pure total function of
//! the variant's fields, so anything that would be rejected on the wire (a
//! preset index above 32) is made unconstructible instead of checked here.

use std::fmt;

use crate::error::{PtuError, PtuResult};

/// Field delimiter appended after the final field of every command.
pub const DELIM_SP: &str = " ";
/// Terminator of every device acknowledgement.
pub const DELIM_CR: u8 = b'\r';
/// First byte of a successful acknowledgement.
pub const SUCC_BEG: u8 = b'*';
/// First byte of an error acknowledgement.
pub const ERR_BEG: u8 = b'!';
/// The canonical payload-less success acknowledgement.
pub const SUCC_FRAME: &[u8] = b"*\r";

/// The two mechanical axes of the pan-tilt unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    /// Horizontal degree of freedom.
    Pan,
    /// Vertical degree of freedom.
    Tilt,
}

impl Axis {
    /// The axis selector letter used on the wire.
    pub fn prefix(self) -> char {
        match self {
            Axis::Pan => 'P',
            Axis::Tilt => 'T',
        }
    }
}

/// Actions on stored preset positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PresetAction {
    /// Store the current position under the index.
    Set,
    /// Move to the stored position.
    Goto,
    /// Clear the stored position.
    Clear,
}

impl PresetAction {
    fn selector(self) -> char {
        match self {
            PresetAction::Set => 'S',
            PresetAction::Goto => 'G',
            PresetAction::Clear => 'C',
        }
    }
}

/// Which bound of the desired-speed range a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SpeedBound {
    Upper,
    Lower,
}

impl SpeedBound {
    fn selector(self) -> char {
        match self {
            SpeedBound::Upper => 'U',
            SpeedBound::Lower => 'L',
        }
    }
}

/// Speed control modes of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ControlMode {
    /// Position and speed commands act independently.
    Independent,
    /// Pure velocity control.
    PureVelocity,
}

impl ControlMode {
    fn selector(self) -> char {
        match self {
            ControlMode::Independent => 'I',
            ControlMode::PureVelocity => 'V',
        }
    }
}

/// Validated preset slot index, 0 through 32.
///
/// Construction is the only place the range is checked; a `Preset` command
/// holding a `PresetIndex` therefore always encodes cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetIndex(u8);

impl PresetIndex {
    /// Highest preset slot the unit stores.
    pub const MAX: u8 = 32;

    /// Validate and wrap a preset slot index.
    pub fn new(index: u8) -> PtuResult<Self> {
        if index > Self::MAX {
            return Err(PtuError::InvalidArgument(format!(
                "preset index must be between 0 and {}, got {index}",
                Self::MAX
            )));
        }
        Ok(Self(index))
    }

    /// The wrapped slot index.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for PresetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One typed command of the pan-tilt protocol.
///
/// `offset` selects the relative-position register (`O`) instead of the
/// absolute one (`P`); it only exists on the position commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Query the current position of an axis, in ticks.
    GetPosition { axis: Axis, offset: bool },
    /// Command a position for an axis, in ticks.
    SetPosition { axis: Axis, offset: bool, ticks: i32 },
    /// Query an axis resolution in arc-seconds per tick.
    GetResolution { axis: Axis },
    /// Query the minimum reachable position of an axis, in ticks.
    GetMinPosition { axis: Axis },
    /// Query the maximum reachable position of an axis, in ticks.
    GetMaxPosition { axis: Axis },
    /// Query whether pan position limits are enforced.
    GetPanLimitMode,
    /// Enable or disable pan position limit enforcement.
    SetPanLimitMode { enabled: bool },
    /// Position commands execute as soon as they are received.
    EnableImmediatePosExec,
    /// Position commands wait for an await command, for coordinated moves.
    EnableSlavedPosExec,
    /// Block until the previous position command has completed.
    AwaitCompletion,
    /// Halt position commands on the selected axes.
    ///
    /// Selecting neither axis encodes to the empty string, a no-op.
    Halt { pan: bool, tilt: bool },
    /// Define and start repetitive scanning between two pan positions.
    AutoScanPan { pan: (i32, i32) },
    /// Define and start repetitive scanning over pan and tilt ranges.
    AutoScanBoth { pan: (i32, i32), tilt: (i32, i32) },
    /// Restart the most recently defined autoscan pattern.
    ResumeAutoScan,
    /// Query whether autoscan starts at power-up.
    GetAutoScanAtPowerUp,
    /// Enable or disable autoscan at power-up.
    SetAutoScanAtPowerUp { enabled: bool },
    /// Store, go to or clear a preset position.
    Preset {
        index: PresetIndex,
        action: PresetAction,
    },
    /// Query the desired speed of an axis, in ticks per second.
    GetSpeed { axis: Axis },
    /// Set the desired speed of an axis, in ticks per second.
    SetSpeed { axis: Axis, value: i32 },
    /// Query the instantaneous speed of an axis.
    GetCurrentSpeed { axis: Axis },
    /// Adjust the desired speed by an offset from the current speed.
    SetDeltaSpeed { axis: Axis, delta: i32 },
    /// Query the desired acceleration of an axis, in ticks per second squared.
    GetAccel { axis: Axis },
    /// Set the desired acceleration of an axis.
    SetAccel { axis: Axis, value: i32 },
    /// Query the base (start-up) speed of an axis.
    GetBaseSpeed { axis: Axis },
    /// Set the base (start-up) speed of an axis.
    SetBaseSpeed { axis: Axis, value: i32 },
    /// Query one bound of the desired-speed range.
    GetSpeedBound { axis: Axis, bound: SpeedBound },
    /// Set one bound of the desired-speed range.
    SetSpeedBound {
        axis: Axis,
        bound: SpeedBound,
        value: i32,
    },
    /// Query the speed control mode.
    GetControlMode,
    /// Set the speed control mode.
    SetControlMode { mode: ControlMode },
    /// Switch the device to terse acknowledgements.
    SetFeedbackTerse,
}

impl Command {
    /// Encode the command into its wire string.
    ///
    /// The result always ends with the space delimiter and never contains a
    /// carriage return. `Halt` with neither axis selected encodes to the
    /// empty string.
    pub fn encode(&self) -> String {
        use Command::*;

        match *self {
            GetPosition { axis, offset } => {
                format!("{}{}{DELIM_SP}", axis.prefix(), register(offset))
            }
            SetPosition { axis, offset, ticks } => {
                format!("{}{}{ticks}{DELIM_SP}", axis.prefix(), register(offset))
            }
            GetResolution { axis } => format!("{}R{DELIM_SP}", axis.prefix()),
            GetMinPosition { axis } => format!("{}N{DELIM_SP}", axis.prefix()),
            GetMaxPosition { axis } => format!("{}X{DELIM_SP}", axis.prefix()),
            GetPanLimitMode => format!("L{DELIM_SP}"),
            SetPanLimitMode { enabled } => format!("L{}{DELIM_SP}", enable_flag(enabled)),
            EnableImmediatePosExec => format!("I{DELIM_SP}"),
            EnableSlavedPosExec => format!("S{DELIM_SP}"),
            AwaitCompletion => format!("A{DELIM_SP}"),
            Halt { pan, tilt } => match (pan, tilt) {
                (true, true) => format!("H{DELIM_SP}"),
                (true, false) => format!("HP{DELIM_SP}"),
                (false, true) => format!("HT{DELIM_SP}"),
                (false, false) => String::new(),
            },
            AutoScanPan { pan: (p1, p2) } => format!("M{p1},{p2}{DELIM_SP}"),
            AutoScanBoth {
                pan: (p1, p2),
                tilt: (t1, t2),
            } => format!("M{p1},{p2},{t1},{t2}{DELIM_SP}"),
            ResumeAutoScan => format!("M{DELIM_SP}"),
            GetAutoScanAtPowerUp => format!("MQ{DELIM_SP}"),
            SetAutoScanAtPowerUp { enabled } => format!("M{}{DELIM_SP}", enable_flag(enabled)),
            Preset { index, action } => format!("X{}{index}{DELIM_SP}", action.selector()),
            GetSpeed { axis } => format!("{}S{DELIM_SP}", axis.prefix()),
            SetSpeed { axis, value } => format!("{}S{value}{DELIM_SP}", axis.prefix()),
            GetCurrentSpeed { axis } => format!("{}D{DELIM_SP}", axis.prefix()),
            SetDeltaSpeed { axis, delta } => format!("{}D{delta}{DELIM_SP}", axis.prefix()),
            GetAccel { axis } => format!("{}A{DELIM_SP}", axis.prefix()),
            SetAccel { axis, value } => format!("{}A{value}{DELIM_SP}", axis.prefix()),
            GetBaseSpeed { axis } => format!("{}B{DELIM_SP}", axis.prefix()),
            SetBaseSpeed { axis, value } => format!("{}B{value}{DELIM_SP}", axis.prefix()),
            GetSpeedBound { axis, bound } => {
                format!("{}{}{DELIM_SP}", axis.prefix(), bound.selector())
            }
            SetSpeedBound { axis, bound, value } => {
                format!("{}{}{value}{DELIM_SP}", axis.prefix(), bound.selector())
            }
            GetControlMode => format!("C{DELIM_SP}"),
            SetControlMode { mode } => format!("C{}{DELIM_SP}", mode.selector()),
            SetFeedbackTerse => format!("FT{DELIM_SP}"),
        }
    }
}

/// Position register selector: absolute (`P`) or offset (`O`).
fn register(offset: bool) -> char {
    if offset {
        'O'
    } else {
        'P'
    }
}

/// Boolean setter token. The protocol uses letters, never `1`/`0`.
fn enable_flag(enabled: bool) -> char {
    if enabled {
        'E'
    } else {
        'D'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_commands() {
        let cmd = Command::GetPosition {
            axis: Axis::Pan,
            offset: false,
        };
        assert_eq!(cmd.encode(), "PP ");

        let cmd = Command::GetPosition {
            axis: Axis::Tilt,
            offset: true,
        };
        assert_eq!(cmd.encode(), "TO ");

        let cmd = Command::SetPosition {
            axis: Axis::Tilt,
            offset: true,
            ticks: 120,
        };
        assert_eq!(cmd.encode(), "TO120 ");

        let cmd = Command::SetPosition {
            axis: Axis::Pan,
            offset: false,
            ticks: -1500,
        };
        assert_eq!(cmd.encode(), "PP-1500 ");
    }

    #[test]
    fn halt_variants() {
        let halt = |pan, tilt| Command::Halt { pan, tilt }.encode();
        assert_eq!(halt(true, true), "H ");
        assert_eq!(halt(true, false), "HP ");
        assert_eq!(halt(false, true), "HT ");
        assert_eq!(halt(false, false), "");
    }

    #[test]
    fn autoscan_arities() {
        let cmd = Command::AutoScanPan { pan: (-2000, 2000) };
        assert_eq!(cmd.encode(), "M-2000,2000 ");

        let cmd = Command::AutoScanBoth {
            pan: (-2000, 2000),
            tilt: (-300, 300),
        };
        assert_eq!(cmd.encode(), "M-2000,2000,-300,300 ");

        assert_eq!(Command::ResumeAutoScan.encode(), "M ");
        assert_eq!(Command::GetAutoScanAtPowerUp.encode(), "MQ ");
        assert_eq!(
            Command::SetAutoScanAtPowerUp { enabled: true }.encode(),
            "ME "
        );
    }

    #[test]
    fn letter_tokens_for_boolean_setters() {
        assert_eq!(Command::SetPanLimitMode { enabled: true }.encode(), "LE ");
        assert_eq!(Command::SetPanLimitMode { enabled: false }.encode(), "LD ");
        assert_eq!(
            Command::SetControlMode {
                mode: ControlMode::Independent
            }
            .encode(),
            "CI "
        );
        assert_eq!(
            Command::SetControlMode {
                mode: ControlMode::PureVelocity
            }
            .encode(),
            "CV "
        );
    }

    #[test]
    fn speed_and_accel_commands() {
        let pan = Axis::Pan;
        assert_eq!(Command::GetSpeed { axis: pan }.encode(), "PS ");
        assert_eq!(Command::SetSpeed { axis: pan, value: 1000 }.encode(), "PS1000 ");
        assert_eq!(Command::GetCurrentSpeed { axis: pan }.encode(), "PD ");
        assert_eq!(
            Command::SetDeltaSpeed {
                axis: pan,
                delta: -50
            }
            .encode(),
            "PD-50 "
        );
        assert_eq!(Command::GetAccel { axis: pan }.encode(), "PA ");
        assert_eq!(Command::GetBaseSpeed { axis: Axis::Tilt }.encode(), "TB ");
        assert_eq!(
            Command::GetSpeedBound {
                axis: pan,
                bound: SpeedBound::Upper
            }
            .encode(),
            "PU "
        );
        assert_eq!(
            Command::SetSpeedBound {
                axis: Axis::Tilt,
                bound: SpeedBound::Lower,
                value: 57
            }
            .encode(),
            "TL57 "
        );
    }

    #[test]
    fn preset_encoding_carries_index() {
        let index = PresetIndex::new(3).unwrap();
        let cmd = Command::Preset {
            index,
            action: PresetAction::Set,
        };
        assert_eq!(cmd.encode(), "XS3 ");

        let cmd = Command::Preset {
            index,
            action: PresetAction::Goto,
        };
        assert_eq!(cmd.encode(), "XG3 ");
    }

    #[test]
    fn preset_index_bounds() {
        assert!(PresetIndex::new(0).is_ok());
        assert!(PresetIndex::new(32).is_ok());
        assert!(matches!(
            PresetIndex::new(33),
            Err(PtuError::InvalidArgument(_))
        ));
    }

    #[test]
    fn every_command_ends_with_the_delimiter() {
        let samples = [
            Command::GetResolution { axis: Axis::Pan },
            Command::GetMinPosition { axis: Axis::Tilt },
            Command::GetMaxPosition { axis: Axis::Pan },
            Command::GetPanLimitMode,
            Command::EnableImmediatePosExec,
            Command::EnableSlavedPosExec,
            Command::AwaitCompletion,
            Command::GetControlMode,
            Command::SetFeedbackTerse,
        ];
        for cmd in samples {
            let wire = cmd.encode();
            assert!(wire.ends_with(DELIM_SP), "{cmd:?} encoded as {wire:?}");
            assert!(!wire.contains('\r'), "{cmd:?} must not carry a CR");
        }
    }
}
