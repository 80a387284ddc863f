//! Cluster-specific commands
//!
//! Every fixed-layout command the gateway can send or understand. Field wire
//! names are the keys accepted in a bus `set` request's `CommandData`.

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use crate::cluster::{id, Direction};
use crate::commands::TypedCommand;
use crate::error::Result;
use crate::fields::SetField;

// ============================================================================
// Identify
// ============================================================================

cluster_command! {
    /// Start or stop identifying (blinking, beeping) for a number of seconds
    Identify {
        identify_time: u16 => "IdentifyTime",
    }
}

cluster_command! {
    /// Ask which nodes are currently identifying
    IdentifyQuery {}
}

cluster_command! {
    /// Trigger a visual identify effect
    TriggerEffect {
        effect_identifier: u8 => "EffectIdentifier",
        effect_variant: u8 => "EffectVariant",
    }
}

// ============================================================================
// On/Off
// ============================================================================

cluster_command! {
    /// Switch off
    Off {}
}

cluster_command! {
    /// Switch on
    On {}
}

cluster_command! {
    /// Invert the current state
    Toggle {}
}

cluster_command! {
    /// Switch off with a fade effect
    OffWithEffect {
        effect_identifier: u8 => "EffectIdentifier",
        effect_variant: u8 => "EffectVariant",
    }
}

cluster_command! {
    /// Switch on for a bounded time (tenths of a second)
    OnWithTimedOff {
        on_off_control: u8 => "OnOffControl",
        on_time: u16 => "OnTime",
        off_wait_time: u16 => "OffWaitTime",
    }
}

// ============================================================================
// Level control
// ============================================================================

cluster_command! {
    /// Move to a level over a transition time (tenths of a second)
    MoveToLevel {
        level: u8 => "Level",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    /// Move continuously up or down at a rate
    Move {
        move_mode: u8 => "MoveMode",
        rate: u8 => "Rate",
    }
}

cluster_command! {
    /// Step up or down by a fixed amount
    Step {
        step_mode: u8 => "StepMode",
        step_size: u8 => "StepSize",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    /// Stop any level movement
    Stop {}
}

cluster_command! {
    MoveToLevelWithOnOff {
        level: u8 => "Level",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    MoveWithOnOff {
        move_mode: u8 => "MoveMode",
        rate: u8 => "Rate",
    }
}

cluster_command! {
    StepWithOnOff {
        step_mode: u8 => "StepMode",
        step_size: u8 => "StepSize",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    StopWithOnOff {}
}

// ============================================================================
// Color control
// ============================================================================

cluster_command! {
    MoveToHue {
        hue: u8 => "Hue",
        direction: u8 => "Direction",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    MoveToSaturation {
        saturation: u8 => "Saturation",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    MoveToHueAndSaturation {
        hue: u8 => "Hue",
        saturation: u8 => "Saturation",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    /// Move to a CIE 1931 color point
    MoveToColor {
        color_x: u16 => "ColorX",
        color_y: u16 => "ColorY",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    MoveToColorTemperature {
        color_temperature_mireds: u16 => "ColorTemperatureMireds",
        transition_time: u16 => "TransitionTime",
    }
}

cluster_command! {
    StopMoveStep {}
}

// ============================================================================
// IAS zone
// ============================================================================

cluster_command! {
    /// Alarm state change pushed by a security sensor
    ZoneStatusChangeNotification {
        zone_status: u16 => "ZoneStatus",
        extended_status: u8 => "ExtendedStatus",
        zone_id: u8 => "ZoneID",
        delay: u16 => "Delay",
    }
}

cluster_command! {
    /// A sensor asking to be enrolled
    ZoneEnrollRequest {
        zone_type: u16 => "ZoneType",
        manufacturer_code: u16 => "ManufacturerCode",
    }
}

cluster_command! {
    ZoneEnrollResponse {
        enroll_response_code: u8 => "EnrollResponseCode",
        zone_id: u8 => "ZoneID",
    }
}

// ============================================================================
// IAS warning device
// ============================================================================

cluster_command! {
    /// Sound a siren and/or strobe
    StartWarning {
        warning_mode: u8 => "WarningMode",
        warning_duration: u16 => "WarningDuration",
        strobe_duty_cycle: u8 => "StrobeDutyCycle",
        strobe_level: u8 => "StrobeLevel",
    }
}

cluster_command! {
    Squawk {
        squawk_mode: u8 => "SquawkMode",
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Static description of a registered cluster-specific command
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub cluster_id: u16,
    pub direction: Direction,
    pub command_id: u8,
    pub name: &'static str,
    pub(crate) new: fn() -> LocalCommand,
    pub(crate) decode: fn(&mut Bytes) -> Result<LocalCommand>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("cluster_id", &self.cluster_id)
            .field("direction", &self.direction)
            .field("command_id", &self.command_id)
            .field("name", &self.name)
            .finish()
    }
}

macro_rules! local_commands {
    ( $( $variant:ident => ($cluster:expr, $direction:expr, $command_id:expr) ),* $(,)? ) => {
        /// Any cluster-specific command known to this build
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum LocalCommand {
            $( $variant($variant), )*
        }

        impl LocalCommand {
            /// Command name
            pub fn name(&self) -> &'static str {
                match self {
                    $( LocalCommand::$variant(_) => stringify!($variant), )*
                }
            }

            /// The `(cluster, direction, command id)` this command is registered under
            pub fn key(&self) -> (u16, Direction, u8) {
                match self {
                    $( LocalCommand::$variant(_) => ($cluster, $direction, $command_id), )*
                }
            }

            /// Wire names of the command's fields, in encoding order
            pub fn field_names(&self) -> &'static [&'static str] {
                match self {
                    $( LocalCommand::$variant(_) => <$variant as TypedCommand>::FIELD_NAMES, )*
                }
            }

            /// Append the payload (without frame header)
            pub fn encode_payload(&self, buf: &mut BytesMut) {
                match self {
                    $( LocalCommand::$variant(c) => c.encode_payload(buf), )*
                }
            }
        }

        impl SetField for LocalCommand {
            fn set_field(&mut self, name: &str, value: &Value) -> Result<bool> {
                match self {
                    $( LocalCommand::$variant(c) => c.set_field(name, value), )*
                }
            }
        }

        /// Every command this build can encode or decode
        pub(crate) fn builtin_specs() -> Vec<CommandSpec> {
            vec![
                $(
                    CommandSpec {
                        cluster_id: $cluster,
                        direction: $direction,
                        command_id: $command_id,
                        name: stringify!($variant),
                        new: || LocalCommand::$variant($variant::default()),
                        decode: |buf| Ok(LocalCommand::$variant($variant::decode_payload(buf)?)),
                    },
                )*
            ]
        }
    };
}

use Direction::{ClientToServer as C2S, ServerToClient as S2C};

local_commands! {
    Identify => (id::IDENTIFY, C2S, 0x00),
    IdentifyQuery => (id::IDENTIFY, C2S, 0x01),
    TriggerEffect => (id::IDENTIFY, C2S, 0x40),

    Off => (id::ON_OFF, C2S, 0x00),
    On => (id::ON_OFF, C2S, 0x01),
    Toggle => (id::ON_OFF, C2S, 0x02),
    OffWithEffect => (id::ON_OFF, C2S, 0x40),
    OnWithTimedOff => (id::ON_OFF, C2S, 0x42),

    MoveToLevel => (id::LEVEL_CONTROL, C2S, 0x00),
    Move => (id::LEVEL_CONTROL, C2S, 0x01),
    Step => (id::LEVEL_CONTROL, C2S, 0x02),
    Stop => (id::LEVEL_CONTROL, C2S, 0x03),
    MoveToLevelWithOnOff => (id::LEVEL_CONTROL, C2S, 0x04),
    MoveWithOnOff => (id::LEVEL_CONTROL, C2S, 0x05),
    StepWithOnOff => (id::LEVEL_CONTROL, C2S, 0x06),
    StopWithOnOff => (id::LEVEL_CONTROL, C2S, 0x07),

    MoveToHue => (id::COLOR_CONTROL, C2S, 0x00),
    MoveToSaturation => (id::COLOR_CONTROL, C2S, 0x03),
    MoveToHueAndSaturation => (id::COLOR_CONTROL, C2S, 0x06),
    MoveToColor => (id::COLOR_CONTROL, C2S, 0x07),
    MoveToColorTemperature => (id::COLOR_CONTROL, C2S, 0x0a),
    StopMoveStep => (id::COLOR_CONTROL, C2S, 0x47),

    ZoneStatusChangeNotification => (id::IAS_ZONE, S2C, 0x00),
    ZoneEnrollRequest => (id::IAS_ZONE, S2C, 0x01),
    ZoneEnrollResponse => (id::IAS_ZONE, C2S, 0x00),

    StartWarning => (id::IAS_WD, C2S, 0x00),
    Squawk => (id::IAS_WD, C2S, 0x01),
}
