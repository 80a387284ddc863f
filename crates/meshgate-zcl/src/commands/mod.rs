//! Decoded cluster library commands

pub mod global;
pub mod local;

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::cluster::{FrameType, GlobalCommandId};
use crate::error::Result;
use crate::fields::SetField;
use crate::frame::FrameHeader;

pub use global::{
    AttributeRecord, DefaultResponse, ReadAttributeRecord, ReadAttributes,
    ReadAttributesResponse, ReportAttributes, WriteAttributes, WriteAttributesResponse,
    WriteStatusRecord,
};
pub use local::{CommandSpec, LocalCommand};

/// A fixed-layout command with named fields
pub trait TypedCommand: SetField + Default {
    /// Wire names of the fields, in encoding order
    const FIELD_NAMES: &'static [&'static str];

    /// Append the payload (without frame header)
    fn encode_payload(&self, buf: &mut BytesMut);

    /// Read the payload
    fn decode_payload(buf: &mut Bytes) -> Result<Self>;
}

/// The payload of a cluster library frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum ZclCommand {
    ReadAttributes(ReadAttributes),
    ReadAttributesResponse(ReadAttributesResponse),
    WriteAttributes(WriteAttributes),
    WriteAttributesResponse(WriteAttributesResponse),
    ReportAttributes(ReportAttributes),
    DefaultResponse(DefaultResponse),
    /// A cluster-specific command known to the registry
    Local(LocalCommand),
    /// Anything this build does not model
    Unrecognized {
        frame_type: FrameType,
        command_identifier: u8,
        #[serde(skip)]
        payload: Bytes,
    },
}

impl ZclCommand {
    /// Frame type the command travels in
    pub fn frame_type(&self) -> FrameType {
        match self {
            ZclCommand::Local(_) => FrameType::ClusterSpecific,
            ZclCommand::Unrecognized { frame_type, .. } => *frame_type,
            _ => FrameType::Global,
        }
    }

    /// Command identifier within its frame type
    pub fn command_identifier(&self) -> u8 {
        match self {
            ZclCommand::ReadAttributes(_) => GlobalCommandId::ReadAttributes as u8,
            ZclCommand::ReadAttributesResponse(_) => GlobalCommandId::ReadAttributesResponse as u8,
            ZclCommand::WriteAttributes(_) => GlobalCommandId::WriteAttributes as u8,
            ZclCommand::WriteAttributesResponse(_) => GlobalCommandId::WriteAttributesResponse as u8,
            ZclCommand::ReportAttributes(_) => GlobalCommandId::ReportAttributes as u8,
            ZclCommand::DefaultResponse(_) => GlobalCommandId::DefaultResponse as u8,
            ZclCommand::Local(command) => command.key().2,
            ZclCommand::Unrecognized {
                command_identifier, ..
            } => *command_identifier,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ZclCommand::ReadAttributes(_) => "ReadAttributes",
            ZclCommand::ReadAttributesResponse(_) => "ReadAttributesResponse",
            ZclCommand::WriteAttributes(_) => "WriteAttributes",
            ZclCommand::WriteAttributesResponse(_) => "WriteAttributesResponse",
            ZclCommand::ReportAttributes(_) => "ReportAttributes",
            ZclCommand::DefaultResponse(_) => "DefaultResponse",
            ZclCommand::Local(command) => command.name(),
            ZclCommand::Unrecognized { .. } => "Unrecognized",
        }
    }

    pub(crate) fn encode_payload(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            ZclCommand::ReadAttributes(c) => c.encode(buf),
            ZclCommand::ReadAttributesResponse(c) => c.encode(buf),
            ZclCommand::WriteAttributes(c) => c.encode(buf),
            ZclCommand::WriteAttributesResponse(c) => c.encode(buf),
            ZclCommand::ReportAttributes(c) => c.encode(buf),
            ZclCommand::DefaultResponse(c) => c.encode(buf),
            ZclCommand::Local(c) => {
                c.encode_payload(buf);
                Ok(())
            }
            ZclCommand::Unrecognized { payload, .. } => {
                buf.extend_from_slice(payload);
                Ok(())
            }
        }
    }
}

/// A complete frame: header plus decoded command
#[derive(Debug, Clone, PartialEq)]
pub struct ZclFrame {
    pub header: FrameHeader,
    pub command: ZclCommand,
}
