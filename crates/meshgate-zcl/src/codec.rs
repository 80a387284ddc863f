//! Frame codec
//!
//! Turns commands into frame bytes and back. Outbound frames take their
//! transaction sequence from a shared wrapping counter.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::cluster::{Direction, FrameType, GlobalCommandId};
use crate::commands::global::{
    DefaultResponse, ReadAttributes, ReadAttributesResponse, ReportAttributes, WriteAttributes,
    WriteAttributesResponse,
};
use crate::commands::{LocalCommand, ZclCommand, ZclFrame};
use crate::error::Result;
use crate::frame::{FrameHeader, TransactionSequence};
use crate::registry::CommandRegistry;

/// Encoder/decoder for cluster library frames
#[derive(Debug, Default)]
pub struct ZclCodec {
    registry: CommandRegistry,
    sequence: TransactionSequence,
}

impl ZclCodec {
    /// Codec over the built-in command registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The command registry
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Empty typed command for a `(cluster, direction, id)` tuple
    pub fn local_command(&self, cluster_id: u16, direction: Direction, command_id: u8) -> Option<LocalCommand> {
        self.registry.instantiate(cluster_id, direction, command_id)
    }

    /// Wrap a command in a frame with the next transaction sequence
    ///
    /// Global commands are sent client-to-server; cluster-specific commands
    /// carry their registered direction.
    pub fn frame(&self, command: ZclCommand) -> ZclFrame {
        let direction = match &command {
            ZclCommand::Local(local) => local.key().1,
            _ => Direction::ClientToServer,
        };
        ZclFrame {
            header: FrameHeader {
                frame_type: command.frame_type(),
                manufacturer_code: None,
                direction,
                disable_default_response: false,
                transaction_sequence: self.sequence.next(),
                command_identifier: command.command_identifier(),
            },
            command,
        }
    }

    /// Serialize a frame
    pub fn encode(&self, frame: &ZclFrame) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(16);
        frame.header.encode(&mut buf);
        frame.command.encode_payload(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse a frame received on `cluster_id`
    ///
    /// Commands outside the registry decode to [`ZclCommand::Unrecognized`]
    /// rather than failing; only malformed bytes are errors.
    pub fn decode(&self, cluster_id: u16, data: &[u8]) -> Result<ZclFrame> {
        let mut buf = Bytes::copy_from_slice(data);
        let header = FrameHeader::decode(&mut buf)?;

        let command = match header.frame_type {
            FrameType::Global => Self::decode_global(&header, &mut buf)?,
            FrameType::ClusterSpecific if header.manufacturer_code.is_none() => {
                match self.registry.decode(
                    cluster_id,
                    header.direction,
                    header.command_identifier,
                    &mut buf,
                ) {
                    Some(local) => ZclCommand::Local(local?),
                    None => Self::unrecognized(&header, buf),
                }
            }
            FrameType::ClusterSpecific => Self::unrecognized(&header, buf),
        };

        trace!(
            cluster = cluster_id,
            command = command.name(),
            seq = header.transaction_sequence,
            "Decoded frame"
        );

        Ok(ZclFrame { header, command })
    }

    fn decode_global(header: &FrameHeader, buf: &mut Bytes) -> Result<ZclCommand> {
        let command = match GlobalCommandId::try_from(header.command_identifier) {
            Ok(GlobalCommandId::ReadAttributes) => ZclCommand::ReadAttributes(ReadAttributes::decode(buf)?),
            Ok(GlobalCommandId::ReadAttributesResponse) => {
                ZclCommand::ReadAttributesResponse(ReadAttributesResponse::decode(buf)?)
            }
            Ok(GlobalCommandId::WriteAttributes) => ZclCommand::WriteAttributes(WriteAttributes::decode(buf)?),
            Ok(GlobalCommandId::WriteAttributesResponse) => {
                ZclCommand::WriteAttributesResponse(WriteAttributesResponse::decode(buf)?)
            }
            Ok(GlobalCommandId::ReportAttributes) => ZclCommand::ReportAttributes(ReportAttributes::decode(buf)?),
            Ok(GlobalCommandId::DefaultResponse) => ZclCommand::DefaultResponse(DefaultResponse::decode(buf)?),
            _ => Self::unrecognized(header, buf.clone()),
        };
        Ok(command)
    }

    fn unrecognized(header: &FrameHeader, payload: Bytes) -> ZclCommand {
        ZclCommand::Unrecognized {
            frame_type: header.frame_type,
            command_identifier: header.command_identifier,
            payload,
        }
    }
}
