//! Meshgate ZCL - Zigbee cluster library support
//!
//! This crate provides everything the gateway needs to speak the cluster
//! library without hard-coding any particular device:
//!
//! - [`catalog`] - Schema catalog loaded from a JSON cluster definition file
//! - [`frame`] - Frame header, transaction sequence and message envelope
//! - [`types`] - Attribute data types and values
//! - [`commands`] - Global and cluster-specific command structures
//! - [`registry`] - `(cluster, direction, command id)` to typed command lookup
//! - [`fields`] - Populating typed commands from untyped parameter maps
//! - [`codec`] - Frame encoding and decoding
//!
//! # Example
//!
//! ```rust
//! use meshgate_zcl::{cluster, Direction, FieldSetter, ZclCodec, ZclCommand};
//!
//! let codec = ZclCodec::new();
//! let mut command = codec
//!     .local_command(cluster::id::LEVEL_CONTROL, Direction::ClientToServer, 0x00)
//!     .unwrap();
//! let params = serde_json::json!({ "Level": 128, "TransitionTime": 10 });
//! FieldSetter::apply(&mut command, params.as_object().unwrap()).unwrap();
//!
//! let frame = codec.frame(ZclCommand::Local(command));
//! let bytes = codec.encode(&frame).unwrap();
//! assert_eq!(&bytes[2..], &[0x00, 128, 10, 0]);
//! ```

#[macro_use]
mod macros;

pub mod catalog;
pub mod cluster;
pub mod codec;
pub mod commands;
pub mod error;
pub mod fields;
pub mod frame;
pub mod registry;
pub mod types;

pub use catalog::{AttributeDescriptor, ClusterDescriptor, CommandDescriptor, SchemaCatalog};
pub use cluster::{Direction, FrameType, GATEWAY_ENDPOINT, PROFILE_HOME_AUTOMATION};
pub use codec::ZclCodec;
pub use commands::{LocalCommand, TypedCommand, ZclCommand, ZclFrame};
pub use error::{Result, ZclError};
pub use fields::{FieldSetter, SetField};
pub use frame::{ApplicationMessage, FrameHeader, TransactionSequence};
pub use registry::CommandRegistry;
pub use types::{AttributeValue, DataType};
