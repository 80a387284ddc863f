/// Declare a fixed-layout cluster command
///
/// Each field is listed with its Rust type and its wire name. The wire name
/// is the key accepted from bus parameter maps and emitted when the command
/// is published. Fields are encoded in declaration order.
///
/// ```ignore
/// cluster_command! {
///     /// Move to a brightness level
///     MoveToLevel {
///         level: u8 => "Level",
///         transition_time: u16 => "TransitionTime",
///     }
/// }
/// ```
macro_rules! cluster_command {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty => $wire:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                #[serde(rename = $wire)]
                pub $field: $ty,
            )*
        }

        impl $crate::fields::SetField for $name {
            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                name: &str,
                value: &::serde_json::Value,
            ) -> $crate::error::Result<bool> {
                match name {
                    $(
                        $wire => match <$ty as $crate::fields::CommandField>::from_json($wire, value)? {
                            Some(v) => {
                                self.$field = v;
                                Ok(true)
                            }
                            None => Ok(false),
                        },
                    )*
                    _ => Ok(false),
                }
            }
        }

        impl $crate::commands::TypedCommand for $name {
            const FIELD_NAMES: &'static [&'static str] = &[$($wire),*];

            #[allow(unused_variables)]
            fn encode_payload(&self, buf: &mut ::bytes::BytesMut) {
                $( $crate::fields::CommandField::encode(&self.$field, buf); )*
            }

            #[allow(unused_variables)]
            fn decode_payload(buf: &mut ::bytes::Bytes) -> $crate::error::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::fields::CommandField>::decode(buf)?, )*
                })
            }
        }
    };
}
