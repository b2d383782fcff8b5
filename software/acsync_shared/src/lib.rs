#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod channel;
pub mod mode;
pub mod setpoint;
pub mod telemetry;

pub use channel::Channel;
pub use mode::Mode;
pub use setpoint::{PhaseCode, SetpointMessage, Status};
pub use telemetry::{Record, NB_CURVES, RECORD_SIZE};

pub use byte_struct::{ByteStruct, ByteStructLen};

/// Byte-coded enumeration for data decoded off the wire.
///
/// Codes with no named variant decode to `Unknown(code)` and encode back
/// to the same code, so a malformed byte is never a panic.
#[macro_export]
macro_rules! wire_enum {
    (
        $( #[$meta:meta] )*
        pub enum $name:ident($repr:ty) {
            $( $( #[$vmeta:meta] )* $variant:ident = $code:literal ),+ $(,)?
        }
    ) => {
        $( #[$meta] )*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $( #[$vmeta] )* $variant, )+
            /// Code with no named variant
            Unknown($repr),
        }

        impl $name {
            /// Code carried on the wire
            pub const fn code(self) -> $repr {
                match self {
                    $( $name::$variant => $code, )+
                    $name::Unknown(raw) => raw,
                }
            }
        }

        impl ::core::convert::From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                match raw {
                    $( $code => $name::$variant, )+
                    raw => $name::Unknown(raw),
                }
            }
        }

        impl ::core::convert::From<$name> for $repr {
            fn from(value: $name) -> Self {
                value.code()
            }
        }
    };
}
