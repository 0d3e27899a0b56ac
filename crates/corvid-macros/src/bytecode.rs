// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instruction-set macros.

/// Declare an opcode enum.
///
/// Every variant carries its byte value, a mnemonic used by traces and
/// listings, and the encoded instruction length including the opcode byte.
/// The macro generates `TryFrom<repr>`, `mnemonic()`, `encoded_len()`,
/// `from_mnemonic()` and `all()`.
///
/// # Example
///
/// ```
/// use corvid_macros::opcodes;
///
/// opcodes! {
///     pub enum Op: u8 {
///         Ret = 0x01 => ("ret", 1),
///         Jmp = 0x09 => ("jmp", 3),
///     }
/// }
///
/// assert_eq!(Op::from_mnemonic("jmp"), Some(Op::Jmp));
/// assert_eq!(Op::try_from(0x7f), Err(0x7f));
/// assert_eq!(Op::all().len(), 2);
/// ```
#[macro_export]
macro_rules! opcodes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal => ($mnemonic:literal, $len:literal)
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr($repr)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )+
        }

        impl ::std::convert::TryFrom<$repr> for $name {
            type Error = $repr;

            fn try_from(value: $repr) -> ::std::result::Result<Self, $repr> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(other),
                }
            }
        }

        impl $name {
            /// Mnemonic used in traces and listings.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$variant => $mnemonic,)+
                }
            }

            /// Encoded length in bytes, opcode byte included.
            pub const fn encoded_len(self) -> usize {
                match self {
                    $(Self::$variant => $len,)+
                }
            }

            /// Looks an opcode up by mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> ::std::option::Option<Self> {
                match mnemonic {
                    $($mnemonic => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Every opcode, in declaration order.
            pub const fn all() -> &'static [Self] {
                &[$(Self::$variant),+]
            }
        }
    };
}
