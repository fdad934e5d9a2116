//! Utility macros for common patterns across the device core
//!
//! State and trigger vocabularies are closed sets of names that must print and
//! parse exactly as the control protocol spells them. These macros remove the
//! repetitive `Display`/`FromStr` plumbing for such enums.

/// Declare a closed, named vocabulary enum.
///
/// Generates the enum with `Debug, Clone, Copy, PartialEq, Eq, Hash` plus serde
/// derives, an `ALL` constant listing every variant in declaration order,
/// `as_str`, `Display` and `FromStr` using the given wire names.
///
/// # Examples
///
/// ```
/// use device_core::named_enum;
///
/// named_enum! {
///     /// Lamp state
///     pub enum Lamp {
///         Off => "OFF",
///         On => "ON",
///     }
/// }
///
/// assert_eq!(Lamp::On.to_string(), "ON");
/// assert_eq!("OFF".parse::<Lamp>().unwrap(), Lamp::Off);
/// assert_eq!(Lamp::ALL.len(), 2);
/// ```
#[macro_export]
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of this variant
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(format!(concat!("Invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}
