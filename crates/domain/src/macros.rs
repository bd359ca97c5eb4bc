//! Macro for implementing Display and FromStr for domain enums
//!
//! Request states, edit modes and error kinds travel through config files,
//! environment variables and log fields as lowercase snake_case words. This
//! macro keeps the textual form and the parser in one place.
//!
//! # Example
//!
//! ```rust
//! use calbridge_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum SessionPhase {
//!     Opening,
//!     Open,
//!     Closed,
//! }
//!
//! impl_domain_status_conversions!(SessionPhase {
//!     Opening => "opening",
//!     Open => "open",
//!     Closed => "closed",
//! });
//!
//! assert_eq!(SessionPhase::Open.to_string(), "open");
//! assert_eq!("CLOSED".parse::<SessionPhase>().unwrap(), SessionPhase::Closed);
//! ```

/// Implements Display and FromStr traits for domain enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their string
///   representations
///
/// Parsing is case-insensitive and also accepts `-` in place of `_`, so
/// `this-and-following` and `THIS_AND_FOLLOWING` both parse.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_lowercase().replace('-', "_").as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
