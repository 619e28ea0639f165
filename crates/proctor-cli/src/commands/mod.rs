//! CLI subcommands.

pub mod drill;
pub mod validate;

/// Exit codes shared by all subcommands.
pub mod exit_codes {
    /// Success exit code.
    pub const SUCCESS: u8 = 0;
    /// The input was read but is invalid.
    pub const VALIDATION_ERROR: u8 = 1;
    /// The input could not be read or parsed.
    pub const INPUT_ERROR: u8 = 2;
}
