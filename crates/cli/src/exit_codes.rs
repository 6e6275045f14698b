//! CLI Exit Code Registry
//!
//! Single source of truth for `pcrecon` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                             |
//! |------|-----------------------------------------------------|
//! | 0    | Success                                             |
//! | 2    | CLI usage error (bad args, unreadable job file)     |
//! | 60   | Invalid job or engine config                        |
//! | 61   | Runtime error (source loading, engine fault, output) |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing job file.
pub const EXIT_USAGE: u8 = 2;

/// The job file parsed but failed validation, or did not parse at all.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// Source files could not be read, the engine rejected its input, or output
/// could not be written.
pub const EXIT_RECON_RUNTIME: u8 = 61;
