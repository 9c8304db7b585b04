#![warn(clippy::pedantic)]
// Noisy doc/signature lints
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Mixed format!("{}", x) and format!("{x}") styles
#![allow(clippy::uninlined_format_args)]
// Intentional casts in API integration code (sizes, durations, counts)
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod bus;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod config;
pub mod directory;
pub mod errors;
pub mod extract;
pub mod gateway;
pub mod providers;
pub mod router;
pub mod session;
pub mod store;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const LOGO: &str = "🤖";
