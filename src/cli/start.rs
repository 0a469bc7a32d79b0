use crate::cli::{
    actions::Action,
    commands::{self, logging},
    dispatch::handler,
    telemetry,
};
use anyhow::Result;

/// Start the CLI
///
/// # Errors
/// Returns an error if telemetry cannot be initialized or arguments are invalid.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);

    telemetry::init(logging::level(verbosity))?;

    let action = handler(&matches)?;

    Ok(action)
}
