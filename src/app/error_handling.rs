//! Error handling utilities

use tracing::error;

/// Report a fatal error and exit.
///
/// A [`StreamTapError`](crate::error::StreamTapError) anywhere in the chain
/// supplies the user message and exit code. With `verbose >= 1` the full
/// cause chain is printed as well.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    use crate::error::StreamTapError;

    error!("Fatal error: {:#}", error);

    let exit_code = match error
        .chain()
        .find_map(|cause| cause.downcast_ref::<StreamTapError>())
    {
        Some(err) => {
            eprintln!("{}", err.user_message());
            err.exit_code()
        }
        None => {
            eprintln!("Error: {error}");
            1
        }
    };

    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code)
}
