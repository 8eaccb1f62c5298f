//! Process-wide tracing setup.

/// Initialize tracing once for the process.
///
/// Later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filters, layers).
pub mod tracing;
