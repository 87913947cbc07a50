//! Subscriber setup driven by loaded settings.

use sockmux_core::logging::init_subscriber;
use sockmux_settings::SockmuxSettings;

/// Install the global subscriber at `settings.logging.level`.
///
/// `RUST_LOG` still wins when set. Returns the directive in effect.
pub fn init_logging(settings: &SockmuxSettings) -> String {
    init_subscriber(&settings.logging.level)
}
