//! Uplink discovery against the local language server.
//!
//! - [`platform`]: subprocess-backed process and socket enumeration
//! - [`beacon`]: CSRF token and PID extraction
//! - [`frequency`]: listening port parsing
//! - [`transport`]: loopback HTTPS probe and status fetch
//! - [`discovery`]: the three stages composed

pub mod beacon;
pub mod discovery;
pub mod frequency;
pub mod platform;
pub mod transport;

pub use beacon::{locate, locate_beacon};
pub use discovery::{discover, find_responsive_port, UplinkTarget};
pub use frequency::{scan_frequencies, MAX_CANDIDATE_PORTS};
pub use platform::{PlatformKind, ProcessPlatform, SystemPlatform};
pub use transport::{HttpsTransport, UplinkTransport};
