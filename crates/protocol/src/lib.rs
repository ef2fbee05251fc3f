//! Wire types shared by the devtools gateway.
//!
//! - [`TargetDescriptor`] - one entry of a backend's `/json` target listing, before and
//!   after namespace rewriting
//! - [`DeviceRecord`] - one entry of the device enumeration listing
//! - [`VersionInfo`] - the `/json/version` payload served by the gateway

pub mod device;
pub mod target;
pub mod version;

pub use device::DeviceRecord;
pub use target::{DEFAULT_TARGET_KIND, TargetDescriptor};
pub use version::VersionInfo;
