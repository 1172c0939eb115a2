//! Package file versions used to gate discovery behaviour

use serde::{Deserialize, Serialize};

/// UE4 object version that introduced soft object paths; plugin manifests
/// (`.upluginmanifest`) are only trusted from this version on.
pub const VER_UE4_ADDED_SOFT_OBJECT_PATH: i32 = 514;

/// Last UE4 object version
pub const VER_UE4_AUTOMATIC_VERSION: i32 = 522;

/// Object version pair of a cooked build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFileVersion {
    pub ue4: i32,
    #[serde(default)]
    pub ue5: i32,
}

impl PackageFileVersion {
    pub const fn ue4(ue4: i32) -> Self {
        PackageFileVersion { ue4, ue5: 0 }
    }

    pub const fn ue5(ue5: i32) -> Self {
        PackageFileVersion {
            ue4: VER_UE4_AUTOMATIC_VERSION,
            ue5,
        }
    }

    /// Whether plugin manifests are an authoritative source of mount points
    pub fn supports_plugin_manifests(&self) -> bool {
        self.ue4 >= VER_UE4_ADDED_SOFT_OBJECT_PATH
    }
}

impl Default for PackageFileVersion {
    fn default() -> Self {
        PackageFileVersion::ue4(VER_UE4_AUTOMATIC_VERSION)
    }
}
