use std::str::FromStr;

use thiserror::Error;

use crate::ir::Register;

/// Target descriptor threaded through the whole pipeline as a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Windows x64 calling convention.
    Win,
    /// System V, with Mach-O symbol decoration.
    Mac,
}

impl Platform {
    /// Integer argument registers in passing order.
    pub fn argument_registers(self) -> &'static [Register] {
        match self {
            Platform::Win => &[Register::Cx, Register::Dx, Register::R8, Register::R9],
            Platform::Mac => &[
                Register::Di,
                Register::Si,
                Register::Dx,
                Register::Cx,
                Register::R8,
                Register::R9,
            ],
        }
    }

    /// Stack bytes a caller must reserve above the return address.
    pub fn shadow_space(self) -> i64 {
        match self {
            Platform::Win => 32,
            Platform::Mac => 0,
        }
    }

    /// Mach-O symbols carry a leading underscore.
    pub fn symbol(self, name: &str) -> String {
        match self {
            Platform::Win => name.to_string(),
            Platform::Mac => format!("_{}", name),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Win => write!(f, "x86_64-intel-win"),
            Platform::Mac => write!(f, "x86_64-intel-mac"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown architecture '{0}'")]
pub struct UnknownArchitecture(pub String);

impl FromStr for Platform {
    type Err = UnknownArchitecture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64-intel-win" => Ok(Platform::Win),
            "x86_64-intel-mac" => Ok(Platform::Mac),
            other => Err(UnknownArchitecture(other.to_string())),
        }
    }
}
