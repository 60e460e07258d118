//! Target architectures

use kiwix_core::error::{Error, ErrorCode, Result};
use std::fmt;

/// A target architecture of the native build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm,
    Mips,
    X86,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::Arm, Arch::Mips, Arch::X86];

    /// NDK toolchain name, also the platform sub-directory
    pub fn toolchain_name(self) -> &'static str {
        match self {
            Arch::Arm => "arm-linux-androideabi",
            Arch::Mips => "mipsel-linux-android",
            Arch::X86 => "x86",
        }
    }

    /// GNU target triple used for `--host` and tool prefixes
    pub fn full_name(self) -> &'static str {
        match self {
            Arch::Arm => "arm-linux-androideabi",
            Arch::Mips => "mipsel-linux-android",
            Arch::X86 => "i686-linux-android",
        }
    }

    /// Android ABI name, used by `--on` and under `libs/`
    pub fn short_name(self) -> &'static str {
        match self {
            Arch::Arm => "armeabi",
            Arch::Mips => "mips",
            Arch::X86 => "x86",
        }
    }

    pub fn from_short(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.short_name() == name)
            .ok_or_else(|| {
                Error::new(ErrorCode::UnknownArch, format!("Unknown architecture: {}", name))
                    .with_suggestion("ARCH is one of 'armeabi', 'mips', 'x86'")
            })
    }

    /// Parse a list of short names, keeping the given order and dropping repeats
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        let mut archs = Vec::new();
        for name in names {
            let arch = Self::from_short(name.as_ref())?;
            if !archs.contains(&arch) {
                archs.push(arch);
            }
        }
        Ok(archs)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(Arch::X86.toolchain_name(), "x86");
        assert_eq!(Arch::X86.full_name(), "i686-linux-android");
        assert_eq!(Arch::Mips.short_name(), "mips");
    }

    #[test]
    fn test_from_short() {
        assert_eq!(Arch::from_short("armeabi").unwrap(), Arch::Arm);
        let err = Arch::from_short("arm64-v8a").unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownArch);
    }

    #[test]
    fn test_parse_list_dedups() {
        let archs = Arch::parse_list(&["x86", "armeabi", "x86"]).unwrap();
        assert_eq!(archs, vec![Arch::X86, Arch::Arm]);
    }
}
