//! Architecture and operating-system tags carried by parsed object files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction-set architectures an object file may declare.
///
/// The tag is fixed at parse time. `Unknown` is a valid tag, not a parse
/// failure; loaders that need a specific architecture decline such images.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Arch {
    Unknown,
    Alpha,
    Sparc64,
    Sparc32,
    Mips,
    X86_64,
    I386,
    Arm64,
    Arm,
    Thumb,
    Power,
    Riscv64,
    Riscv32,
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Arch::Unknown => "unknown",
            Arch::Alpha => "alpha",
            Arch::Sparc64 => "sparc64",
            Arch::Sparc32 => "sparc32",
            Arch::Mips => "mips",
            Arch::X86_64 => "x86_64",
            Arch::I386 => "i386",
            Arch::Arm64 => "arm64",
            Arch::Arm => "arm",
            Arch::Thumb => "thumb",
            Arch::Power => "power",
            Arch::Riscv64 => "riscv64",
            Arch::Riscv32 => "riscv32",
        };
        f.write_str(s)
    }
}

/// Operating-system ABIs an object file may declare.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum OpSys {
    Unknown,
    Tru64,
    Linux,
    Solaris,
    LinuxArmOABI,
    FreeBSD,
}

impl fmt::Display for OpSys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            OpSys::Unknown => "unknown",
            OpSys::Tru64 => "tru64",
            OpSys::Linux => "linux",
            OpSys::Solaris => "solaris",
            OpSys::LinuxArmOABI => "linux-arm-oabi",
            OpSys::FreeBSD => "freebsd",
        };
        f.write_str(s)
    }
}
