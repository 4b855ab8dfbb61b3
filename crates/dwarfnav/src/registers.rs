//! DWARF register names for the architectures gimli knows.

use dwarfnav_core::cfi::RegisterNames;
use gimli::Register;
use object::Architecture;

/// Register names for `architecture`; unknown architectures name nothing
pub fn names_for(architecture: Architecture) -> RegisterNames
{
    match architecture {
        Architecture::X86_64 | Architecture::X86_64_X32 => gimli::X86_64::register_name,
        Architecture::I386 => gimli::X86::register_name,
        Architecture::Aarch64 => gimli::AArch64::register_name,
        Architecture::Arm => gimli::Arm::register_name,
        Architecture::Riscv32 | Architecture::Riscv64 => gimli::RiscV::register_name,
        _ => |_| None,
    }
}

/// `register` by name, or `rN`
pub fn describe(names: RegisterNames, register: Register) -> String
{
    names(register).map_or_else(|| format!("r{}", register.0), str::to_string)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_x86_64_names()
    {
        let names = names_for(Architecture::X86_64);
        assert_eq!(names(Register(6)), Some("rbp"));
        assert_eq!(names(Register(7)), Some("rsp"));
        assert_eq!(describe(names, Register(7)), "rsp");
    }

    #[test]
    fn test_i386_numbering_differs()
    {
        let names = names_for(Architecture::I386);
        assert_eq!(names(Register(4)), Some("esp"));
        assert_eq!(names(Register(5)), Some("ebp"));
    }

    #[test]
    fn test_unknown_architecture_is_numeric()
    {
        let names = names_for(Architecture::Unknown);
        assert_eq!(describe(names, Register(6)), "r6");
    }
}
