//! Record permission flags

use bitflags::bitflags;

bitflags! {
    /// Flags word stored in every record header.
    ///
    /// `BSS` marks a zero run without payload and is only ever set by the
    /// encoder. Bits above `BSS` are carried through unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        const READ    = 1;
        const WRITE   = 2;
        const EXECUTE = 4;
        const BSS     = 8;

        const _ = !0;
    }
}

impl Flags {
    /// Default for raw files: readable, writable and executable
    pub const RWX: Flags = Flags::READ.union(Flags::WRITE).union(Flags::EXECUTE);

    /// Caller supplied flags with the encoder-owned `BSS` bit cleared
    pub fn from_user(bits: u32) -> Self {
        Flags::from_bits_retain(bits).difference(Flags::BSS)
    }

    /// Parse ELF permission letters such as `RWE` or `R E`
    pub fn from_letters(letters: &str) -> Self {
        let mut flags = Flags::empty();
        for c in letters.chars() {
            match c {
                'R' => flags |= Flags::READ,
                'W' => flags |= Flags::WRITE,
                'E' | 'X' => flags |= Flags::EXECUTE,
                _ => {}
            }
        }
        flags
    }

    /// Translate ELF `p_flags` (`PF_X = 1`, `PF_W = 2`, `PF_R = 4`)
    pub fn from_elf(p_flags: u32) -> Self {
        let mut flags = Flags::empty();
        if p_flags & object::elf::PF_R != 0 {
            flags |= Flags::READ;
        }
        if p_flags & object::elf::PF_W != 0 {
            flags |= Flags::WRITE;
        }
        if p_flags & object::elf::PF_X != 0 {
            flags |= Flags::EXECUTE;
        }
        flags
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::RWX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_flags_drop_bss() {
        assert_eq!(Flags::from_user(0xF), Flags::RWX);
        assert_eq!(Flags::from_user(0x12).bits(), 0x12);
    }

    #[test]
    fn test_letters() {
        assert_eq!(Flags::from_letters("RWE"), Flags::RWX);
        assert_eq!(Flags::from_letters("R E"), Flags::READ | Flags::EXECUTE);
        assert_eq!(Flags::from_letters("RW"), Flags::READ | Flags::WRITE);
        assert_eq!(Flags::from_letters(""), Flags::empty());
    }

    #[test]
    fn test_elf_flags() {
        let text = object::elf::PF_R | object::elf::PF_X;
        assert_eq!(Flags::from_elf(text), Flags::READ | Flags::EXECUTE);
        assert_eq!(Flags::from_elf(object::elf::PF_W), Flags::WRITE);
    }
}
