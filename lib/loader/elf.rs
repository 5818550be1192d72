//! ELF object files.

use crate::error::{Error, Result};
use crate::loader::{MemoryPermissions, ObjectData, ObjectFile, Symbol, SymbolTable};
use crate::types::{Arch, OpSys};
use goblin::elf::header::{
    ET_DYN, EM_386, EM_AARCH64, EM_ARM, EM_MIPS, EM_PPC, EM_PPC64, EM_RISCV, EM_SPARC,
    EM_SPARC32PLUS, EM_SPARCV9, EM_X86_64,
};
use goblin::elf::program_header::{PF_R, PF_W, PF_X, PT_LOAD, PT_TLS};
use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STB_WEAK};
use log::{info, warn};
use std::any::Any;
use std::fs::File;
use std::io::Read;
use std::path::Path;

// Constants goblin does not export. Values from the System V ABI.
const EI_OSABI: usize = 7;
const ELFOSABI_SYSV: u8 = 0;
const ELFOSABI_LINUX: u8 = 3;
const ELFOSABI_SOLARIS: u8 = 6;
const ELFOSABI_FREEBSD: u8 = 9;
const ELFOSABI_TRU64: u8 = 10;
const EM_ALPHA: u16 = 0x9026;
const EF_ARM_EABI_MASK: u32 = 0xff00_0000;

/// Mapping granularity for relocatable images.
const PAGE_SIZE: u64 = 0x1000;

/// An image requesting a zero-filled tail larger than this is treated as
/// malformed rather than honored.
const MAX_ZERO_FILL: u64 = 1 << 30;

/// An object file parsed from an ELF image.
#[derive(Debug)]
pub struct Elf {
    object: ObjectData,
    relocatable: bool,
    bias: u64,
    tls: bool,
    interpreter_path: Option<String>,
    interpreter: Option<Box<Elf>>,
}

impl Elf {
    /// Parse an ELF image from the given bytes.
    ///
    /// This is a hard parse: the caller (normally the format classifier)
    /// has already matched the ELF magic, so any inconsistency past this
    /// point is an error, never a silent decline.
    pub fn new<S: Into<String>>(identifier: S, bytes: Vec<u8>) -> Result<Elf> {
        let identifier = identifier.into();

        let arch;
        let op_sys;
        let entry;
        let relocatable;
        let tls;
        let interpreter_path;
        let mut segments = Vec::new();
        {
            let elf = goblin::elf::Elf::parse(&bytes)?;

            arch = detect_arch(&elf, &identifier);
            op_sys = detect_op_sys(&elf, arch, &identifier);
            entry = elf.header.e_entry;
            relocatable = elf.header.e_type == ET_DYN;
            tls = elf.program_headers.iter().any(|ph| ph.p_type == PT_TLS);
            interpreter_path = elf.interpreter.map(|interp| interp.to_string());

            for (i, ph) in elf.program_headers.iter().enumerate() {
                if ph.p_type != PT_LOAD {
                    continue;
                }
                if ph.p_memsz < ph.p_filesz {
                    return Err(Error::Malformed(format!(
                        "program header {} of {} has p_memsz {:#x} < p_filesz {:#x}",
                        i, identifier, ph.p_memsz, ph.p_filesz
                    )));
                }
                if ph.p_memsz - ph.p_filesz > MAX_ZERO_FILL {
                    return Err(Error::Malformed(format!(
                        "program header {} of {} requests an implausible {:#x} byte zero fill",
                        i,
                        identifier,
                        ph.p_memsz - ph.p_filesz
                    )));
                }

                let mut permissions = MemoryPermissions::NONE;
                if ph.p_flags & PF_R != 0 {
                    permissions |= MemoryPermissions::READ;
                }
                if ph.p_flags & PF_W != 0 {
                    permissions |= MemoryPermissions::WRITE;
                }
                if ph.p_flags & PF_X != 0 {
                    permissions |= MemoryPermissions::EXECUTE;
                }

                segments.push((
                    format!("load{}", segments.len()),
                    ph.p_vaddr,
                    ph.p_offset as usize,
                    ph.p_filesz as usize,
                    ph.p_memsz as usize,
                    permissions,
                ));
            }
        }

        let mut object = ObjectData::new(identifier, bytes, arch, op_sys);
        object.set_entry(entry);
        for (name, base, offset, file_size, size, permissions) in segments {
            object.add_segment(name, base, offset, file_size, size, permissions)?;
        }

        Ok(Elf {
            object,
            relocatable,
            bias: 0,
            tls,
            interpreter_path,
            interpreter: None,
        })
    }

    /// Load an ELF image from a file.
    ///
    /// If the image requests an interpreter, its path is resolved as given,
    /// or failing that next to the binary itself, and the interpreter is
    /// parsed and attached. An interpreter that cannot be found or parsed
    /// degrades to `interpreter() == None` with a warning; whether that is
    /// fatal is the process-construction collaborator's decision.
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Elf> {
        let filename: &Path = filename.as_ref();
        let mut file = File::open(filename)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let mut elf = Elf::new(filename.to_string_lossy(), bytes)?;

        if let Some(interp) = elf.interpreter_path.clone() {
            let mut candidate = Path::new(&interp).to_path_buf();
            if !candidate.exists() {
                // Is the interpreter in the same directory as the binary?
                if let (Some(parent), Some(file_name)) =
                    (filename.parent(), Path::new(&interp).file_name())
                {
                    candidate = parent.join(file_name);
                }
            }
            if candidate.exists() {
                info!(
                    "loading interpreter {} for {}",
                    candidate.to_string_lossy(),
                    elf.object.identifier()
                );
                match Elf::from_file(&candidate) {
                    Ok(interpreter) => elf.interpreter = Some(Box::new(interpreter)),
                    Err(e) => warn!(
                        "failed to load interpreter {}: {}",
                        candidate.to_string_lossy(),
                        e
                    ),
                }
            } else {
                warn!(
                    "interpreter {} for {} not found",
                    interp,
                    elf.object.identifier()
                );
            }
        }

        Ok(elf)
    }

    /// The interpreter path this image requests through `PT_INTERP`, if any.
    pub fn interpreter_path(&self) -> Option<&str> {
        self.interpreter_path.as_deref()
    }

    /// Attach a parsed interpreter to this image.
    ///
    /// [`Elf::from_file`] does this automatically; embedders working from
    /// in-memory buffers resolve the [`Elf::interpreter_path`] themselves
    /// and attach the result here.
    pub fn set_interpreter(&mut self, interpreter: Elf) {
        self.interpreter = Some(Box::new(interpreter));
    }

    /// Every named symbol in the image, biased, sorted, and deduplicated.
    pub fn symbols(&self) -> Vec<Symbol> {
        let elf = self.elf();
        let mut symbols = Vec::new();
        for (syms, strtab) in [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)] {
            for sym in syms.iter() {
                if sym.st_value == 0 {
                    continue;
                }
                if let Some(name) = strtab.get_at(sym.st_name) {
                    if !name.is_empty() {
                        symbols.push(Symbol::new(name, sym.st_value.wrapping_add(self.bias)));
                    }
                }
            }
        }
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Return the goblin elf for this image.
    fn elf(&self) -> goblin::elf::Elf {
        goblin::elf::Elf::parse(self.object.data()).unwrap()
    }

    /// Insert symbols into `table`, keeping only those with the given
    /// binding when one is required.
    fn insert_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
        binding: Option<u8>,
    ) -> Result<()> {
        let elf = self.elf();
        for (syms, strtab) in [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)] {
            for sym in syms.iter() {
                if sym.st_value == 0 {
                    continue;
                }
                if let Some(required) = binding {
                    if sym.st_bind() != required {
                        continue;
                    }
                }
                let name = match strtab.get_at(sym.st_name) {
                    Some(name) if !name.is_empty() => name,
                    _ => continue,
                };
                let address = sym
                    .st_value
                    .wrapping_add(self.bias)
                    .wrapping_add(base)
                    .wrapping_add(offset)
                    & mask;
                table.insert(name, address);
            }
        }
        Ok(())
    }
}

impl ObjectFile for Elf {
    fn object(&self) -> &ObjectData {
        &self.object
    }

    fn object_mut(&mut self) -> &mut ObjectData {
        &mut self.object
    }

    fn load_all_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()> {
        self.insert_symbols(table, base, offset, mask, None)
    }

    fn load_global_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()> {
        self.insert_symbols(table, base, offset, mask, Some(STB_GLOBAL))
    }

    fn load_local_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()> {
        self.insert_symbols(table, base, offset, mask, Some(STB_LOCAL))
    }

    fn load_weak_symbols(
        &self,
        table: &mut dyn SymbolTable,
        base: u64,
        offset: u64,
        mask: u64,
    ) -> Result<()> {
        self.insert_symbols(table, base, offset, mask, Some(STB_WEAK))
    }

    fn interpreter(&self) -> Option<&dyn ObjectFile> {
        self.interpreter
            .as_deref()
            .map(|interpreter| interpreter as &dyn ObjectFile)
    }

    fn relocatable(&self) -> bool {
        self.relocatable
    }

    fn map_size(&self) -> u64 {
        if !self.relocatable {
            panic!("map_size() is only valid for relocatable images");
        }
        let span = self
            .object
            .max_segment_addr()
            .saturating_sub(self.object.min_segment_addr());
        span.saturating_add(PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
    }

    fn update_bias(&mut self, addr: u64) {
        if !self.relocatable {
            panic!("update_bias() is only valid for relocatable images");
        }
        // Adds to the current bias. A second call shifts the image further.
        self.bias = self.bias.wrapping_add(addr);
        self.object.rebase(addr);
    }

    fn bias(&self) -> u64 {
        self.bias
    }

    fn has_tls(&self) -> bool {
        self.tls
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn detect_arch(elf: &goblin::elf::Elf, identifier: &str) -> Arch {
    match elf.header.e_machine {
        EM_X86_64 => Arch::X86_64,
        EM_386 => Arch::I386,
        EM_AARCH64 => Arch::Arm64,
        // A 32-bit ARM entry point with bit 0 set starts in Thumb state.
        EM_ARM => {
            if elf.header.e_entry & 1 == 1 {
                Arch::Thumb
            } else {
                Arch::Arm
            }
        }
        EM_MIPS => Arch::Mips,
        EM_PPC | EM_PPC64 => Arch::Power,
        EM_SPARCV9 => Arch::Sparc64,
        EM_SPARC | EM_SPARC32PLUS => Arch::Sparc32,
        EM_RISCV => {
            if elf.is_64 {
                Arch::Riscv64
            } else {
                Arch::Riscv32
            }
        }
        EM_ALPHA => Arch::Alpha,
        machine => {
            warn!("unknown e_machine {:#x} in {}", machine, identifier);
            Arch::Unknown
        }
    }
}

fn detect_op_sys(elf: &goblin::elf::Elf, arch: Arch, identifier: &str) -> OpSys {
    match elf.header.e_ident[EI_OSABI] {
        ELFOSABI_LINUX => OpSys::Linux,
        ELFOSABI_SOLARIS => OpSys::Solaris,
        ELFOSABI_FREEBSD => OpSys::FreeBSD,
        ELFOSABI_TRU64 => OpSys::Tru64,
        // A SYSV ABI byte says nothing; fall back to the architecture's
        // conventional host.
        ELFOSABI_SYSV => match arch {
            Arch::Sparc64 | Arch::Sparc32 => OpSys::Solaris,
            Arch::Alpha => OpSys::Tru64,
            Arch::Arm | Arch::Thumb if elf.header.e_flags & EF_ARM_EABI_MASK == 0 => {
                OpSys::LinuxArmOABI
            }
            _ => OpSys::Linux,
        },
        abi => {
            warn!("unknown EI_OSABI {:#x} in {}", abi, identifier);
            OpSys::Unknown
        }
    }
}
