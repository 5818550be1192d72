//! End-to-end scenarios: classify an image, dispatch it over a registry,
//! and check what reached the collaborators.


use crate::error::{Error, Result};
use crate::loader::{
    create_object_file, open_object_file, Elf, Loader, LoaderMatch, LoaderRegistry, ObjectFile,
    Process, ProcessParams, SparseMemory, MAX_ADDR,
};
use crate::types::{Arch, OpSys};
use fixture::ElfBuilder;
use goblin::elf::header::{EM_AARCH64, EM_X86_64};
use goblin::elf::sym::STB_GLOBAL;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct SimProcess {
    entry: u64,
}

impl Process for SimProcess {}

/// A loader for one (arch, OS) pair, mapping the image and pulling its
/// symbols the way a real process loader would.
#[derive(Debug)]
struct SimLoader {
    name: &'static str,
    arch: Arch,
    op_sys: OpSys,
    sink: Arc<Mutex<SparseMemory>>,
    symbols: Arc<Mutex<BTreeMap<String, u64>>>,
}

impl Loader for SimLoader {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(
        &self,
        _params: &ProcessParams,
        object_file: &mut dyn ObjectFile,
    ) -> Result<LoaderMatch> {
        if object_file.arch() != self.arch || object_file.op_sys() != self.op_sys {
            return Ok(LoaderMatch::NoMatch);
        }
        let mut sink = self.sink.lock().unwrap();
        object_file.load_segments(&mut *sink)?;
        let mut symbols = self.symbols.lock().unwrap();
        object_file.load_all_symbols(&mut *symbols, 0, 0, MAX_ADDR)?;
        Ok(LoaderMatch::Matched(Box::new(SimProcess {
            entry: object_file.entry_point(),
        })))
    }
}

#[test]
fn elf_to_process_end_to_end() {
    let bytes = ElfBuilder::new(EM_X86_64)
        .osabi(3)
        .entry(0x40_0000)
        .segment(0x40_0000, vec![0x90; 0x10])
        .symbol("main", 0x40_0000, STB_GLOBAL)
        .build();
    let mut object_file = create_object_file("a.out", bytes, false).unwrap();

    let sink = Arc::new(Mutex::new(SparseMemory::new()));
    let symbols = Arc::new(Mutex::new(BTreeMap::new()));

    let mut registry = LoaderRegistry::new();
    registry.register(SimLoader {
        name: "linux-arm64",
        arch: Arch::Arm64,
        op_sys: OpSys::Linux,
        sink: sink.clone(),
        symbols: symbols.clone(),
    });
    registry.register(SimLoader {
        name: "linux-x86_64",
        arch: Arch::X86_64,
        op_sys: OpSys::Linux,
        sink: sink.clone(),
        symbols: symbols.clone(),
    });

    let params = ProcessParams::new("a.out").with_arguments(vec!["a.out".to_string()]);
    let process = registry.try_loaders(&params, object_file.as_mut()).unwrap();

    assert!(format!("{:?}", process).contains("4194304"));
    assert_eq!(sink.lock().unwrap().get(0x40_0000).unwrap(), &[0x90; 0x10][..]);
    assert_eq!(symbols.lock().unwrap()["main"], 0x40_0000);
}

#[test]
fn mismatched_image_finds_no_loader() {
    let bytes = ElfBuilder::new(EM_AARCH64)
        .osabi(3)
        .segment(0x1000, vec![0; 4])
        .build();
    let mut object_file = create_object_file("arm.out", bytes, false).unwrap();

    let sink = Arc::new(Mutex::new(SparseMemory::new()));
    let symbols = Arc::new(Mutex::new(BTreeMap::new()));
    let mut registry = LoaderRegistry::new();
    registry.register(SimLoader {
        name: "linux-x86_64",
        arch: Arch::X86_64,
        op_sys: OpSys::Linux,
        sink: sink.clone(),
        symbols: symbols.clone(),
    });

    match registry.try_loaders(&ProcessParams::new("arm.out"), object_file.as_mut()) {
        Err(Error::NoCompatibleLoader(identifier)) => assert_eq!(identifier, "arm.out"),
        other => panic!("expected NoCompatibleLoader, got {:?}", other),
    }

    // the declining dispatch touched nothing
    assert!(sink.lock().unwrap().regions().is_empty());
    assert!(symbols.lock().unwrap().is_empty());
}

#[test]
fn raw_blob_scenario() {
    let mut object_file = create_object_file("blob.bin", vec![0x10, 0x20, 0x30], true).unwrap();
    assert_eq!(object_file.segments().len(), 1);
    assert_eq!(object_file.segments()[0].base(), 0);
    assert_eq!(object_file.segments()[0].size(), 3);

    let mut sink = SparseMemory::new();
    object_file.load_segments(&mut sink).unwrap();
    assert_eq!(sink.get(0).unwrap(), &[0x10, 0x20, 0x30][..]);

    // a blob is never relocatable, so dispatch can still place it by offset
    object_file.object_mut().set_load_offset(0x8000);
    let mut sink = SparseMemory::new();
    object_file.load_segments(&mut sink).unwrap();
    assert_eq!(sink.get(0x8000).unwrap(), &[0x10, 0x20, 0x30][..]);
}

#[test]
fn open_object_file_reads_from_disk() {
    let dir = std::env::temp_dir().join("kestrel_open_test");
    std::fs::create_dir_all(&dir).unwrap();

    let blob_path = dir.join("blob.bin");
    std::fs::write(&blob_path, [0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    let blob = open_object_file(&blob_path, true).unwrap();
    assert_eq!(blob.arch(), Arch::Unknown);
    assert_eq!(blob.segments()[0].size(), 4);

    let elf_path = dir.join("a.out");
    std::fs::write(
        &elf_path,
        ElfBuilder::new(EM_X86_64)
            .entry(0x1000)
            .segment(0x1000, vec![0x90; 4])
            .build(),
    )
    .unwrap();
    let elf = open_object_file(&elf_path, false).unwrap();
    assert_eq!(elf.arch(), Arch::X86_64);
    assert_eq!(elf.entry_point(), 0x1000);

    assert!(matches!(
        open_object_file(dir.join("missing.bin"), false),
        Err(Error::Io(_))
    ));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn from_file_resolves_sibling_interpreter() {
    let dir = std::env::temp_dir().join("kestrel_interp_test");
    std::fs::create_dir_all(&dir).unwrap();

    std::fs::write(
        dir.join("ld-test.so"),
        ElfBuilder::new(EM_X86_64)
            .dynamic()
            .entry(0x5000)
            .segment(0x5000, vec![0; 4])
            .build(),
    )
    .unwrap();

    let main_path = dir.join("main.elf");
    std::fs::write(
        &main_path,
        ElfBuilder::new(EM_X86_64)
            .entry(0x40_0000)
            .segment(0x40_0000, vec![0x90; 8])
            .interp("/nonexistent/ld-test.so")
            .build(),
    )
    .unwrap();

    let elf = Elf::from_file(&main_path).unwrap();
    let interpreter = elf.interpreter().expect("sibling interpreter attaches");
    assert_eq!(interpreter.entry_point(), 0x5000);
    assert!(interpreter.relocatable());

    std::fs::remove_dir_all(&dir).ok();
}
