//! Build script: RP2350A memory layout and linker scripts for the firmware

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

/// (name, origin, length in KiB)
const REGIONS: &[(&str, u32, u32)] = &[
    ("FLASH", 0x1000_0000, 4096),
    ("RAM", 0x2000_0000, 512),
    ("SRAM8", 0x2008_0000, 4),
    ("SRAM9", 0x2008_1000, 4),
];

/// Image definition blocks and binary-info entries the RP2350 boot ROM expects
const BOOT_SECTIONS: &str = r#"
_stack_start = ORIGIN(RAM) + LENGTH(RAM);

SECTIONS {
    .start_block : ALIGN(4)
    {
        __start_block_addr = .;
        KEEP(*(.start_block));
        KEEP(*(.boot_info));
    } > FLASH
} INSERT AFTER .vector_table;

_stext = ADDR(.start_block) + SIZEOF(.start_block);

SECTIONS {
    .bi_entries : ALIGN(4)
    {
        __bi_entries_start = .;
        KEEP(*(.bi_entries));
        . = ALIGN(4);
        __bi_entries_end = .;
    } > FLASH
} INSERT AFTER .text;

SECTIONS {
    .end_block : ALIGN(4)
    {
        __end_block_addr = .;
        KEEP(*(.end_block));
    } > FLASH
} INSERT AFTER .uninit;

PROVIDE(start_to_end = __end_block_addr - __start_block_addr);
PROVIDE(end_to_start = __start_block_addr - __end_block_addr);
"#;

fn memory_x() -> String {
    let mut script = String::from("/* RP2350A, 4 MiB flash */\nMEMORY {\n");
    for (name, origin, kib) in REGIONS {
        let _ = writeln!(script, "    {name:<5} : ORIGIN = {origin:#010x}, LENGTH = {kib}K");
    }
    script.push('}');
    script.push('\n');
    script.push_str(BOOT_SECTIONS);
    script
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds (tests) link normally
    if env::var_os("CARGO_FEATURE_RP2350").is_none() {
        return;
    }

    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::write(out.join("memory.x"), memory_x()).unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    for arg in ["--nmagic", "-Tlink.x", "-Tdefmt.x"] {
        println!("cargo:rustc-link-arg-bins={arg}");
    }
}
