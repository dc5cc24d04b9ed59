#![no_main]

use libfuzzer_sys::fuzz_target;

use gwyfile::{check_object, fread, CheckFlags};

fuzz_target!(|data: &[u8]| {
    // 4 MiB budget keeps a crash reproducer small while still exercising
    // every confinement path (truncation, declared-size-exceeds-budget).
    let object = match fread(&mut &data[..], 4 * 1024 * 1024) {
        Ok(object) => object,
        Err(_) => return,
    };

    // A successfully decoded tree must never panic the checker, whatever
    // findings it reports.
    let _ = check_object(&object, CheckFlags::all());

    let mut buf = Vec::new();
    gwyfile::fwrite(&object, &mut buf).expect("re-encoding a decoded object must not fail");
});
