#![no_main]
use libfuzzer_sys::fuzz_target;
use pakvfs::PakArchive;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    let mut file = match tempfile::NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if file.write_all(data).is_err() {
        return;
    }

    // Entries outside the archive are rejected by open; reads must not panic
    if let Ok(pak) = PakArchive::open(file.path()) {
        for entry in pak.records().iter().take(64) {
            let _ = pak.read_entry(entry);
        }
    }
});
