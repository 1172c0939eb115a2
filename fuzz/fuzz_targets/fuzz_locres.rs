#![no_main]
use libfuzzer_sys::fuzz_target;
use pakvfs::core::locres::Locres;

fuzz_target!(|data: &[u8]| {
    if let Ok(locres) = Locres::from_bytes(data) {
        for (namespace, keys) in &locres.namespaces {
            for (key, entry) in keys {
                assert_eq!(locres.get(namespace, key), Some(entry.localized.as_str()));
            }
        }
    }
});
