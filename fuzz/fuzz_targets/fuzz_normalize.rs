#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pakvfs::{CaseMode, PathNormalizer, VirtualPaths};

#[derive(Debug, Arbitrary)]
struct Input {
    path: String,
    project: String,
    mount: Option<(String, String)>,
    insensitive: bool,
}

fuzz_target!(|input: Input| {
    let mut mounts = VirtualPaths::new();
    if let Some((name, target)) = &input.mount {
        mounts.insert(name.clone(), target.clone());
    }

    let normalizer = PathNormalizer::new(
        &input.project,
        &mounts,
        CaseMode::from_insensitive(input.insensitive),
    );
    let once = normalizer.normalize(&input.path);
    let _ = normalizer.normalize(&once);
});
