#![no_main]

use libfuzzer_sys::fuzz_target;

const STACK: &str = "M1 34 0 0.0 0.5 0.2 0.4 0.8 1.0\n";

fuzz_target!(|data: &[u8]| {
    // Any byte string either reads as a library or fails with an error
    let Ok(library) = gds2gltf::layout::gds::read_library(data) else {
        return;
    };

    // Whatever was read must convert or fail cleanly
    if let Ok(stack) = STACK.parse::<gds2gltf::LayerStack>() {
        let _ = gds2gltf::Converter::new(&stack, gds2gltf::ConvertOptions::new()).convert(&library);
    }
});
