#![no_main]

use libfuzzer_sys::fuzz_target;
use rego_report_types::{RawPosition, RawRange};

fuzz_target!(|data: &[u8]| {
    let sections: Vec<RawRange> = data
        .chunks_exact(4)
        .map(|c| RawRange {
            start: RawPosition { row: u16::from_le_bytes([c[0], c[1]]) as u32 },
            end: RawPosition { row: u16::from_le_bytes([c[2], c[3]]) as u32 },
        })
        .collect();

    let out = rego_report_domain::compress_not_covered(&sections);
    if sections.is_empty() {
        assert!(out.is_empty());
    } else {
        assert_eq!(out.split(", ").count(), sections.len());
    }
});
