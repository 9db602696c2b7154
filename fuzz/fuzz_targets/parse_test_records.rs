#![no_main]

use libfuzzer_sys::fuzz_target;
use rego_report_render::{render_markdown, RenderOptions};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(records) = rego_report_domain::parse_test_records(text) {
            let results = rego_report_domain::process_test_results(&records);
            let total: usize = results.iter().map(|r| r.total).sum();
            assert_eq!(total, records.len());
            let _ = render_markdown(&results, &[], &RenderOptions::default());
        }
    }
});
