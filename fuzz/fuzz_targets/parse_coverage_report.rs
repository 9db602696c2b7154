#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(report) = rego_report_domain::parse_coverage_report(text) {
            let rows = rego_report_domain::process_coverage_report(&report);
            assert_eq!(rows.len(), report.files.len());
        }
    }
});
