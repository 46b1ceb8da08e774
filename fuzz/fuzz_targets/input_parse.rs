#![no_main]

//! Fuzz target for input and plan document parsing.
//!
//! Arbitrary bytes must either fail to parse or produce a document whose
//! balances compute without panicking.

use kitty_domain::Balances;
use kitty_types::input::KittyInput;
use kitty_types::plan::KittyPlan;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(input) = serde_json::from_str::<KittyInput>(s) {
        let _ = serde_json::to_string(&input);
        // Overflow, unknown references and duplicates are errors, never panics.
        let _ = Balances::compute(&input);
    }

    if let Ok(plan) = serde_json::from_str::<KittyPlan>(s) {
        let _ = serde_json::to_string_pretty(&plan);
    }
});
