//! Broken plugin: exports `func` but no `plugin_name`

#[no_mangle]
pub extern "C" fn func() {
    println!("[missing_name] This should never run.");
}
