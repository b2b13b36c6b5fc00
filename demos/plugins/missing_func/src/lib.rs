//! Broken plugin: exports a name but no `func`

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static plugin_name: [u8; 8] = *b"NoFunc!\0";
