//! Plugin whose name exceeds the host's 16-byte name buffer

#[no_mangle]
#[allow(non_upper_case_globals)]
pub static plugin_name: [u8; 27] = *b"AnUnreasonablyLongPluginId\0";

#[no_mangle]
pub extern "C" fn func() {
    println!("[long_name] The host only kept the first sixteen bytes of my name.");
}
