//! Minimal plugin satisfying the slotplug contract

/// Display name read by the host
#[no_mangle]
#[allow(non_upper_case_globals)]
pub static plugin_name: [u8; 8] = *b"PluginA\0";

/// Entry point invoked by `run <slot>`
#[no_mangle]
pub extern "C" fn func() {
    println!("[PluginA] Hello from plugin A!");
}
