fn main() {
    // CoreBluetooth refuses to scan from a bare CLI binary unless an
    // Info.plist with NSBluetoothAlwaysUsageDescription is embedded in the
    // `__TEXT,__info_plist` section. The linker's `-sectcreate` does that.
    //
    // `CARGO_CFG_TARGET_OS` is the target, so cross builds for macOS work too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }

    let dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");
    let plist = format!("{dir}/Info.plist");

    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg={arg}");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
