//! Common utilities for integration tests

use assert_cmd::Command;
use std::fs;
use std::path::Path;

/// `rewind` with every directory redirected under `home`
pub fn rewind_command(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rewind"));
    cmd.env("REWIND_HOME", home).env("RUST_LOG", "off");
    cmd
}

pub fn write_config(home: &Path, yaml: &str) {
    fs::create_dir_all(home).unwrap();
    fs::write(home.join("config.yaml"), yaml).unwrap();
}

pub fn plist_body(dict: plist::Dictionary) -> Vec<u8> {
    let mut buf = Vec::new();
    plist::Value::Dictionary(dict).to_writer_xml(&mut buf).unwrap();
    buf
}
