//! Textual fixups that turn a generic YAML encoding of a lockfile into the
//! syntax yarn's own lockfile reader accepts.

pub const YARN_CLASSIC_HEADER: &str = "# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE \
                                       DIRECTLY.\n# yarn lockfile v1\n\n";

pub const YARN_BERRY_HEADER: &str = "# This file is generated by running \"yarn install\" inside \
                                     your project.\n# Manual changes might be lost - proceed with \
                                     caution!\n\n__metadata:\n  version: 5\n  cacheKey: 8\n\n";

/// Metadata written by `YARN_BERRY_HEADER`
pub const YARN_BERRY_METADATA_VERSION: &str = "5";
pub const YARN_BERRY_CACHE_KEY: &str = "8";

/// Prepends `header` to `generic` and rewrites it line by line: every top
/// level line is preceded by a blank line and single quotes become double
/// quotes.
pub fn yarn_fixup(header: &str, generic: &str) -> String {
    let mut fixed = String::with_capacity(header.len() + generic.len() * 2);
    fixed.push_str(header);
    for line in generic.lines() {
        let line = line.replace('\'', "\"");
        if line.starts_with(' ') {
            fixed.push_str(&line);
            fixed.push('\n');
        } else {
            fixed.push('\n');
            fixed.push_str(&line);
            fixed.push('\n');
        }
    }
    fixed
}
