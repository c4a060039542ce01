/// A berry descriptor, `name@range`, where the range may carry a protocol
/// such as `npm:` or `workspace:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    pub name: &'a str,
    pub range: &'a str,
}

impl<'a> Descriptor<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        // skip the first character so a scope's `@` isn't treated as the
        // separator
        let idx = raw.get(1..)?.find('@')? + 1;
        let (name, range) = (&raw[..idx], &raw[idx + 1..]);
        Some(Self { name, range })
    }

    pub fn is_patch(&self) -> bool {
        self.range.starts_with("patch:")
    }

    pub fn range_without_protocol(&self) -> &'a str {
        Self::strip_protocol(self.range)
    }

    /// The start of every descriptor of a patch applied to this descriptor
    pub fn patch_prefix(&self) -> String {
        format!(
            "{}@patch:{}@{}#",
            self.name,
            self.name,
            self.range.replace(':', "%3A")
        )
    }

    /// Drops the bind parameters yarn appends to some descriptors in the
    /// lockfile, e.g. `::locator=monorepo%40workspace%3A.`
    pub fn strip_params(raw: &str) -> &str {
        raw.split_once("::").map_or(raw, |(descriptor, _)| descriptor)
    }

    /// The descriptor a patch descriptor was created from,
    /// `lodash@patch:lodash@npm%3A^4.17.21#./fix.patch` gives
    /// `lodash@npm:^4.17.21`
    pub fn patched_descriptor(&self) -> Option<String> {
        let (source, _) = self.range.strip_prefix("patch:")?.split_once('#')?;
        Some(decode(source))
    }

    /// The patch file a patch descriptor applies, relative to the repository
    /// root. Patches that ship with yarn have no file.
    pub fn patch_file(&self) -> Option<String> {
        let (_, rest) = self.range.strip_prefix("patch:")?.split_once('#')?;
        let (path, params) = match rest.split_once("::") {
            Some((path, params)) => (path, Some(params)),
            None => (rest, None),
        };
        if path.starts_with("~builtin<") {
            return None;
        }
        if let Some(path) = path.strip_prefix("~/") {
            return Some(path.to_string());
        }
        let path = path.strip_prefix("./").unwrap_or(path);

        // relative patch paths start at the workspace that declared them
        let workspace_dir = params
            .and_then(|params| {
                params
                    .split('&')
                    .find_map(|param| param.strip_prefix("locator="))
            })
            .map(decode)
            .and_then(|locator| {
                Descriptor::parse(&locator)
                    .and_then(|d| d.range.strip_prefix("workspace:"))
                    .map(str::to_string)
            });
        match workspace_dir.as_deref() {
            Some(dir) if dir != "." => Some(format!("{dir}/{path}")),
            _ => Some(path.to_string()),
        }
    }

    pub fn strip_protocol(range: &str) -> &str {
        match range.split_once(':') {
            Some((protocol, rest))
                if !protocol.is_empty()
                    && protocol
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-') =>
            {
                rest
            }
            _ => range,
        }
    }
}

// Yarn url encodes the characters of a nested descriptor that would clash
// with the outer one
fn decode(raw: &str) -> String {
    raw.replace("%3A", ":")
        .replace("%40", "@")
        .replace("%2F", "/")
        .replace("%23", "#")
        .replace("%25", "%")
}
