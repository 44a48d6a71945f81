//! Build identification, logged when a [`Mimir`](crate::Mimir) is built.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Placeholder vergen emits when git metadata could not be read.
const VERGEN_PLACEHOLDER: &str = "VERGEN_IDEMPOTENT_OUTPUT";

fn git_sha() -> Option<&'static str> {
    option_env!("VERGEN_GIT_SHA").filter(|sha| !sha.is_empty() && *sha != VERGEN_PLACEHOLDER)
}

/// `{version}+{short sha}`, with `.dirty` for a modified tree, e.g.
/// `0.1.0+abc1234.dirty`. Outside a git checkout this is just the package
/// version.
pub fn version_string() -> String {
    let Some(sha) = git_sha() else {
        return PKG_VERSION.to_string();
    };
    let dirty = if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
        ".dirty"
    } else {
        ""
    };
    format!("{PKG_VERSION}+{}{dirty}", sha.get(..7).unwrap_or(sha))
}
