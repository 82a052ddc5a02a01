use const_format::formatcp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_SHA: &str = env!("VERGEN_GIT_SHA");
pub const BUILD_DATE: &str = env!("VERGEN_BUILD_DATE");

/// `burpee --version` に表示する文字列。
pub fn short_version() -> &'static str {
    formatcp!("{VERSION} ({GIT_SHA} {BUILD_DATE})")
}

/// Slack API へのリクエストに付けるユーザーエージェント。
pub fn user_agent() -> &'static str {
    formatcp!("burpee/{VERSION} ({GIT_SHA})")
}
