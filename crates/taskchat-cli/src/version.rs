/// Package version plus the git revision the binary was built from.
pub const FULL: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+git.",
    env!("TASKCHAT_GIT_COUNT"),
    ".",
    env!("TASKCHAT_GIT_SHA"),
    env!("TASKCHAT_GIT_DIRTY")
);
