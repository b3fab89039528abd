use clap;

pub fn parse_flags<'a>() -> clap::ArgMatches<'a> {
    clap::App::new("gwfuse")
        .version(clap::crate_version!())
        .about("Mount a remote object-storage namespace as a read-only filesystem")
        .arg(
            clap::Arg::from_usage(
                "-m, --mount [path] 'Path to the mount point (defaults to $HOME/Projects)'",
            ),
        )
        .arg(
            clap::Arg::from_usage(
                "--loglevel [level] 'Logging level. Possible values: {trace,debug,info,warning,error}'",
            )
            .default_value("info"),
        )
        .arg(
            clap::Arg::from_usage(
                "--http-timeout [seconds] 'Number of seconds to wait before timing out an HTTP request'",
            )
            .default_value("20"),
        )
        .arg(clap::Arg::from_usage(
            "-d, --debug 'Pass the debug option to the kernel session'",
        ))
        .get_matches()
}

pub fn log_level(name: &str) -> Option<log::LevelFilter> {
    match name {
        "trace" => Some(log::LevelFilter::Trace),
        "debug" => Some(log::LevelFilter::Debug),
        "info" => Some(log::LevelFilter::Info),
        "warning" => Some(log::LevelFilter::Warn),
        "error" => Some(log::LevelFilter::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_names() {
        assert_eq!(log_level("info"), Some(log::LevelFilter::Info));
        assert_eq!(log_level("warning"), Some(log::LevelFilter::Warn));
        assert_eq!(log_level("trace"), Some(log::LevelFilter::Trace));
        assert_eq!(log_level("verbose"), None);
        assert_eq!(log_level(""), None);
    }
}
