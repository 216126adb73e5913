use std::io::Write;

/// Initialize logging to stdout with a bracketed level tag per line.
///
/// `RUST_LOG` overrides `default_level`. Calling this twice is harmless.
pub fn init(default_level: log::LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .target(env_logger::Target::Stdout)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .try_init();
}
