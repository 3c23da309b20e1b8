// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Structured logging setup, following the teacher crate's programmatic
//! `log4rs` configuration rather than a config-file-driven one. Every KVS
//! round trip and invariant repair logs through the `log` facade configured
//! here; see `kvs`, `session`, `subscription` and `matcher` for the call
//! sites.

use log::LevelFilter;
use log4rs::append::console;
use log4rs::append::rolling_file::policy::compound::{
    roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::{self, LogLevel};
use crate::error::{Error, ErrorKind};

const LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const ROLLER_PATTERN: &str = ".{}.gz";
const ROLLER_COUNT: u32 = 10;
const STDOUT_NAME: &str = "stdout";
const ROLLER_NAME: &str = "roller";

fn get_log_level(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Off => LevelFilter::Off,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// Initializes the process-wide logger from the store's `[log]` config
/// section. Safe to call once per process; a second call returns an error
/// from the underlying `log4rs::init_config` rather than panicking.
pub fn init_log(log_conf: &config::Log) -> Result<(), Error> {
    let log_level = get_log_level(log_conf.level);

    let stdout = console::ConsoleAppender::builder()
        .target(console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d} {h({l})} - {m}{n}")))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build(STDOUT_NAME, Box::new(stdout)));
    let mut root_appenders = vec![STDOUT_NAME];

    if let Some(log_file) = &log_conf.log_file {
        let roller_pattern = log_file.to_str().ok_or_else(|| {
            Error::from_string(
                ErrorKind::Config,
                format!("log: invalid log file path {log_file:?}"),
            )
        })?;
        let roller_pattern = roller_pattern.to_string() + ROLLER_PATTERN;
        let roller = FixedWindowRoller::builder()
            .build(&roller_pattern, ROLLER_COUNT)
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::Config,
                    format!("log: failed to build roller pattern: {err}"),
                )
            })?;
        let rolling_policy = Box::new(CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
            Box::new(roller),
        ));
        let requests = RollingFileAppender::builder()
            .build(log_file, rolling_policy)
            .map_err(|err| {
                Error::from_string(
                    ErrorKind::Config,
                    format!("log: failed to build roller appender: {err}"),
                )
            })?;
        builder = builder.appender(Appender::builder().build(ROLLER_NAME, Box::new(requests)));
        root_appenders.push(ROLLER_NAME);
    }

    let config = builder
        .build(Root::builder().appenders(root_appenders).build(log_level))
        .map_err(|err| {
            Error::from_string(
                ErrorKind::Config,
                format!("log: failed to build log4rs config: {err}"),
            )
        })?;

    log4rs::init_config(config).map_err(|err| {
        Error::from_string(
            ErrorKind::Config,
            format!("log: failed to init log4rs: {err}"),
        )
    })?;
    Ok(())
}
