pub mod config;
pub mod driver;
pub mod report;
pub mod stop;

pub use anyhow::{Error, Result};

pub use self::config::StressConfig;
pub use self::driver::{Item, run, run_with_timeout};
pub use self::report::Report;
pub use self::stop::StopToken;
