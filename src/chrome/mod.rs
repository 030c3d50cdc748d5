#![allow(unused_imports)]

mod discovery;
mod error;
mod platform;

pub use discovery::{
    BrowserVersion, TargetInfo, discover_chrome, query_targets, query_version,
    read_devtools_active_port, read_devtools_active_port_from,
};
pub use error::ChromeError;
pub use platform::default_user_data_dir;
