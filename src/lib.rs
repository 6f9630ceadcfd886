pub mod config;
pub mod console;
pub mod helpers;
pub mod launch;
pub mod logging;
pub mod process;
pub mod signals;
pub mod watchdog;
