pub mod dispatch;
pub mod install;
pub mod paths;
pub mod status;
pub mod uninstall;
