pub mod dpkg;
pub mod status_dir;

pub use dpkg::DpkgPackageFinder;
pub use status_dir::StatusDirPackageFinder;
