pub mod context;
pub mod docker;
pub mod process;
pub mod syft;

pub use docker::DockerBackend;
pub use syft::SyftBomGenerator;
