use std::{
    collections::BTreeMap as Map,
    path::{Path, PathBuf},
};

use crate::{
    error::Result,
    models::{BuildEngine, ContainerId, ImageName},
};

/// Builds, moves and relabels images on the local daemon.
pub trait ImageClient {
    fn build_image(
        &mut self,
        name: &ImageName,
        recipe: &Path,
        engine: BuildEngine,
        secrets: &Map<String, String>,
        build_args: &[String],
    ) -> Result<()>;

    /// Pushes the image and returns its content-addressed reference,
    /// `<repository>@<digest>`.
    fn push_image(&mut self, name: &ImageName) -> Result<String>;

    fn pull_image(&mut self, name: &ImageName) -> Result<()>;

    fn set_label(&mut self, name: &ImageName, key: &str, value: &str) -> Result<()>;
}

/// Throwaway containers, used to look inside built images.
pub trait ContainerRuntime {
    /// Runs `command` in a fresh container that is removed afterwards and
    /// returns its output.
    fn run(&mut self, image: &ImageName, command: &[&str]) -> Result<String>;

    fn create_container(&mut self, image: &ImageName) -> Result<ContainerId>;

    fn copy_from_container(&mut self, id: &ContainerId, source: &str, dest: &Path) -> Result<()>;

    fn remove_container(&mut self, id: &ContainerId) -> Result<()>;
}

pub trait PackageFinder {
    fn build_packages(&mut self, image: &ImageName) -> Result<Vec<String>>;

    fn run_packages(&mut self, image: &ImageName) -> Result<Vec<String>>;

    /// JSON array of the installed packages' metadata.
    fn build_package_metadata(&mut self, image: &ImageName) -> Result<String>;

    fn run_package_metadata(&mut self, image: &ImageName) -> Result<String>;
}

pub trait BomGenerator {
    fn generate(&mut self, image: &ImageName) -> Result<Vec<PathBuf>>;

    fn attach(&mut self, image: &ImageName, files: &[PathBuf]) -> Result<()>;
}
