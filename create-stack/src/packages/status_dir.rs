//! Package introspection for images that ship without a package manager.
//!
//! Minimal run images keep one dpkg status fragment per installed package in
//! `/var/lib/dpkg/status.d` but have no `dpkg-query` to read them. The
//! fragments are copied out of a created (never started) container and
//! parsed on the host.

use ignore::WalkBuilder;
use log::{debug, warn};
use std::{fs, io, path::Path};
use tempfile::TempDir;

use crate::{
    error::{Error, Result},
    models::{ContainerId, ImageName, PackageMetadata},
    packages::DpkgPackageFinder,
    services::{ContainerRuntime, PackageFinder},
};

pub const STATUS_DIR: &str = "/var/lib/dpkg/status.d";

/// Build images are queried with dpkg, run images through their status
/// fragments.
pub struct StatusDirPackageFinder<R> {
    build: DpkgPackageFinder<R>,
    runtime: R,
}

impl<R: ContainerRuntime + Clone> StatusDirPackageFinder<R> {
    pub fn new(runtime: R) -> StatusDirPackageFinder<R> {
        StatusDirPackageFinder {
            build: DpkgPackageFinder::new(runtime.clone()),
            runtime,
        }
    }
}

impl<R: ContainerRuntime> StatusDirPackageFinder<R> {
    /// Copies the status fragments of `image` into a temporary directory that
    /// is removed when the returned handle drops.
    fn copy_status_dir(&mut self, image: &ImageName) -> Result<TempDir> {
        let dir = tempfile::Builder::new().prefix("tiny").tempdir()?;

        let mut container = ScratchContainer::create(&mut self.runtime, image)?;
        container.copy_out(STATUS_DIR, dir.path())?;
        container.remove()?;

        Ok(dir)
    }

    fn read_status_fragments(&mut self, image: &ImageName) -> Result<Vec<String>> {
        let dir = self.copy_status_dir(image)?;
        let fragments = read_fragments(&dir.path().join("status.d"))?;
        debug!("read {} status fragments from {}", fragments.len(), image);

        Ok(fragments)
    }
}

impl<R: ContainerRuntime> PackageFinder for StatusDirPackageFinder<R> {
    fn build_packages(&mut self, image: &ImageName) -> Result<Vec<String>> {
        self.build.packages(image)
    }

    fn run_packages(&mut self, image: &ImageName) -> Result<Vec<String>> {
        let fragments = self
            .read_status_fragments(image)
            .map_err(|err| Error::introspection(image, err))?;

        Ok(fragments
            .iter()
            .flat_map(|fragment| package_names(fragment))
            .collect())
    }

    fn build_package_metadata(&mut self, image: &ImageName) -> Result<String> {
        self.build.package_metadata(image)
    }

    fn run_package_metadata(&mut self, image: &ImageName) -> Result<String> {
        let fragments = self
            .read_status_fragments(image)
            .map_err(|err| Error::introspection(image, err))?;

        let metadata = fragments
            .iter()
            .map(|fragment| parse_fragment(fragment))
            .collect::<Vec<_>>();

        Ok(serde_json::to_string(&metadata)?)
    }
}

/// A created container that is removed when it goes out of scope. Prefer
/// `remove`, which reports failures; dropping only logs them.
struct ScratchContainer<'a, R: ContainerRuntime> {
    runtime: &'a mut R,
    id: ContainerId,
    removed: bool,
}

impl<'a, R: ContainerRuntime> ScratchContainer<'a, R> {
    fn create(runtime: &'a mut R, image: &ImageName) -> Result<ScratchContainer<'a, R>> {
        let id = runtime.create_container(image)?;

        Ok(ScratchContainer {
            runtime,
            id,
            removed: false,
        })
    }

    fn copy_out(&mut self, source: &str, dest: &Path) -> Result<()> {
        self.runtime.copy_from_container(&self.id, source, dest)
    }

    fn remove(mut self) -> Result<()> {
        self.removed = true;
        self.runtime.remove_container(&self.id)
    }
}

impl<'a, R: ContainerRuntime> Drop for ScratchContainer<'a, R> {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        if let Err(err) = self.runtime.remove_container(&self.id) {
            warn!("could not remove container {}: {}", self.id.0, err);
        }
    }
}

/// Contents of every file below `root`, ordered by file name.
fn read_fragments(root: &Path) -> Result<Vec<String>> {
    let walk = WalkBuilder::new(root)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut fragments = Vec::new();
    for entry in walk {
        let entry = entry.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let is_file = entry.file_type().map_or(false, |file_type| file_type.is_file());
        if is_file {
            fragments.push(fs::read_to_string(entry.path())?);
        }
    }

    Ok(fragments)
}

fn package_names(fragment: &str) -> Vec<String> {
    fragment
        .lines()
        .filter_map(|line| field(line, "Package:"))
        .map(str::to_owned)
        .collect()
}

/// Reads one status fragment. Missing keys are left empty.
fn parse_fragment(fragment: &str) -> PackageMetadata {
    let mut metadata = PackageMetadata::default();

    for line in fragment.lines() {
        if let Some(value) = field(line, "Package:") {
            metadata.name = value.into();
        } else if let Some(value) = field(line, "Version:") {
            metadata.version = value.into();
        } else if let Some(value) = field(line, "Architecture:") {
            metadata.arch = value.into();
        } else if let Some(value) = field(line, "Source-Package:") {
            metadata.source.name = value.into();
        } else if let Some(value) = field(line, "Source-Version:") {
            metadata.source.version = value.into();
        } else if let Some(value) = field(line, "Source-Upstream-Version:") {
            metadata.source.upstream_version = value.into();
        } else if let Some(description) = line.strip_prefix("Description:") {
            metadata.summary = description.trim().into();
        }
    }

    metadata
}

/// First word after `key` on a `Key: value` line.
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)
        .map(|rest| rest.split_whitespace().next().unwrap_or(""))
}
