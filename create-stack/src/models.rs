use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap as Map, fmt, path::PathBuf};

#[derive(Clone, Debug, Default, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ImageName(pub String);

impl ImageName {
    /// The tag with a `-cnb` suffix, naming the buildpacks variant of an image.
    pub fn cnb(&self) -> ImageName {
        ImageName(format!("{}-cnb", self.0))
    }

    /// The repository part of the reference, without tag or digest.
    pub fn repository(&self) -> &str {
        let name = match self.0.find('@') {
            Some(index) => &self.0[..index],
            None => &self.0,
        };

        let last_slash = name.rfind('/').map(|index| index + 1).unwrap_or(0);
        match name[last_slash..].rfind(':') {
            Some(index) => &name[..last_slash + index],
            None => name,
        }
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Hash, PartialOrd, Ord, PartialEq, Eq)]
pub struct ContainerId(pub String);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BuildEngine {
    Classic,
    BuildKit,
}

impl Default for BuildEngine {
    fn default() -> Self {
        BuildEngine::Classic
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageSpec {
    pub name: ImageName,
    /// Directory handed to the image build as its context.
    pub recipe: PathBuf,
    /// `key=value` pairs, passed to the build in order.
    pub build_args: Vec<String>,
    pub description: String,
    /// Build secrets by id. Only visible during the build.
    pub secrets: Map<String, String>,
    pub publish: bool,
    pub engine: BuildEngine,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackDefinition {
    pub build_base: ImageSpec,
    pub build_cnb: ImageSpec,
    pub run_base: ImageSpec,
    pub run_cnb: ImageSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub source: SourcePackage,
    pub summary: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackage {
    pub name: String,
    pub version: String,
    #[serde(rename = "upstreamVersion")]
    pub upstream_version: String,
}
